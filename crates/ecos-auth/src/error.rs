//! Error types for admin authentication.

/// Errors raised while validating or configuring admin credentials.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The presented token is unknown.
    #[error("invalid admin credentials")]
    InvalidCredentials,

    /// A configured credential could not be parsed (expected `admin:token`).
    #[error("malformed credential: {0}")]
    MalformedCredential(String),
}
