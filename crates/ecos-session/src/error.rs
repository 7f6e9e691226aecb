//! Error types for the session engine.

use ecos_protocol::SessionName;

/// Errors returned by [`SessionRegistry`](crate::SessionRegistry) and
/// [`SessionHandle`](crate::SessionHandle) operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session with this name already exists. Nothing was changed.
    #[error("session '{0}' already exists")]
    DuplicateSession(SessionName),

    /// Rejected before any session object was created.
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    /// No session with this name.
    #[error("session '{0}' not found")]
    NotFound(SessionName),

    /// The session's actor stopped before answering.
    #[error("session '{0}' is unavailable")]
    Unavailable(SessionName),
}

impl SessionError {
    /// HTTP-style code reported to control-plane callers.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidConfig(_) => 400,
            Self::NotFound(_) => 404,
            Self::DuplicateSession(_) => 409,
            Self::Unavailable(_) => 503,
        }
    }
}
