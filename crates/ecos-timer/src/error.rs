//! Unified error type for the ECOS timer server.

use ecos_auth::AuthError;
use ecos_protocol::ProtocolError;
use ecos_session::SessionError;
use ecos_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum EcosError {
    /// Connection, send or receive failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode, decode or unexpected message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Bad admin credential or token configuration.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Session lifecycle or timer command failure.
    #[error(transparent)]
    Session(#[from] SessionError),
}
