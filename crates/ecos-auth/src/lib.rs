//! Admin authentication for the ECOS timer server.
//!
//! Viewers never authenticate. Only mutating operations (session
//! create/delete and timer control) require an admin, and the server asks an
//! [`Authenticator`] to turn the token from `hello` into an [`AdminId`].
//!
//! How tokens are issued (login form, password hashing, JWT) is left to the
//! deployment; [`StaticTokenAuthenticator`] covers the common case of a few
//! pre-shared admin tokens.
//!
//! [`AdminId`]: ecos_protocol::AdminId

#![allow(async_fn_in_trait)]

mod auth;
mod error;

pub use auth::{Authenticator, StaticTokenAuthenticator};
pub use error::AuthError;
