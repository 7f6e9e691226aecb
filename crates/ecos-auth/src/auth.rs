//! Authentication hook for admin connections.

use std::collections::HashMap;
use std::fmt;

use ecos_protocol::AdminId;

use crate::AuthError;

/// Validates an admin token and returns the admin's identity.
///
/// `Send + Sync + 'static` because a single authenticator is shared by every
/// connection task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use ecos_auth::{Authenticator, AuthError};
/// use ecos_protocol::AdminId;
///
/// /// Accepts exactly one hard-coded token. Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<AdminId, AuthError> {
///         if token == "dev" {
///             Ok(AdminId::from("developer"))
///         } else {
///             Err(AuthError::InvalidCredentials)
///         }
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token`, sent by the client in its `hello` message.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<AdminId, AuthError>> + Send;
}

/// Authenticator over a fixed set of pre-shared tokens.
#[derive(Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, AdminId>,
}

impl StaticTokenAuthenticator {
    /// Creates an authenticator that accepts nobody.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` for `admin`. A token registered twice keeps the
    /// last admin.
    pub fn with_token(mut self, admin: impl Into<AdminId>, token: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), admin.into());
        self
    }

    /// Parses a comma-separated list of `admin:token` pairs, e.g.
    /// `"alice:s3cret,bob:hunter2"`. Blank entries are skipped.
    pub fn parse(list: &str) -> Result<Self, AuthError> {
        let mut auth = Self::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (admin, token) = entry
                .split_once(':')
                .ok_or_else(|| AuthError::MalformedCredential(redact(entry)))?;
            let (admin, token) = (admin.trim(), token.trim());
            if admin.is_empty() || token.is_empty() {
                return Err(AuthError::MalformedCredential(redact(entry)));
            }
            auth = auth.with_token(AdminId::from(admin), token);
        }
        tracing::debug!(admins = auth.tokens.len(), "static admin tokens loaded");
        Ok(auth)
    }

    /// Number of registered tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if no token is registered.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<AdminId, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)
    }
}

// Tokens never reach logs or Debug output.
impl fmt::Debug for StaticTokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut admins: Vec<&str> = self.tokens.values().map(AdminId::as_str).collect();
        admins.sort_unstable();
        f.debug_struct("StaticTokenAuthenticator")
            .field("admins", &admins)
            .finish()
    }
}

/// Keeps the admin part of a bad entry for the error message, hides the rest.
fn redact(entry: &str) -> String {
    match entry.split_once(':') {
        Some((admin, _)) => format!("{}:<redacted>", admin.trim()),
        None => "<entry without ':'>".to_owned(),
    }
}
