//! # ECOS timer
//!
//! Server-authoritative countdown timer for ECOS exam sessions.
//!
//! Every session ticks on the server; browsers connect over WebSocket,
//! `join` a session and render the `state` frames they receive. Admins
//! authenticate with a token in `hello` and create, control and delete
//! sessions over the same socket.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ecos_timer::prelude::*;
//!
//! # async fn run() -> Result<(), EcosError> {
//! let server = EcosServer::builder()
//!     .bind("0.0.0.0:4000")
//!     .build(StaticTokenAuthenticator::new().with_token(AdminId::from("alice"), "s3cret"))
//!     .await?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

mod config;
mod error;
mod handler;
pub mod logging;
mod server;

pub use config::Args;
pub use error::EcosError;
pub use server::{DEFAULT_HANDSHAKE_TIMEOUT, EcosServer, EcosServerBuilder};

/// Everything needed to embed the server.
pub mod prelude {
    pub use crate::{EcosError, EcosServer, EcosServerBuilder};
    pub use ecos_auth::{AuthError, Authenticator, StaticTokenAuthenticator};
    pub use ecos_protocol::{
        AdminId, ClientMessage, Phase, RunState, ServerMessage, SessionName, SessionType,
        TimerSnapshot,
    };
    pub use ecos_session::{SessionError, SessionRegistry, TimerCommand, TimerConfig};
    pub use ecos_tick::TickConfig;
}
