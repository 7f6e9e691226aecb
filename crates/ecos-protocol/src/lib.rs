//! Wire protocol for the ECOS timer server.
//!
//! - **Types** ([`TimerSnapshot`], [`ClientMessage`], [`ServerMessage`], …):
//!   everything that crosses the socket. The closed enums [`SessionType`],
//!   [`Phase`] and [`RunState`] are shared with the timer engine.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes ⇄ messages.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage / Envelope<ServerMessage>) → Session engine
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AdminId, ClientMessage, Envelope, Phase, PhaseDurations, RunState, ServerMessage,
    SessionListEntry, SessionName, SessionType, TimerSnapshot,
};

/// Protocol version announced in `hello`. Mismatching clients are rejected.
pub const PROTOCOL_VERSION: u32 = 1;
