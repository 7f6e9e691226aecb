//! Session timer engine for ECOS exams.
//!
//! Each session runs as an isolated Tokio task (actor model) that owns its
//! timer state and tick scheduler. State leaves the task only as
//! [`TimerSnapshot`](ecos_protocol::TimerSnapshot) values handed to the
//! [`BroadcastGateway`].
//!
//! # Key types
//!
//! - [`TimerConfig`] validated session type and phase durations
//! - [`TimerState`] the start/pause/resume/stop/reset/tick state machine
//! - [`sequencer`] phase cycle rules
//! - [`SessionRegistry`] creates/deletes sessions, routes commands and joins
//! - [`SessionHandle`] send commands to a running session actor
//! - [`BroadcastGateway`] fan-out to each session's subscribers

mod actor;
mod config;
mod error;
mod gateway;
mod registry;
pub mod sequencer;
mod timer;

pub use actor::SessionHandle;
pub use config::{MAX_DURATION_MIN, MAX_NAME_LEN, TimerConfig, validate_name};
pub use error::SessionError;
pub use gateway::{BroadcastGateway, Outbound, SubscriberId};
pub use registry::{SessionInfo, SessionRegistry};
pub use timer::{TickOutcome, TimerCommand, TimerState};
