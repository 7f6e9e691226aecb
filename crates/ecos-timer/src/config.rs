//! Command-line and environment configuration.

use std::time::Duration;

use clap::{ArgAction, Parser};
use ecos_auth::StaticTokenAuthenticator;
use ecos_tick::TickConfig;

use crate::logging::LogFormat;
use crate::{EcosError, EcosServerBuilder};

/// Server-authoritative countdown timer for ECOS exam sessions.
#[derive(Parser, Debug, Clone)]
#[command(name = "ecos-timer", author, version, about)]
pub struct Args {
    /// Interface to listen on.
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 4000, env = "PORT")]
    pub port: u16,

    /// Admin tokens as comma-separated `admin:token` pairs.
    #[arg(long, env = "ECOS_ADMIN_TOKENS", default_value = "", hide_env_values = true)]
    pub admin_tokens: String,

    /// Tick interval in milliseconds. 1000 is one countdown second per tick.
    #[arg(long, default_value_t = 1000, env = "ECOS_TICK_MS")]
    pub tick_ms: u64,

    /// Close connections silent for this many seconds. Off when unset.
    #[arg(long, env = "ECOS_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: Option<u64>,

    /// Log output format.
    #[arg(long, value_enum, default_value = "human", env = "ECOS_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Increase verbosity (default info, -v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Tick cadence for every session.
    pub fn tick_config(&self) -> TickConfig {
        TickConfig::every(Duration::from_millis(self.tick_ms))
    }

    /// Parses `--admin-tokens`.
    pub fn authenticator(&self) -> Result<StaticTokenAuthenticator, EcosError> {
        Ok(StaticTokenAuthenticator::parse(&self.admin_tokens)?)
    }

    /// A server builder configured from these arguments.
    pub fn server_builder(&self) -> EcosServerBuilder {
        EcosServerBuilder::new()
            .bind(&self.bind_addr())
            .tick_config(self.tick_config())
            .idle_timeout(self.idle_timeout_secs.map(Duration::from_secs))
    }
}
