//! `EcosServer` builder and server loop.
//!
//! Ties the layers together: transport → protocol → session engine.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ecos_auth::{Authenticator, StaticTokenAuthenticator};
use ecos_protocol::{Codec, JsonCodec};
use ecos_session::SessionRegistry;
use ecos_tick::TickConfig;
use ecos_transport::{Transport, WebSocketTransport};

use crate::EcosError;
use crate::handler::handle_connection;

/// How long a new connection may stay silent before its first frame.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) handshake_timeout: Duration,
    pub(crate) idle_timeout: Option<Duration>,
    started: Instant,
}

impl<A: Authenticator, C: Codec> ServerState<A, C> {
    /// Milliseconds since the server started. Used for every timestamp on
    /// the wire.
    pub(crate) fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Builder for configuring and starting an ECOS timer server.
///
/// # Example
///
/// ```rust,no_run
/// use ecos_timer::prelude::*;
///
/// # async fn run() -> Result<(), EcosError> {
/// let auth = StaticTokenAuthenticator::parse("alice:s3cret")?;
/// let server = EcosServer::builder()
///     .bind("0.0.0.0:4000")
///     .build(auth)
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EcosServerBuilder {
    bind_addr: String,
    tick: TickConfig,
    handshake_timeout: Duration,
    idle_timeout: Option<Duration>,
}

impl EcosServerBuilder {
    /// Creates a builder with default settings: `127.0.0.1:4000`, one tick
    /// per second, 5 s handshake timeout, no idle timeout.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:4000".to_string(),
            tick: TickConfig::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the tick cadence of every session.
    pub fn tick_config(mut self, tick: TickConfig) -> Self {
        self.tick = tick;
        self
    }

    /// Sets how long a connection may wait before sending its first frame.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Closes connections that send nothing for `timeout`. `None` keeps
    /// silent viewers connected indefinitely.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds the listener. Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<A: Authenticator>(self, auth: A) -> Result<EcosServer<A, JsonCodec>, EcosError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: Arc::new(SessionRegistry::new(self.tick)),
            auth,
            codec: JsonCodec,
            handshake_timeout: self.handshake_timeout,
            idle_timeout: self.idle_timeout,
            started: Instant::now(),
        });

        Ok(EcosServer { transport, state })
    }
}

impl Default for EcosServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound ECOS timer server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct EcosServer<A: Authenticator = StaticTokenAuthenticator, C: Codec = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
}

impl EcosServer {
    /// Creates a new builder.
    pub fn builder() -> EcosServerBuilder {
        EcosServerBuilder::new()
    }
}

impl<A, C> EcosServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The registry owning every session of this server.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.state.registry
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), EcosError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then deletes every
    /// session so connected viewers receive `sessionDeleted`.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<(), EcosError> {
        let addr = self.transport.local_addr().ok();
        tracing::info!(?addr, "ECOS timer server running");

        let mut shutdown = std::pin::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        self.state.registry.shutdown().await;
        tracing::info!("ECOS timer server stopped");
        Ok(())
    }
}
