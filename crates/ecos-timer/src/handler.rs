//! Per-connection handler: roles, message routing and the outbound writer.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Spawn the writer task that owns the sending half of the socket
//!   2. Wait for the first frame (bounded by the handshake timeout)
//!   3. Loop: decode `ClientMessage`s and route them to the registry
//!
//! Everything the connection receives, broadcasts and direct replies alike,
//! goes through one unbounded channel drained by the writer, so frames leave
//! in the order they were produced and each gets the next `seq`.

use std::sync::Arc;
use std::time::Duration;

use ecos_auth::Authenticator;
use ecos_protocol::{
    AdminId, ClientMessage, Codec, Envelope, PROTOCOL_VERSION, ProtocolError, ServerMessage,
    SessionListEntry, SessionName,
};
use ecos_session::{Outbound, SessionError, SessionRegistry, SubscriberId, TimerCommand, TimerConfig};
use ecos_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::EcosError;
use crate::server::ServerState;

/// How long queued frames may take to flush once the connection is closing.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Drop guard that removes the connection's subscription when the handler
/// exits, whichever way it exits.
struct SubscriptionGuard {
    id: SubscriberId,
    registry: Arc<SessionRegistry>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.registry.leave(self.id) {
            tracing::debug!(subscriber = %self.id, %session, "subscription released");
        }
    }
}

/// What the connection is allowed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Role {
    Viewer,
    Admin(AdminId),
}

/// Whether the read loop keeps going after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), EcosError>
where
    A: Authenticator,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = ?conn.peer_addr(), "handling new connection");

    let (tx, rx) = mpsc::unbounded_channel();
    let mut writer = tokio::spawn(write_loop(Arc::clone(&conn), rx, Arc::clone(&state)));

    let id = SubscriberId(conn_id.into_inner());
    let guard = SubscriptionGuard {
        id,
        registry: Arc::clone(&state.registry),
    };

    let mut session = ConnectionSession {
        state: &state,
        conn_id,
        id,
        tx,
        role: Role::Viewer,
    };
    let result = session.read_loop(&conn).await;

    // Unsubscribing drops the gateway's sender; dropping the session drops
    // ours. The writer then drains what is queued and exits.
    drop(guard);
    drop(session);
    if tokio::time::timeout(FLUSH_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
    let _ = conn.close().await;
    tracing::debug!(%conn_id, "connection closed");
    result
}

/// Drains the connection's outbound channel onto the socket.
async fn write_loop<A, C>(
    conn: Arc<WebSocketConnection>,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
    state: Arc<ServerState<A, C>>,
) where
    A: Authenticator,
    C: Codec,
{
    let mut seq: u64 = 1;
    while let Some(payload) = rx.recv().await {
        let envelope = Envelope {
            seq: next_seq(&mut seq),
            timestamp: state.elapsed_ms(),
            payload,
        };
        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(conn_id = %conn.id(), error = %e, "failed to encode frame");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed, writer stopping");
            break;
        }
    }
}

/// Per-connection state of the read loop.
struct ConnectionSession<'a, A: Authenticator, C: Codec> {
    state: &'a ServerState<A, C>,
    conn_id: ConnectionId,
    id: SubscriberId,
    tx: Outbound,
    role: Role,
}

impl<A: Authenticator, C: Codec> ConnectionSession<'_, A, C> {
    async fn read_loop(&mut self, conn: &WebSocketConnection) -> Result<(), EcosError> {
        let conn_id = self.conn_id;
        let mut timeout = Some(self.state.handshake_timeout);

        loop {
            let received = match timeout {
                Some(limit) => match tokio::time::timeout(limit, conn.recv()).await {
                    Ok(received) => received,
                    Err(_) => {
                        tracing::info!(%conn_id, timeout_ms = limit.as_millis() as u64, "connection timed out");
                        return Ok(());
                    }
                },
                None => conn.recv().await,
            };
            let data = match received {
                Ok(Some(data)) => data,
                Ok(None) => {
                    tracing::debug!(%conn_id, "connection closed cleanly");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "recv error");
                    return Err(EcosError::Transport(e));
                }
            };
            timeout = self.state.idle_timeout;

            let msg: ClientMessage = match self.state.codec.decode(&data) {
                Ok(msg) => msg,
                Err(e) => {
                    self.reject_undecodable(&e);
                    continue;
                }
            };

            if self.handle_message(msg).await == Flow::Close {
                return Ok(());
            }
        }
    }

    async fn handle_message(&mut self, msg: ClientMessage) -> Flow {
        let conn_id = self.conn_id;
        match msg {
            ClientMessage::Hello { version, token } => return self.hello(version, token).await,

            ClientMessage::Join { session_name } => {
                let joined = self
                    .state
                    .registry
                    .join(&session_name, self.id, self.tx.clone())
                    .await;
                tracing::debug!(
                    %conn_id,
                    session = %session_name,
                    exists = joined.is_some(),
                    "joined session"
                );
            }
            ClientMessage::Leave => {
                self.state.registry.leave(self.id);
            }

            ClientMessage::AdminStart { session_name } => {
                self.control(session_name, TimerCommand::Start).await;
            }
            ClientMessage::AdminPause { session_name } => {
                self.control(session_name, TimerCommand::Pause).await;
            }
            ClientMessage::AdminContinue { session_name } => {
                self.control(session_name, TimerCommand::Resume).await;
            }
            ClientMessage::AdminStop { session_name } => {
                self.control(session_name, TimerCommand::Stop).await;
            }
            ClientMessage::AdminReset { session_name } => {
                self.control(session_name, TimerCommand::Reset).await;
            }

            ClientMessage::CreateSession {
                name,
                session_type,
                pause_duration,
                station_duration,
                debrief_duration,
            } => {
                let Some(admin) = self.require_admin() else {
                    return Flow::Continue;
                };
                let result = match TimerConfig::from_request(
                    &session_type,
                    pause_duration,
                    station_duration,
                    debrief_duration,
                ) {
                    Ok(config) => self.state.registry.create(name, config, admin).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(info) => self.reply(ServerMessage::SessionCreated(SessionListEntry {
                        name: info.name,
                        admin: info.owner,
                    })),
                    Err(e) => self.reply_error(&e),
                }
            }
            ClientMessage::ListSessions => {
                if self.require_admin().is_some() {
                    let mut sessions = self.state.registry.list().await;
                    sessions.sort_by(|a, b| a.name.cmp(&b.name));
                    self.reply(ServerMessage::SessionList { sessions });
                }
            }
            ClientMessage::DeleteSession { name } => {
                if self.require_admin().is_some() {
                    match self.state.registry.delete(&name).await {
                        Ok(()) => self.reply(ServerMessage::SessionRemoved { name }),
                        Err(e) => self.reply_error(&e),
                    }
                }
            }

            ClientMessage::Heartbeat { client_time } => {
                self.reply(ServerMessage::HeartbeatAck {
                    client_time,
                    server_time: self.state.elapsed_ms(),
                });
            }
            ClientMessage::Disconnect { reason } => {
                tracing::info!(%conn_id, %reason, "client disconnected");
                return Flow::Close;
            }
        }
        Flow::Continue
    }

    async fn hello(&mut self, version: u32, token: Option<String>) -> Flow {
        let conn_id = self.conn_id;
        if version != PROTOCOL_VERSION {
            tracing::info!(%conn_id, version, "protocol version mismatch");
            self.reply(ServerMessage::Error {
                code: 400,
                message: format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
            });
            return Flow::Close;
        }

        if let Some(token) = token {
            match self.state.auth.authenticate(&token).await {
                Ok(admin) => {
                    tracing::info!(%conn_id, %admin, "admin authenticated");
                    self.role = Role::Admin(admin);
                }
                Err(e) => {
                    tracing::warn!(%conn_id, error = %e, "admin authentication failed");
                    self.reply(ServerMessage::Error {
                        code: 401,
                        message: "unauthorized".into(),
                    });
                    return Flow::Continue;
                }
            }
        }

        let admin = match &self.role {
            Role::Admin(admin) => Some(admin.clone()),
            Role::Viewer => None,
        };
        self.reply(ServerMessage::Welcome {
            admin,
            server_time: self.state.elapsed_ms(),
        });
        Flow::Continue
    }

    /// Real-time timer command. Never answered: unknown sessions and
    /// viewers are ignored.
    async fn control(&self, session_name: SessionName, command: TimerCommand) {
        if self.role == Role::Viewer {
            tracing::warn!(
                conn_id = %self.conn_id,
                session = %session_name,
                ?command,
                "timer command from unauthenticated connection ignored"
            );
            return;
        }
        self.state.registry.dispatch(&session_name, command).await;
    }

    /// Returns the admin identity, or answers `401` and returns `None`.
    fn require_admin(&self) -> Option<AdminId> {
        match &self.role {
            Role::Admin(admin) => Some(admin.clone()),
            Role::Viewer => {
                self.reply(ServerMessage::Error {
                    code: 401,
                    message: "admin authentication required".into(),
                });
                None
            }
        }
    }

    /// Admins learn their frame was rejected; viewers never see protocol
    /// errors.
    fn reject_undecodable(&self, err: &ProtocolError) {
        tracing::debug!(conn_id = %self.conn_id, error = %err, "failed to decode message");
        if matches!(self.role, Role::Admin(_)) {
            self.reply(ServerMessage::Error {
                code: 400,
                message: err.to_string(),
            });
        }
    }

    fn reply_error(&self, err: &SessionError) {
        tracing::debug!(conn_id = %self.conn_id, error = %err, "control-plane request rejected");
        self.reply(ServerMessage::Error {
            code: err.status_code(),
            message: err.to_string(),
        });
    }

    /// Queues a direct reply. Fails only when the writer is gone, in which
    /// case the read loop ends on the next `recv`.
    fn reply(&self, msg: ServerMessage) {
        let _ = self.tx.send(msg);
    }
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
