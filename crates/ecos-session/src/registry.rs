//! Session registry: creates, tracks and routes commands to sessions.

use std::collections::HashMap;
use std::sync::Arc;

use ecos_protocol::{AdminId, SessionListEntry, SessionName, TimerSnapshot};
use ecos_tick::TickConfig;
use tokio::sync::RwLock;

use crate::actor::spawn_session;
use crate::config::validate_name;
use crate::{
    BroadcastGateway, Outbound, SessionError, SessionHandle, SubscriberId, TimerCommand,
    TimerConfig, TimerState,
};

/// Default command channel size for session actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// A session as seen from the outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub name: SessionName,
    pub owner: AdminId,
    pub snapshot: TimerSnapshot,
}

struct SessionEntry {
    owner: AdminId,
    handle: SessionHandle,
}

/// Owns every session of the process.
///
/// Shared behind an `Arc` by the connection handlers. Each session runs as
/// its own actor task; the registry only keeps the owner and a
/// [`SessionHandle`] per name, and every state change goes through that
/// handle.
///
/// # Locking
///
/// Create and delete take the write lock; everything else takes the read
/// lock, so operations on different sessions only contend on the map itself,
/// never on each other's timers. Two operations hold their guard across an
/// actor round-trip:
///
/// - [`delete`](Self::delete) keeps the write lock until the actor has
///   disarmed its ticks and published `sessionDeleted`.
/// - [`join`](Self::join) keeps the read lock until the actor has handed
///   the subscriber its first snapshot.
///
/// A join racing a delete therefore sees either the whole session or
/// nothing, and a subscription filed for a missing name survives to the
/// next session created under it.
///
/// # Strict and tolerant commands
///
/// [`apply`](Self::apply) reports unknown sessions as
/// [`SessionError::NotFound`]. [`dispatch`](Self::dispatch) swallows that
/// error, which is what the real-time channel wants: a command for a
/// session that does not exist has no effect and no reply.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionName, SessionEntry>>,
    gateway: Arc<BroadcastGateway>,
    tick: TickConfig,
    channel_size: usize,
}

impl SessionRegistry {
    /// Creates an empty registry whose sessions tick with `tick`.
    pub fn new(tick: TickConfig) -> Self {
        Self::with_gateway(Arc::new(BroadcastGateway::new()), tick)
    }

    /// Creates an empty registry publishing through `gateway`.
    pub fn with_gateway(gateway: Arc<BroadcastGateway>, tick: TickConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            gateway,
            tick: tick.validated(),
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }

    /// The gateway sessions publish through.
    pub fn gateway(&self) -> &Arc<BroadcastGateway> {
        &self.gateway
    }

    /// Creates a stopped session at the start of its first pause.
    pub async fn create(
        &self,
        name: SessionName,
        config: TimerConfig,
        owner: AdminId,
    ) -> Result<SessionInfo, SessionError> {
        validate_name(&name)?;

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&name) {
            return Err(SessionError::DuplicateSession(name));
        }

        let handle = spawn_session(
            name.clone(),
            config,
            self.tick.clone(),
            Arc::clone(&self.gateway),
            self.channel_size,
        );
        sessions.insert(
            name.clone(),
            SessionEntry {
                owner: owner.clone(),
                handle,
            },
        );
        tracing::info!(
            session = %name,
            %owner,
            session_type = %config.session_type(),
            sessions = sessions.len(),
            "session created"
        );

        Ok(SessionInfo {
            name,
            owner,
            snapshot: TimerState::new(config).snapshot(),
        })
    }

    /// Returns a session's owner and current state.
    pub async fn get(&self, name: &SessionName) -> Result<SessionInfo, SessionError> {
        let (owner, handle) = {
            let sessions = self.sessions.read().await;
            let entry = sessions
                .get(name)
                .ok_or_else(|| SessionError::NotFound(name.clone()))?;
            (entry.owner.clone(), entry.handle.clone())
        };
        let snapshot = handle.snapshot().await?;
        Ok(SessionInfo {
            name: name.clone(),
            owner,
            snapshot,
        })
    }

    /// Deletes a session.
    ///
    /// The write lock is held until the actor has acknowledged its shutdown,
    /// so a concurrent [`join`](Self::join) either completes against the
    /// live session or runs after the subscribers were notified and cleared.
    /// When this returns its ticks have stopped.
    pub async fn delete(&self, name: &SessionName) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .remove(name)
            .ok_or_else(|| SessionError::NotFound(name.clone()))?;

        if let Err(err) = entry.handle.shutdown().await {
            // Actor already gone; its subscribers still need the notice.
            tracing::warn!(session = %name, error = %err, "session actor was not running");
            self.gateway.publish_session_deleted(name);
        }
        drop(sessions);
        tracing::info!(session = %name, "session deleted");
        Ok(())
    }

    /// Every session's name and owner, in no particular order.
    pub async fn list(&self) -> Vec<SessionListEntry> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(name, entry)| SessionListEntry {
                name: name.clone(),
                admin: entry.owner.clone(),
            })
            .collect()
    }

    /// Applies `command` to a session. `Ok(None)` means the command was a
    /// no-op in the session's current state.
    pub async fn apply(
        &self,
        name: &SessionName,
        command: TimerCommand,
    ) -> Result<Option<TimerSnapshot>, SessionError> {
        let handle = self.handle(name).await?;
        handle.control(command).await
    }

    /// Like [`SessionRegistry::apply`], but an unknown or vanished session
    /// is not an error: the command simply has no effect.
    pub async fn dispatch(&self, name: &SessionName, command: TimerCommand) -> Option<TimerSnapshot> {
        match self.apply(name, command).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::debug!(session = %name, ?command, error = %err, "command ignored");
                None
            }
        }
    }

    /// Subscribes `id` to `name`.
    ///
    /// If the session exists, `tx` receives its current state before any
    /// later broadcast and that state is returned. Otherwise the
    /// subscription is kept for a session that may be created later and
    /// nothing is sent.
    pub async fn join(&self, name: &SessionName, id: SubscriberId, tx: Outbound) -> Option<TimerSnapshot> {
        // Read lock held across the actor round-trip: a concurrent delete
        // waits until the join has fully completed.
        let sessions = self.sessions.read().await;
        if let Some(entry) = sessions.get(name) {
            match entry.handle.subscribe(id, tx.clone()).await {
                Ok(snapshot) => return Some(snapshot),
                Err(err) => {
                    tracing::debug!(session = %name, subscriber = %id, error = %err, "join fell back");
                }
            }
        }
        self.gateway.subscribe(name, id, tx, None);
        None
    }

    /// Drops `id`'s subscription, if any.
    pub fn leave(&self, id: SubscriberId) -> Option<SessionName> {
        self.gateway.unsubscribe(id)
    }

    /// Deletes every session. Used on process shutdown.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        for (name, entry) in sessions.drain() {
            if entry.handle.shutdown().await.is_err() {
                self.gateway.publish_session_deleted(&name);
            }
        }
        drop(sessions);
        tracing::info!(sessions = count, "session registry shut down");
    }

    /// Number of sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if there are no sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn handle(&self, name: &SessionName) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(name)
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| SessionError::NotFound(name.clone()))
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("tick", &self.tick)
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}
