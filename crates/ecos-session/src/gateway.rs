//! Fan-out of timer state to the subscribers of each session.

use std::collections::HashMap;
use std::fmt;

use dashmap::DashMap;
use ecos_protocol::{ServerMessage, SessionName, TimerSnapshot};
use tokio::sync::mpsc;

/// Identifies one subscriber, normally one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Delivery channel of one subscriber. The connection's writer task owns the
/// receiving half.
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Per-session subscriber sets.
///
/// A subscriber belongs to at most one session. Sends never block: every
/// [`Outbound`] is unbounded, and a subscriber whose receiver is gone is
/// dropped on the next publish without affecting the others.
///
/// Each session's set lives under one `DashMap` shard lock while it is
/// published to, so a concurrent subscribe or unsubscribe lands either
/// before or after a given message, never in the middle of it.
///
/// # Indexes
///
/// Two maps are kept in step:
///
/// - `channels`: session name → subscriber id → sender, read on every
///   publish.
/// - `memberships`: subscriber id → session name, so a disconnecting
///   connection can be removed without knowing which session it watched.
///
/// A memberships entry is never locked while a channels shard is held.
/// Closed senders found during a publish are collected and removed from
/// both maps after the shard guard is released.
///
/// # Lifetime of a session's set
///
/// A set is created by the first subscribe for a name, which may happen
/// before the session exists. It disappears when its last subscriber leaves
/// or when [`publish_session_deleted`](Self::publish_session_deleted) sends
/// the terminal notice and drops every member.
///
/// # Example
///
/// ```rust
/// use ecos_protocol::{ServerMessage, SessionName};
/// use ecos_session::{BroadcastGateway, SubscriberId};
///
/// let gateway = BroadcastGateway::new();
/// let name = SessionName::from("A");
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
///
/// gateway.subscribe(&name, SubscriberId(1), tx, None);
/// assert_eq!(gateway.subscriber_count(&name), 1);
///
/// gateway.publish_session_deleted(&name);
/// assert_eq!(
///     rx.try_recv().unwrap(),
///     ServerMessage::SessionDeleted { session_name: name.clone() }
/// );
/// assert_eq!(gateway.subscriber_count(&name), 0);
/// ```
#[derive(Default)]
pub struct BroadcastGateway {
    channels: DashMap<SessionName, HashMap<SubscriberId, Outbound>>,
    memberships: DashMap<SubscriberId, SessionName>,
}

impl BroadcastGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id` to `name`'s subscribers, leaving any previous session.
    ///
    /// `initial` is sent to `tx` before the subscriber becomes visible to
    /// publishers, so it is always the first state the subscriber sees.
    /// `name` does not have to exist yet.
    pub fn subscribe(
        &self,
        name: &SessionName,
        id: SubscriberId,
        tx: Outbound,
        initial: Option<TimerSnapshot>,
    ) {
        if let Some(previous) = self.memberships.insert(id, name.clone()) {
            if &previous != name {
                self.remove_from(&previous, id);
            }
        }
        if let Some(snapshot) = initial {
            let _ = tx.send(ServerMessage::State(snapshot));
        }
        self.channels.entry(name.clone()).or_default().insert(id, tx);
        tracing::debug!(session = %name, subscriber = %id, "subscribed");
    }

    /// Removes `id` from whatever session it belongs to. Returns that
    /// session's name.
    pub fn unsubscribe(&self, id: SubscriberId) -> Option<SessionName> {
        let (_, name) = self.memberships.remove(&id)?;
        self.remove_from(&name, id);
        tracing::debug!(session = %name, subscriber = %id, "unsubscribed");
        Some(name)
    }

    /// Sends a `state` message to every subscriber of `name`.
    pub fn publish_state(&self, name: &SessionName, snapshot: TimerSnapshot) {
        self.publish(name, ServerMessage::State(snapshot));
    }

    /// Sends a `phaseChange` message to every subscriber of `name`.
    pub fn publish_phase_change(&self, name: &SessionName, snapshot: TimerSnapshot) {
        self.publish(name, ServerMessage::PhaseChange(snapshot));
    }

    /// Sends the terminal `sessionDeleted` message and forgets every
    /// subscriber of `name`.
    pub fn publish_session_deleted(&self, name: &SessionName) {
        let Some((_, subscribers)) = self.channels.remove(name) else {
            return;
        };
        let count = subscribers.len();
        for (id, tx) in subscribers {
            self.memberships.remove_if(&id, |_, member_of| member_of == name);
            let _ = tx.send(ServerMessage::SessionDeleted {
                session_name: name.clone(),
            });
        }
        tracing::debug!(session = %name, subscribers = count, "session deletion broadcast");
    }

    /// Current number of subscribers of `name`.
    pub fn subscriber_count(&self, name: &SessionName) -> usize {
        self.channels.get(name).map_or(0, |set| set.len())
    }

    /// The session `id` is subscribed to.
    pub fn session_of(&self, id: SubscriberId) -> Option<SessionName> {
        self.memberships.get(&id).map(|entry| entry.value().clone())
    }

    fn publish(&self, name: &SessionName, msg: ServerMessage) {
        let mut dead = Vec::new();
        if let Some(mut subscribers) = self.channels.get_mut(name) {
            subscribers.retain(|id, tx| {
                let alive = tx.send(msg.clone()).is_ok();
                if !alive {
                    dead.push(*id);
                }
                alive
            });
        }
        // shard guard released above; memberships is never locked while a
        // channels shard is held
        for id in dead {
            tracing::debug!(session = %name, subscriber = %id, "dropping closed subscriber");
            self.memberships.remove_if(&id, |_, member_of| member_of == name);
        }
    }

    fn remove_from(&self, name: &SessionName, id: SubscriberId) {
        if let Some(mut subscribers) = self.channels.get_mut(name) {
            subscribers.remove(&id);
        }
        self.channels.remove_if(name, |_, subscribers| subscribers.is_empty());
    }
}

impl fmt::Debug for BroadcastGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastGateway")
            .field("sessions", &self.channels.len())
            .field("subscribers", &self.memberships.len())
            .finish()
    }
}
