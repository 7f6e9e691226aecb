//! Session actor: one Tokio task per session owning its timer and ticks.
//!
//! The task is the only writer of the session's [`TimerState`]. Commands and
//! ticks are handled in one `select!` loop, so a command that disarms the
//! scheduler has done so before its reply is sent, and no tick can run once
//! the task has left the loop.

use std::sync::Arc;

use ecos_protocol::{SessionName, TimerSnapshot};
use ecos_tick::{TickConfig, TickInfo, TickScheduler};
use tokio::sync::{mpsc, oneshot};

use crate::{
    BroadcastGateway, Outbound, SessionError, SubscriberId, TimerCommand, TimerConfig, TimerState,
};

/// Commands sent to a session actor through its channel.
pub(crate) enum SessionCommand {
    /// Apply a timer transition. Replies `None` for a no-op.
    Control {
        command: TimerCommand,
        reply: oneshot::Sender<Option<TimerSnapshot>>,
    },

    /// Subscribe a viewer and send it the current state.
    Subscribe {
        id: SubscriberId,
        tx: Outbound,
        reply: oneshot::Sender<TimerSnapshot>,
    },

    /// Read the current state.
    Snapshot {
        reply: oneshot::Sender<TimerSnapshot>,
    },

    /// Stop ticking, notify subscribers and exit.
    Shutdown { reply: oneshot::Sender<()> },
}

/// Handle to a running session actor.
///
/// Cheap to clone. Every method fails with
/// [`SessionError::Unavailable`] once the actor has exited.
#[derive(Clone)]
pub struct SessionHandle {
    name: SessionName,
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// The session's name.
    pub fn name(&self) -> &SessionName {
        &self.name
    }

    /// Applies `command`. `Ok(None)` means the command was a no-op in the
    /// current state.
    pub async fn control(&self, command: TimerCommand) -> Result<Option<TimerSnapshot>, SessionError> {
        self.request(|reply| SessionCommand::Control { command, reply })
            .await
    }

    /// Subscribes `id` and returns the snapshot it was sent.
    pub async fn subscribe(
        &self,
        id: SubscriberId,
        tx: Outbound,
    ) -> Result<TimerSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Subscribe { id, tx, reply })
            .await
    }

    /// Current timer state.
    pub async fn snapshot(&self) -> Result<TimerSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Stops the actor. Returns once ticking has stopped and subscribers
    /// were told the session is gone.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Shutdown { reply }).await
    }

    /// Whether the actor task has exited.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| SessionError::Unavailable(self.name.clone()))?;
        reply_rx
            .await
            .map_err(|_| SessionError::Unavailable(self.name.clone()))
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct SessionActor {
    name: SessionName,
    timer: TimerState,
    scheduler: TickScheduler,
    gateway: Arc<BroadcastGateway>,
    receiver: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    async fn run(mut self) {
        tracing::info!(session = %self.name, "session actor started");

        loop {
            tokio::select! {
                biased;

                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else {
                        // Every handle dropped without a shutdown.
                        self.scheduler.stop();
                        break;
                    };
                    if self.handle(cmd) {
                        break;
                    }
                }

                info = self.scheduler.wait_for_tick() => {
                    self.on_tick(info);
                }
            }
        }

        tracing::info!(
            session = %self.name,
            ticks = self.scheduler.tick_count(),
            overruns = self.scheduler.total_overruns(),
            "session actor stopped"
        );
    }

    /// Returns `true` when the actor must exit.
    fn handle(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::Control { command, reply } => {
                let result = self.control(command);
                let _ = reply.send(result);
            }
            SessionCommand::Subscribe { id, tx, reply } => {
                let snapshot = self.timer.snapshot();
                self.gateway.subscribe(&self.name, id, tx, Some(snapshot));
                let _ = reply.send(snapshot);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.timer.snapshot());
            }
            SessionCommand::Shutdown { reply } => {
                self.scheduler.stop();
                self.gateway.publish_session_deleted(&self.name);
                tracing::info!(session = %self.name, "session shutting down");
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    fn control(&mut self, command: TimerCommand) -> Option<TimerSnapshot> {
        let snapshot = self.timer.apply(command)?;
        if command.runs() {
            self.scheduler.start();
        } else if !self.timer.is_running() {
            self.scheduler.stop();
        }
        tracing::info!(
            session = %self.name,
            ?command,
            phase = %snapshot.phase,
            time_left = snapshot.time_left,
            "timer transition"
        );
        self.gateway.publish_state(&self.name, snapshot);
        Some(snapshot)
    }

    fn on_tick(&mut self, info: TickInfo) {
        if info.overrun {
            tracing::debug!(
                session = %self.name,
                tick = info.tick,
                skipped = info.ticks_skipped,
                "tick overrun"
            );
        }
        let Some(outcome) = self.timer.tick() else {
            // Not running: the scheduler should already be idle.
            self.scheduler.stop();
            return;
        };
        if outcome.phase_changed {
            tracing::info!(
                session = %self.name,
                phase = %outcome.snapshot.phase,
                time_left = outcome.snapshot.time_left,
                "phase change"
            );
            self.gateway.publish_phase_change(&self.name, outcome.snapshot);
        }
        self.gateway.publish_state(&self.name, outcome.snapshot);
    }
}

/// Spawns a session actor and returns a handle to it.
///
/// `channel_size` bounds the command queue; senders wait when it is full.
pub(crate) fn spawn_session(
    name: SessionName,
    config: TimerConfig,
    tick: TickConfig,
    gateway: Arc<BroadcastGateway>,
    channel_size: usize,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(channel_size);

    let actor = SessionActor {
        name: name.clone(),
        timer: TimerState::new(config),
        scheduler: TickScheduler::new(tick),
        gateway,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    SessionHandle { name, sender: tx }
}
