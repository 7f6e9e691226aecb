//! Fixed-interval tick scheduler for ECOS session timers.
//!
//! Each session actor owns one [`TickScheduler`]. The scheduler is created
//! idle; [`TickScheduler::start`] arms it and [`TickScheduler::stop`] disarms
//! it. While idle, [`TickScheduler::wait_for_tick`] pends forever, which makes
//! it safe to park inside a `tokio::select!` loop next to a command channel:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         biased;
//!         cmd = cmd_rx.recv() => { /* start / pause / stop the scheduler */ }
//!         _ = scheduler.wait_for_tick() => { /* decrement the countdown */ }
//!     }
//! }
//! ```
//!
//! Because arming and disarming happen on the task that also awaits the tick,
//! a `stop()` that has returned can never be followed by a stale tick.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when the scheduler wakes up later than one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPolicy {
    /// Drop the missed ticks and re-anchor the cadence to now.
    Skip,
    /// Fire missed ticks back-to-back, at most `max_catchup` of them.
    /// Anything beyond the cap is reported as skipped.
    CatchUp {
        /// Hard cap on consecutive catch-up ticks.
        max_catchup: u32,
    },
}

impl Default for TickPolicy {
    fn default() -> Self {
        Self::CatchUp { max_catchup: 5 }
    }
}

/// Configuration for a [`TickScheduler`].
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between two ticks. One second for a countdown.
    pub interval: Duration,
    /// Overrun handling policy.
    pub policy: TickPolicy,
    /// Upper bound of the random delay added to the first tick after every
    /// `start()`, so sessions started at the same instant do not wake together.
    pub initial_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            policy: TickPolicy::default(),
            initial_jitter: Duration::from_millis(2),
        }
    }
}

impl TickConfig {
    /// Shortest supported interval.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    /// Config with the given interval and default policy and jitter.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Returns the same config without start jitter.
    pub fn without_jitter(mut self) -> Self {
        self.initial_jitter = Duration::ZERO;
        self
    }

    /// Clamps out-of-range values. Called by [`TickScheduler::new`].
    ///
    /// - `interval` is raised to [`Self::MIN_INTERVAL`].
    /// - `initial_jitter` is kept strictly below `interval`.
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "tick interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        if self.initial_jitter >= self.interval {
            warn!(
                jitter_ms = self.initial_jitter.as_millis() as u64,
                "initial jitter not below tick interval, clamping"
            );
            self.initial_jitter = self.interval / 2;
        }
        self
    }
}

/// Information about a fired tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Monotonically increasing tick number over the scheduler's lifetime
    /// (starts at 1, keeps counting across stop/start).
    pub tick: u64,
    /// `true` if the tick fired more than 10% of an interval late.
    pub overrun: bool,
    /// Ticks dropped because of the overrun policy.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-interval tick scheduler, one per session actor.
#[derive(Debug)]
pub struct TickScheduler {
    config: TickConfig,
    tick_count: u64,
    /// Deadline of the next tick. `None` while idle.
    next_tick: Option<Instant>,
    total_overruns: u64,
}

impl TickScheduler {
    /// Creates an idle scheduler.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        debug!(
            interval_ms = config.interval.as_millis() as u64,
            policy = ?config.policy,
            "tick scheduler created"
        );
        Self {
            config,
            tick_count: 0,
            next_tick: None,
            total_overruns: 0,
        }
    }

    /// Arms the scheduler: the first tick fires one interval (plus jitter)
    /// from now. No-op if already running.
    pub fn start(&mut self) {
        if self.next_tick.is_some() {
            return;
        }
        // Jitter is drawn in whole microseconds; anything finer is no jitter.
        let max_us = u64::try_from(self.config.initial_jitter.as_micros()).unwrap_or(u64::MAX);
        let jitter = if max_us == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(rand::rng().random_range(0..max_us))
        };
        self.next_tick = Some(Instant::now() + self.config.interval + jitter);
        debug!(tick = self.tick_count, "tick scheduler started");
    }

    /// Disarms the scheduler. A pending `wait_for_tick` will never resolve.
    /// No-op if already idle.
    pub fn stop(&mut self) {
        if self.next_tick.take().is_some() {
            debug!(tick = self.tick_count, "tick scheduler stopped");
        }
    }

    /// Waits until the next tick is due.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the
    /// schedule untouched. While idle this pends forever.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let Some(due) = self.next_tick else {
            return std::future::pending().await;
        };

        time::sleep_until(due).await;

        let now = Instant::now();
        let interval = self.config.interval;
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > interval / 10;
        let behind = (late_by.as_nanos() / interval.as_nanos()) as u64;
        let mut ticks_skipped = 0u64;

        self.next_tick = Some(match self.config.policy {
            TickPolicy::Skip => {
                ticks_skipped = behind;
                if behind > 0 {
                    warn!(
                        tick = self.tick_count,
                        skipped = behind,
                        late_ms = late_by.as_millis() as u64,
                        "tick overrun, skipping ahead"
                    );
                }
                now + interval
            }
            TickPolicy::CatchUp { max_catchup } => {
                if behind == 0 {
                    due + interval
                } else if behind <= u64::from(max_catchup) {
                    debug!(tick = self.tick_count, behind, "tick overrun, catching up");
                    due + interval
                } else {
                    ticks_skipped = behind - u64::from(max_catchup);
                    warn!(
                        tick = self.tick_count,
                        behind,
                        skipped = ticks_skipped,
                        "tick overrun beyond catch-up cap"
                    );
                    // Leave exactly `max_catchup` ticks in the past.
                    (now + interval)
                        .checked_sub(interval * max_catchup)
                        .unwrap_or(now)
                }
            }
        });

        if overrun {
            self.total_overruns += 1;
        }
        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    /// Whether the scheduler is armed.
    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Late wake-ups observed so far.
    pub fn total_overruns(&self) -> u64 {
        self.total_overruns
    }

    /// The configured interval.
    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}
