//! The timer state machine of one session.
//!
//! [`TimerState`] is plain data plus transitions. It holds no scheduler and
//! does no I/O: the session actor owns the tick loop and decides what to
//! broadcast from the values returned here.

use ecos_protocol::{Phase, RunState, TimerSnapshot};

use crate::{TimerConfig, sequencer};

/// The five control operations, as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerCommand {
    /// Rewind to the first pause and run.
    Start,
    /// Freeze the countdown where it is.
    Pause,
    /// Continue from where the countdown was frozen.
    Resume,
    /// Rewind and stop.
    Stop,
    /// Same effect as [`TimerCommand::Stop`].
    Reset,
}

impl TimerCommand {
    /// Whether the tick loop must be armed after this command.
    pub fn runs(self) -> bool {
        matches!(self, Self::Start | Self::Resume)
    }
}

/// Result of one [`TimerState::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// State after the tick.
    pub snapshot: TimerSnapshot,
    /// `true` when the tick crossed a phase boundary.
    pub phase_changed: bool,
}

/// Mutable timer state of one session.
#[derive(Debug, Clone)]
pub struct TimerState {
    config: TimerConfig,
    phase: Phase,
    time_left: u32,
    run_state: RunState,
}

impl TimerState {
    /// A stopped timer at the start of the first pause.
    pub fn new(config: TimerConfig) -> Self {
        Self {
            config,
            phase: Phase::Pause,
            time_left: config.phase_seconds(Phase::Pause),
            run_state: RunState::Stopped,
        }
    }

    /// The configuration this timer was created with.
    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    /// Applies `command`. Returns `None` when it was a no-op.
    pub fn apply(&mut self, command: TimerCommand) -> Option<TimerSnapshot> {
        match command {
            TimerCommand::Start => self.start(),
            TimerCommand::Pause => self.pause(),
            TimerCommand::Resume => self.resume(),
            TimerCommand::Stop => Some(self.stop()),
            TimerCommand::Reset => Some(self.reset()),
        }
    }

    /// Rewinds to the first pause at full duration and runs. No-op while
    /// running.
    pub fn start(&mut self) -> Option<TimerSnapshot> {
        if self.is_running() {
            return None;
        }
        self.rewind();
        self.run_state = RunState::Running;
        Some(self.snapshot())
    }

    /// Runs without touching phase or time left. No-op while running.
    pub fn resume(&mut self) -> Option<TimerSnapshot> {
        if self.is_running() {
            return None;
        }
        self.run_state = RunState::Running;
        Some(self.snapshot())
    }

    /// Freezes the countdown. No-op while already paused; a stopped timer
    /// becomes paused at its rewound position.
    pub fn pause(&mut self) -> Option<TimerSnapshot> {
        if self.run_state == RunState::Paused {
            return None;
        }
        self.run_state = RunState::Paused;
        Some(self.snapshot())
    }

    /// Rewinds to the first pause at full duration and stops.
    pub fn stop(&mut self) -> TimerSnapshot {
        self.rewind();
        self.run_state = RunState::Stopped;
        self.snapshot()
    }

    /// Identical to [`TimerState::stop`].
    pub fn reset(&mut self) -> TimerSnapshot {
        self.stop()
    }

    /// Advances the countdown by one second. Returns `None` unless running.
    ///
    /// When the countdown reaches zero the next phase is applied at full
    /// duration within the same call, so a running timer never exposes
    /// `time_left == 0`.
    pub fn tick(&mut self) -> Option<TickOutcome> {
        if !self.is_running() {
            return None;
        }
        self.time_left = self.time_left.saturating_sub(1);
        let phase_changed = self.time_left == 0;
        if phase_changed {
            let (phase, seconds) = sequencer::advance(self.phase, &self.config);
            self.phase = phase;
            self.time_left = seconds;
        }
        Some(TickOutcome {
            snapshot: self.snapshot(),
            phase_changed,
        })
    }

    /// The externally visible state.
    pub fn snapshot(&self) -> TimerSnapshot {
        let durations = self.config.durations();
        TimerSnapshot {
            phase: self.phase,
            time_left: self.time_left,
            state: self.run_state,
            session_type: self.config.session_type(),
            station_duration: durations.station,
            pause_duration: durations.pause,
            debrief_duration: durations.debrief,
        }
    }

    fn rewind(&mut self) {
        self.phase = Phase::Pause;
        self.time_left = self.config.phase_seconds(Phase::Pause);
    }
}
