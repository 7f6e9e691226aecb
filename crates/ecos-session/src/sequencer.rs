//! Phase cycle rules.
//!
//! Pure functions over the closed [`Phase`] / [`SessionType`] enums; the
//! `match` is exhaustive so a new phase or type cannot be forgotten here.

use ecos_protocol::{Phase, SessionType};

use crate::TimerConfig;

/// The phase that follows `current` for `session_type`.
///
/// `national` alternates pause and station. `faculty` and `epos` insert a
/// debrief after every station. A national timer can only be in
/// [`Phase::Debrief`] if something outside the cycle put it there; it goes
/// back to pause.
pub fn next_phase(current: Phase, session_type: SessionType) -> Phase {
    match (current, session_type.has_debrief()) {
        (Phase::Pause, _) => Phase::Station,
        (Phase::Station, true) => Phase::Debrief,
        (Phase::Station, false) => Phase::Pause,
        (Phase::Debrief, _) => Phase::Pause,
    }
}

/// The next phase and its full duration in seconds.
pub fn advance(current: Phase, config: &TimerConfig) -> (Phase, u32) {
    let next = next_phase(current, config.session_type());
    (next, config.phase_seconds(next))
}
