//! Session configuration and its validation rules.

use ecos_protocol::{Phase, PhaseDurations, SessionName, SessionType};

use crate::SessionError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Longest accepted phase, in minutes (one day).
pub const MAX_DURATION_MIN: u32 = 24 * 60;

/// Longest accepted session name, in characters.
pub const MAX_NAME_LEN: usize = 128;

// ---------------------------------------------------------------------------
// TimerConfig
// ---------------------------------------------------------------------------

/// The immutable configuration of one session timer.
///
/// Only constructible through [`TimerConfig::new`], so every phase the cycle
/// can visit has a duration of at least one minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    session_type: SessionType,
    durations: PhaseDurations,
}

impl TimerConfig {
    /// Validates and builds a config.
    ///
    /// Pause and station must be 1..=[`MAX_DURATION_MIN`] minutes. Debrief
    /// must be in the same range for types with a debrief phase; for
    /// `national` it is ignored and stored as given (normally 0).
    pub fn new(session_type: SessionType, durations: PhaseDurations) -> Result<Self, SessionError> {
        check_minutes("pause", durations.pause)?;
        check_minutes("station", durations.station)?;
        if session_type.has_debrief() {
            check_minutes("debrief", durations.debrief)?;
        }
        Ok(Self {
            session_type,
            durations,
        })
    }

    /// Builds a config from loosely typed control-plane input.
    ///
    /// Unknown session types, negative or zero required durations, and a
    /// missing debrief for `faculty`/`epos` are all `InvalidConfig`.
    pub fn from_request(
        session_type: &str,
        pause: i64,
        station: i64,
        debrief: Option<i64>,
    ) -> Result<Self, SessionError> {
        let session_type: SessionType = session_type.parse().map_err(SessionError::InvalidConfig)?;
        let debrief = match (session_type.has_debrief(), debrief) {
            (true, None) => {
                return Err(SessionError::InvalidConfig(format!(
                    "{session_type} sessions need a debrief duration"
                )));
            }
            // informational only for national; drop junk values
            (false, value) => value.and_then(|v| u32::try_from(v).ok()).unwrap_or(0),
            (true, Some(value)) => to_minutes("debrief", value)?,
        };
        Self::new(
            session_type,
            PhaseDurations {
                pause: to_minutes("pause", pause)?,
                station: to_minutes("station", station)?,
                debrief,
            },
        )
    }

    /// The session type.
    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    /// The configured durations, in minutes.
    pub fn durations(&self) -> PhaseDurations {
        self.durations
    }

    /// Full length of `phase`, in seconds.
    pub fn phase_seconds(&self, phase: Phase) -> u32 {
        self.durations.minutes(phase) * 60
    }
}

/// Validates a session name for creation: non-empty after trimming and at
/// most [`MAX_NAME_LEN`] characters.
pub fn validate_name(name: &SessionName) -> Result<(), SessionError> {
    let trimmed = name.as_str().trim();
    if trimmed.is_empty() {
        return Err(SessionError::InvalidConfig(
            "session name must not be empty".into(),
        ));
    }
    if name.as_str().chars().count() > MAX_NAME_LEN {
        return Err(SessionError::InvalidConfig(format!(
            "session name longer than {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn check_minutes(label: &str, minutes: u32) -> Result<(), SessionError> {
    if minutes == 0 {
        return Err(SessionError::InvalidConfig(format!(
            "{label} duration must be positive"
        )));
    }
    if minutes > MAX_DURATION_MIN {
        return Err(SessionError::InvalidConfig(format!(
            "{label} duration exceeds {MAX_DURATION_MIN} minutes"
        )));
    }
    Ok(())
}

fn to_minutes(label: &str, value: i64) -> Result<u32, SessionError> {
    u32::try_from(value).map_err(|_| {
        SessionError::InvalidConfig(format!("{label} duration must be positive"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn durations(pause: u32, station: u32, debrief: u32) -> PhaseDurations {
        PhaseDurations {
            pause,
            station,
            debrief,
        }
    }

    #[test]
    fn test_new_accepts_national_without_debrief() {
        let cfg = TimerConfig::new(SessionType::National, durations(2, 8, 0)).unwrap();
        assert_eq!(cfg.phase_seconds(Phase::Pause), 120);
        assert_eq!(cfg.phase_seconds(Phase::Station), 480);
    }

    #[test]
    fn test_new_rejects_zero_pause() {
        let err = TimerConfig::new(SessionType::National, durations(0, 8, 0)).unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(_)));
    }

    #[test]
    fn test_new_rejects_zero_station() {
        let err = TimerConfig::new(SessionType::Epos, durations(2, 0, 5)).unwrap_err();
        assert!(err.to_string().contains("station"));
    }

    #[test]
    fn test_new_rejects_zero_debrief_when_relevant() {
        for session_type in [SessionType::Faculty, SessionType::Epos] {
            let err = TimerConfig::new(session_type, durations(2, 8, 0)).unwrap_err();
            assert!(err.to_string().contains("debrief"));
        }
    }

    #[test]
    fn test_new_rejects_oversized_duration() {
        let err = TimerConfig::new(SessionType::National, durations(2, MAX_DURATION_MIN + 1, 0))
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_request_rejects_unknown_type() {
        let err = TimerConfig::from_request("oral", 2, 8, None).unwrap_err();
        assert!(err.to_string().contains("unknown session type"));
    }

    #[test]
    fn test_from_request_rejects_negative_duration() {
        let err = TimerConfig::from_request("national", -1, 8, None).unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_request_requires_debrief_for_faculty() {
        let err = TimerConfig::from_request("faculty", 2, 8, None).unwrap_err();
        assert!(err.to_string().contains("debrief"));
    }

    #[test]
    fn test_from_request_ignores_debrief_for_national() {
        let cfg = TimerConfig::from_request("ecos_nationales", 2, 8, Some(-4)).unwrap();
        assert_eq!(cfg.session_type(), SessionType::National);
        assert_eq!(cfg.durations().debrief, 0);
    }

    #[test]
    fn test_validate_name_rejects_blank() {
        assert!(validate_name(&SessionName::from("   ")).is_err());
        assert!(validate_name(&SessionName::from("")).is_err());
        assert!(validate_name(&SessionName::from("Salle 3")).is_ok());
    }

    #[test]
    fn test_validate_name_rejects_too_long() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(validate_name(&SessionName::from(long.as_str())).is_err());
    }
}
