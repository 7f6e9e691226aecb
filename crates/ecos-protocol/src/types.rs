//! Core protocol types for the ECOS timer wire format.
//!
//! Every type here is serialized to JSON and read by browser clients, so the
//! serde attributes are part of the contract: tags and field names are
//! camelCase, enum values lowercase.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The unique, immutable name of an exam session.
///
/// Serialized as a plain string (`#[serde(transparent)]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionName(String);

impl SessionName {
    /// Creates a name from anything string-like. No validation happens here;
    /// the registry rejects empty or oversized names on create.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionName {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for SessionName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an authenticated admin. Informational only: recorded as the
/// owner of the sessions they create.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminId(String);

impl AdminId {
    /// Creates an admin identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AdminId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for AdminId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Timer enums
// ---------------------------------------------------------------------------

/// The kind of exam, which decides the phase cycle.
///
/// `ecos_nationales` and `ecos_facultaires` are accepted as aliases for the
/// names older admin panels send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    /// `pause → station → pause → …`
    #[serde(alias = "ecos_nationales")]
    National,
    /// `pause → station → debrief → pause → …`
    #[serde(alias = "ecos_facultaires")]
    Faculty,
    /// Same cycle as [`SessionType::Faculty`].
    Epos,
}

impl SessionType {
    /// Whether the cycle visits [`Phase::Debrief`].
    pub fn has_debrief(self) -> bool {
        matches!(self, Self::Faculty | Self::Epos)
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::National => "national",
            Self::Faculty => "faculty",
            Self::Epos => "epos",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "national" | "ecos_nationales" => Ok(Self::National),
            "faculty" | "ecos_facultaires" => Ok(Self::Faculty),
            "epos" => Ok(Self::Epos),
            other => Err(format!("unknown session type '{other}'")),
        }
    }
}

/// The current segment of the exam cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pause,
    Station,
    Debrief,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pause => "pause",
            Self::Station => "station",
            Self::Debrief => "debrief",
        })
    }
}

/// Whether the countdown is advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
        })
    }
}

/// Configured length of each phase, in whole minutes.
///
/// `debrief` only matters for session types with a debrief phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseDurations {
    pub pause: u32,
    pub station: u32,
    pub debrief: u32,
}

impl PhaseDurations {
    /// Configured minutes for `phase`.
    pub fn minutes(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Pause => self.pause,
            Phase::Station => self.station,
            Phase::Debrief => self.debrief,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The full externally visible timer state of one session.
///
/// Pure data: no handle or channel ever ends up in here. Durations are in
/// minutes, `time_left` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub phase: Phase,
    pub time_left: u32,
    pub state: RunState,
    pub session_type: SessionType,
    pub station_duration: u32,
    pub pause_duration: u32,
    pub debrief_duration: u32,
}

/// One row of the admin session list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionListEntry {
    pub name: SessionName,
    pub admin: AdminId,
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// Messages a client sends to the server.
///
/// Internally tagged: `{"type":"adminStart","sessionName":"morning"}`.
///
/// `createSession` keeps the session type and durations loosely typed so
/// that an unknown type or a negative duration is reported as an invalid
/// configuration rather than an undecodable frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Optional: announces the protocol version and, for admins, a token.
    Hello { version: u32, token: Option<String> },

    /// Subscribe to a session's broadcasts.
    Join { session_name: SessionName },
    /// Drop the current subscription.
    Leave,

    AdminStart { session_name: SessionName },
    AdminPause { session_name: SessionName },
    AdminContinue { session_name: SessionName },
    AdminStop { session_name: SessionName },
    AdminReset { session_name: SessionName },

    CreateSession {
        name: SessionName,
        session_type: String,
        pause_duration: i64,
        station_duration: i64,
        #[serde(default)]
        debrief_duration: Option<i64>,
    },
    ListSessions,
    DeleteSession { name: SessionName },

    /// Liveness probe, answered with `heartbeatAck`.
    Heartbeat { client_time: u64 },
    Disconnect { reason: String },
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Reply to `hello`. `admin` is set when the token was accepted.
    Welcome { admin: Option<AdminId>, server_time: u64 },

    /// Full timer state; sent on every tick and every control transition.
    State(TimerSnapshot),
    /// Same payload as `state`, sent only when the phase changed.
    PhaseChange(TimerSnapshot),
    /// Terminal notification: the session no longer exists.
    SessionDeleted { session_name: SessionName },

    /// Control-plane replies.
    SessionCreated(SessionListEntry),
    SessionList { sessions: Vec<SessionListEntry> },
    SessionRemoved { name: SessionName },

    HeartbeatAck { client_time: u64, server_time: u64 },

    /// A rejected control-plane request. `code` follows HTTP conventions.
    Error { code: u16, message: String },
}

/// Outbound frame wrapper.
///
/// `seq` increases by one per frame on a given connection, `timestamp` is
/// milliseconds since the server started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub seq: u64,
    pub timestamp: u64,
    pub payload: T,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! JSON shape tests. Browser clients read these field names directly.

    use super::*;
    use serde_json::json;

    fn snapshot() -> TimerSnapshot {
        TimerSnapshot {
            phase: Phase::Station,
            time_left: 45,
            state: RunState::Paused,
            session_type: SessionType::Faculty,
            station_duration: 8,
            pause_duration: 2,
            debrief_duration: 5,
        }
    }

    #[test]
    fn test_session_name_serializes_as_plain_string() {
        let json = serde_json::to_string(&SessionName::from("morning")).unwrap();
        assert_eq!(json, "\"morning\"");
    }

    #[test]
    fn test_snapshot_has_exact_wire_fields() {
        let value = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(
            value,
            json!({
                "phase": "station",
                "timeLeft": 45,
                "state": "paused",
                "sessionType": "faculty",
                "stationDuration": 8,
                "pauseDuration": 2,
                "debriefDuration": 5,
            })
        );
    }

    #[test]
    fn test_session_type_accepts_legacy_aliases() {
        let national: SessionType = serde_json::from_str("\"ecos_nationales\"").unwrap();
        let faculty: SessionType = serde_json::from_str("\"ecos_facultaires\"").unwrap();
        assert_eq!(national, SessionType::National);
        assert_eq!(faculty, SessionType::Faculty);
        assert_eq!("epos".parse::<SessionType>(), Ok(SessionType::Epos));
        assert!("oral".parse::<SessionType>().is_err());
    }

    #[test]
    fn test_session_type_has_debrief() {
        assert!(!SessionType::National.has_debrief());
        assert!(SessionType::Faculty.has_debrief());
        assert!(SessionType::Epos.has_debrief());
    }

    #[test]
    fn test_phase_durations_minutes() {
        let d = PhaseDurations { pause: 2, station: 8, debrief: 5 };
        assert_eq!(d.minutes(Phase::Pause), 2);
        assert_eq!(d.minutes(Phase::Station), 8);
        assert_eq!(d.minutes(Phase::Debrief), 5);
    }

    #[test]
    fn test_client_admin_commands_use_camel_case_tags() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"adminContinue","sessionName":"A"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::AdminContinue { session_name: SessionName::from("A") }
        );
    }

    #[test]
    fn test_client_create_session_debrief_is_optional() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"createSession","name":"N1","sessionType":"national",
                "pauseDuration":2,"stationDuration":8}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::CreateSession { debrief_duration, session_type, .. } => {
                assert_eq!(debrief_duration, None);
                assert_eq!(session_type, "national");
            }
            other => panic!("expected CreateSession, got {other:?}"),
        }
    }

    #[test]
    fn test_client_unit_variants() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"listSessions"}"#).unwrap();
        assert_eq!(msg, ClientMessage::ListSessions);
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"leave"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Leave);
    }

    #[test]
    fn test_client_unknown_type_is_rejected() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"adminExplode","sessionName":"A"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_state_inlines_snapshot_fields() {
        let value = serde_json::to_value(ServerMessage::State(snapshot())).unwrap();
        assert_eq!(value["type"], "state");
        assert_eq!(value["timeLeft"], 45);
        assert_eq!(value["phase"], "station");
    }

    #[test]
    fn test_server_phase_change_tag() {
        let value = serde_json::to_value(ServerMessage::PhaseChange(snapshot())).unwrap();
        assert_eq!(value["type"], "phaseChange");
    }

    #[test]
    fn test_server_session_deleted_json_format() {
        let value = serde_json::to_value(ServerMessage::SessionDeleted {
            session_name: SessionName::from("A"),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "sessionDeleted", "sessionName": "A"}));
    }

    #[test]
    fn test_server_session_created_inlines_entry() {
        let value = serde_json::to_value(ServerMessage::SessionCreated(SessionListEntry {
            name: SessionName::from("A"),
            admin: AdminId::from("root"),
        }))
        .unwrap();
        assert_eq!(value, json!({"type": "sessionCreated", "name": "A", "admin": "root"}));
    }

    #[test]
    fn test_server_error_json_format() {
        let value = serde_json::to_value(ServerMessage::Error {
            code: 409,
            message: "duplicate".into(),
        })
        .unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], 409);
    }

    #[test]
    fn test_envelope_wraps_payload() {
        let envelope = Envelope {
            seq: 7,
            timestamp: 1500,
            payload: ServerMessage::HeartbeatAck { client_time: 10, server_time: 1500 },
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["seq"], 7);
        assert_eq!(value["payload"]["type"], "heartbeatAck");
        assert_eq!(value["payload"]["clientTime"], 10);

        let decoded: Envelope<ServerMessage> = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, envelope);
    }
}
