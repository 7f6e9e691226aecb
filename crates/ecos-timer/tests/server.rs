//! Integration tests for the ECOS timer server, handler and full connection
//! flow, over real WebSocket connections.

use std::time::Duration;

use ecos_protocol::{Envelope, PROTOCOL_VERSION, SessionListEntry};
use ecos_timer::prelude::*;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const TOKEN: &str = "s3cret";

/// Fast ticks so a countdown second passes in 50 ms.
fn fast_ticks() -> TickConfig {
    TickConfig::every(Duration::from_millis(50)).without_jitter()
}

fn auth() -> StaticTokenAuthenticator {
    StaticTokenAuthenticator::new().with_token(AdminId::from("root"), TOKEN)
}

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    start_with(EcosServer::builder()).await
}

async fn start_with(builder: EcosServerBuilder) -> String {
    let server = builder
        .bind("127.0.0.1:0")
        .tick_config(fast_ticks())
        .build(auth())
        .await
        .expect("server should build");
    let addr = server.local_addr().expect("local addr").to_string();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, msg: &ClientMessage) {
    let text = serde_json::to_string(msg).expect("encode");
    ws.send(Message::Text(text.into())).await.expect("send");
}

/// Next server frame, failing the test after two seconds.
async fn recv(ws: &mut ClientWs) -> Envelope<ServerMessage> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("frame within 2s")
            .expect("stream open")
            .expect("ok frame");
        if msg.is_text() || msg.is_binary() {
            return serde_json::from_slice(&msg.into_data()).expect("decode envelope");
        }
    }
}

/// Skips frames until `pick` matches.
async fn recv_until<T>(ws: &mut ClientWs, mut pick: impl FnMut(&ServerMessage) -> Option<T>) -> T {
    loop {
        let envelope = recv(ws).await;
        if let Some(found) = pick(&envelope.payload) {
            return found;
        }
    }
}

async fn admin(addr: &str) -> ClientWs {
    let mut ws = connect(addr).await;
    send(
        &mut ws,
        &ClientMessage::Hello {
            version: PROTOCOL_VERSION,
            token: Some(TOKEN.into()),
        },
    )
    .await;
    match recv(&mut ws).await.payload {
        ServerMessage::Welcome { admin, .. } => assert_eq!(admin, Some(AdminId::from("root"))),
        other => panic!("expected Welcome, got {other:?}"),
    }
    ws
}

async fn viewer(addr: &str, session: &str) -> ClientWs {
    let mut ws = connect(addr).await;
    send(
        &mut ws,
        &ClientMessage::Join {
            session_name: SessionName::from(session),
        },
    )
    .await;
    ws
}

fn create(name: &str, session_type: &str, debrief: Option<i64>) -> ClientMessage {
    ClientMessage::CreateSession {
        name: SessionName::from(name),
        session_type: session_type.into(),
        pause_duration: 1,
        station_duration: 2,
        debrief_duration: debrief,
    }
}

async fn create_session(ws: &mut ClientWs, name: &str) {
    send(ws, &create(name, "faculty", Some(1))).await;
    match recv(ws).await.payload {
        ServerMessage::SessionCreated(entry) => assert_eq!(entry.name, SessionName::from(name)),
        other => panic!("expected SessionCreated, got {other:?}"),
    }
}

fn state(msg: &ServerMessage) -> Option<TimerSnapshot> {
    match msg {
        ServerMessage::State(s) => Some(*s),
        _ => None,
    }
}

fn error_code(msg: ServerMessage) -> u16 {
    match msg {
        ServerMessage::Error { code, .. } => code,
        other => panic!("expected Error, got {other:?}"),
    }
}

async fn assert_closed(ws: &mut ClientWs) {
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(result.is_ok(), "server should close the connection");
}

// =========================================================================
// Hello / roles
// =========================================================================

#[tokio::test]
async fn test_hello_with_token_upgrades_to_admin() {
    let addr = start_server().await;
    let _ws = admin(&addr).await;
}

#[tokio::test]
async fn test_hello_without_token_welcomes_viewer() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    send(&mut ws, &ClientMessage::Hello { version: PROTOCOL_VERSION, token: None }).await;

    let envelope = recv(&mut ws).await;
    assert_eq!(envelope.seq, 1);
    assert!(matches!(envelope.payload, ServerMessage::Welcome { admin: None, .. }));
}

#[tokio::test]
async fn test_hello_bad_token_is_401_and_stays_viewer() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    send(
        &mut ws,
        &ClientMessage::Hello {
            version: PROTOCOL_VERSION,
            token: Some("wrong".into()),
        },
    )
    .await;
    assert_eq!(error_code(recv(&mut ws).await.payload), 401);

    send(&mut ws, &create("A", "national", None)).await;
    assert_eq!(error_code(recv(&mut ws).await.payload), 401);
}

#[tokio::test]
async fn test_hello_version_mismatch_closes() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    send(&mut ws, &ClientMessage::Hello { version: 999, token: None }).await;

    assert_eq!(error_code(recv(&mut ws).await.payload), 400);
    assert_closed(&mut ws).await;
}

#[tokio::test]
async fn test_viewer_control_plane_is_401() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, &ClientMessage::ListSessions).await;
    assert_eq!(error_code(recv(&mut ws).await.payload), 401);
    send(&mut ws, &ClientMessage::DeleteSession { name: SessionName::from("A") }).await;
    assert_eq!(error_code(recv(&mut ws).await.payload), 401);
}

#[tokio::test]
async fn test_viewer_timer_commands_are_ignored() {
    let addr = start_server().await;
    let mut adm = admin(&addr).await;
    create_session(&mut adm, "A").await;

    let mut ws = viewer(&addr, "A").await;
    let joined = recv_until(&mut ws, state).await;
    assert_eq!(joined.state, RunState::Stopped);

    send(&mut ws, &ClientMessage::AdminStart { session_name: SessionName::from("A") }).await;
    send(&mut ws, &ClientMessage::Heartbeat { client_time: 5 }).await;

    // Nothing was started: the heartbeat ack is the next frame.
    match recv(&mut ws).await.payload {
        ServerMessage::HeartbeatAck { client_time, .. } => assert_eq!(client_time, 5),
        other => panic!("expected HeartbeatAck, got {other:?}"),
    }
}

// =========================================================================
// Control plane
// =========================================================================

#[tokio::test]
async fn test_create_list_delete_lifecycle() {
    let addr = start_server().await;
    let mut ws = admin(&addr).await;

    create_session(&mut ws, "B").await;
    create_session(&mut ws, "A").await;

    send(&mut ws, &create("A", "national", None)).await;
    assert_eq!(error_code(recv(&mut ws).await.payload), 409);

    send(&mut ws, &ClientMessage::ListSessions).await;
    match recv(&mut ws).await.payload {
        ServerMessage::SessionList { sessions } => assert_eq!(
            sessions,
            vec![
                SessionListEntry { name: SessionName::from("A"), admin: AdminId::from("root") },
                SessionListEntry { name: SessionName::from("B"), admin: AdminId::from("root") },
            ]
        ),
        other => panic!("expected SessionList, got {other:?}"),
    }

    send(&mut ws, &ClientMessage::DeleteSession { name: SessionName::from("A") }).await;
    match recv(&mut ws).await.payload {
        ServerMessage::SessionRemoved { name } => assert_eq!(name, SessionName::from("A")),
        other => panic!("expected SessionRemoved, got {other:?}"),
    }

    send(&mut ws, &ClientMessage::DeleteSession { name: SessionName::from("A") }).await;
    assert_eq!(error_code(recv(&mut ws).await.payload), 404);
}

#[tokio::test]
async fn test_create_invalid_config_is_400() {
    let addr = start_server().await;
    let mut ws = admin(&addr).await;

    send(&mut ws, &create("A", "oral", None)).await;
    assert_eq!(error_code(recv(&mut ws).await.payload), 400);

    send(&mut ws, &create("A", "faculty", None)).await;
    assert_eq!(error_code(recv(&mut ws).await.payload), 400);

    send(
        &mut ws,
        &ClientMessage::CreateSession {
            name: SessionName::from("A"),
            session_type: "national".into(),
            pause_duration: 0,
            station_duration: 8,
            debrief_duration: None,
        },
    )
    .await;
    assert_eq!(error_code(recv(&mut ws).await.payload), 400);
}

#[tokio::test]
async fn test_undecodable_frame_is_400_for_admin_only() {
    let addr = start_server().await;
    let mut adm = admin(&addr).await;
    adm.send(Message::Text("{not json".into())).await.expect("send");
    assert_eq!(error_code(recv(&mut adm).await.payload), 400);

    let mut ws = connect(&addr).await;
    ws.send(Message::Text(r#"{"type":"adminExplode"}"#.into())).await.expect("send");
    send(&mut ws, &ClientMessage::Heartbeat { client_time: 1 }).await;
    assert!(matches!(recv(&mut ws).await.payload, ServerMessage::HeartbeatAck { .. }));
}

#[tokio::test]
async fn test_heartbeat_ack_and_sequence_numbers() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    for (i, client_time) in [10u64, 20, 30].into_iter().enumerate() {
        send(&mut ws, &ClientMessage::Heartbeat { client_time }).await;
        let envelope = recv(&mut ws).await;
        assert_eq!(envelope.seq, i as u64 + 1);
        match envelope.payload {
            ServerMessage::HeartbeatAck { client_time: echoed, .. } => {
                assert_eq!(echoed, client_time);
            }
            other => panic!("expected HeartbeatAck, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_disconnect_closes_connection() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    send(&mut ws, &ClientMessage::Disconnect { reason: "bye".into() }).await;
    assert_closed(&mut ws).await;
}

// =========================================================================
// Real-time channel
// =========================================================================

#[tokio::test]
async fn test_viewer_receives_state_on_join_and_every_tick() {
    let addr = start_server().await;
    let mut adm = admin(&addr).await;
    create_session(&mut adm, "A").await;

    let mut ws = viewer(&addr, "A").await;
    let joined = recv_until(&mut ws, state).await;
    assert_eq!(
        (joined.phase, joined.time_left, joined.state),
        (Phase::Pause, 60, RunState::Stopped)
    );

    send(&mut adm, &ClientMessage::AdminStart { session_name: SessionName::from("A") }).await;
    let started = recv_until(&mut ws, state).await;
    assert_eq!((started.time_left, started.state), (60, RunState::Running));

    let first = recv_until(&mut ws, state).await;
    let second = recv_until(&mut ws, state).await;
    assert_eq!(first.time_left, 59);
    assert_eq!(second.time_left, 58);
}

#[tokio::test]
async fn test_pause_and_continue_preserve_time() {
    let addr = start_server().await;
    let mut adm = admin(&addr).await;
    create_session(&mut adm, "A").await;
    let mut ws = viewer(&addr, "A").await;
    recv_until(&mut ws, state).await;

    let name = SessionName::from("A");
    send(&mut adm, &ClientMessage::AdminStart { session_name: name.clone() }).await;
    recv_until(&mut ws, |m| state(m).filter(|s| s.time_left <= 57)).await;

    send(&mut adm, &ClientMessage::AdminPause { session_name: name.clone() }).await;
    let paused = recv_until(&mut ws, |m| state(m).filter(|s| s.state == RunState::Paused)).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    send(&mut adm, &ClientMessage::AdminContinue { session_name: name.clone() }).await;
    let resumed = recv_until(&mut ws, state).await;
    assert_eq!(resumed.state, RunState::Running);
    assert_eq!((resumed.phase, resumed.time_left), (paused.phase, paused.time_left));

    send(&mut adm, &ClientMessage::AdminReset { session_name: name }).await;
    let reset = recv_until(&mut ws, |m| state(m).filter(|s| s.state == RunState::Stopped)).await;
    assert_eq!((reset.phase, reset.time_left), (Phase::Pause, 60));
}

#[tokio::test]
async fn test_phase_change_is_broadcast() {
    let addr = start_server().await;
    let mut adm = admin(&addr).await;
    create_session(&mut adm, "A").await;
    let mut ws = viewer(&addr, "A").await;
    recv_until(&mut ws, state).await;

    send(&mut adm, &ClientMessage::AdminStart { session_name: SessionName::from("A") }).await;

    // 60 ticks of 50 ms until the station starts.
    let change = recv_until(&mut ws, |m| match m {
        ServerMessage::PhaseChange(s) => Some(*s),
        _ => None,
    })
    .await;
    assert_eq!((change.phase, change.time_left), (Phase::Station, 120));
    let after = recv(&mut ws).await.payload;
    assert_eq!(after, ServerMessage::State(change));
}

#[tokio::test]
async fn test_delete_notifies_viewers() {
    let addr = start_server().await;
    let mut adm = admin(&addr).await;
    create_session(&mut adm, "A").await;
    let mut ws = viewer(&addr, "A").await;
    recv_until(&mut ws, state).await;

    send(&mut adm, &ClientMessage::DeleteSession { name: SessionName::from("A") }).await;
    let deleted = recv_until(&mut ws, |m| match m {
        ServerMessage::SessionDeleted { session_name } => Some(session_name.clone()),
        _ => None,
    })
    .await;
    assert_eq!(deleted, SessionName::from("A"));
}

#[tokio::test]
async fn test_admin_command_for_unknown_session_is_silent() {
    let addr = start_server().await;
    let mut adm = admin(&addr).await;

    send(&mut adm, &ClientMessage::AdminStart { session_name: SessionName::from("ghost") }).await;
    send(&mut adm, &ClientMessage::Heartbeat { client_time: 9 }).await;
    assert!(matches!(recv(&mut adm).await.payload, ServerMessage::HeartbeatAck { .. }));
}

#[tokio::test]
async fn test_join_before_create_receives_later_broadcasts() {
    let addr = start_server().await;
    let mut ws = viewer(&addr, "later").await;
    let mut adm = admin(&addr).await;
    create_session(&mut adm, "later").await;

    send(&mut adm, &ClientMessage::AdminStart { session_name: SessionName::from("later") }).await;
    // The join may land before or after the create; either way the start
    // broadcast reaches the viewer.
    let started = recv_until(&mut ws, |m| state(m).filter(|s| s.state == RunState::Running)).await;
    assert_eq!(started.time_left, 60);
}

// =========================================================================
// Timeouts and shutdown
// =========================================================================

#[tokio::test]
async fn test_silent_connection_hits_handshake_timeout() {
    let addr = start_with(EcosServer::builder().handshake_timeout(Duration::from_millis(200))).await;
    let mut ws = connect(&addr).await;
    assert_closed(&mut ws).await;
}

#[tokio::test]
async fn test_idle_timeout_closes_after_first_frame() {
    let addr = start_with(
        EcosServer::builder().idle_timeout(Some(Duration::from_millis(200))),
    )
    .await;
    let mut ws = connect(&addr).await;
    send(&mut ws, &ClientMessage::Heartbeat { client_time: 1 }).await;
    recv(&mut ws).await;
    assert_closed(&mut ws).await;
}

#[tokio::test]
async fn test_run_until_shutdown_deletes_sessions() {
    let server = EcosServer::builder()
        .bind("127.0.0.1:0")
        .tick_config(fast_ticks())
        .build(auth())
        .await
        .expect("server should build");
    let addr = server.local_addr().expect("local addr").to_string();
    let registry = std::sync::Arc::clone(server.registry());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    let mut adm = admin(&addr).await;
    create_session(&mut adm, "A").await;
    let mut ws = viewer(&addr, "A").await;
    recv_until(&mut ws, state).await;

    stop_tx.send(()).expect("server running");
    running.await.expect("server task").expect("clean shutdown");

    assert!(registry.is_empty().await);
    let deleted = recv_until(&mut ws, |m| match m {
        ServerMessage::SessionDeleted { session_name } => Some(session_name.clone()),
        _ => None,
    })
    .await;
    assert_eq!(deleted, SessionName::from("A"));
}
