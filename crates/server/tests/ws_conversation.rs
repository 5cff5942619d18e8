//! End-to-end WebSocket conversation tests
//!
//! Runs the real router on a loopback listener and drives it with a raw
//! WebSocket client. Providers are the deterministic stand-ins, so these
//! tests exercise the same control flow as a configured deployment.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use voiceloop_config::Settings;
use voiceloop_server::{create_router, AppState};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> String {
    let state = AppState::new(Settings::default());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("ws://{addr}/ws")
}

async fn connect(url: &str) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

async fn next_json(ws: &mut Client) -> serde_json::Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("server responds in time")
            .expect("connection open")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Tally of one turn's events, collected until the post-turn LISTENING.
#[derive(Debug, Default)]
struct TurnTally {
    thinking: usize,
    speaking: usize,
    tokens: usize,
    done: usize,
    audio_bytes: usize,
}

async fn collect_turn(ws: &mut Client) -> TurnTally {
    let mut tally = TurnTally::default();

    loop {
        let msg = timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("turn completes in time")
            .expect("connection open")
            .unwrap();

        match msg {
            Message::Text(text) => {
                let event: serde_json::Value = serde_json::from_str(&text).unwrap();
                match event["type"].as_str().unwrap_or_default() {
                    "state" => match event["value"].as_str().unwrap_or_default() {
                        "THINKING" => tally.thinking += 1,
                        "SPEAKING" => tally.speaking += 1,
                        "LISTENING" if tally.done > 0 => return tally,
                        _ => {}
                    },
                    "llm_token" => tally.tokens += 1,
                    "llm_done" => tally.done += 1,
                    _ => {}
                }
            }
            Message::Binary(pcm) => tally.audio_bytes += pcm.len(),
            _ => {}
        }
    }
}

#[tokio::test]
async fn connection_greets_with_session_id_and_listening() {
    let url = spawn_server().await;
    let mut ws = connect(&url).await;

    let first = next_json(&mut ws).await;
    assert_eq!(first["type"], "session_id");
    assert!(!first["id"].as_str().unwrap().is_empty());

    let second = next_json(&mut ws).await;
    assert_eq!(second["type"], "state");
    assert_eq!(second["value"], "LISTENING");
}

#[tokio::test]
async fn transcriptless_turn_completes_with_fallback_and_audio() {
    let url = spawn_server().await;
    let mut ws = connect(&url).await;

    // Greeting
    next_json(&mut ws).await;
    next_json(&mut ws).await;

    ws.send(Message::Text(
        r#"{"type":"turn_start","id":"t1"}"#.to_string(),
    ))
    .await
    .unwrap();

    // Audio while listening; the unconfigured STT stub discards it
    ws.send(Message::Binary(vec![0u8; 640])).await.unwrap();

    ws.send(Message::Text(
        r#"{"type":"user_stopped","id":"t1"}"#.to_string(),
    ))
    .await
    .unwrap();

    let tally = collect_turn(&mut ws).await;
    assert_eq!(tally.thinking, 1);
    assert_eq!(tally.speaking, 1);
    assert_eq!(tally.tokens, 1); // single fallback token
    assert_eq!(tally.done, 1);
    assert!(tally.audio_bytes > 0);
}

#[tokio::test]
async fn duplicate_user_stopped_triggers_one_cycle() {
    let url = spawn_server().await;
    let mut ws = connect(&url).await;

    next_json(&mut ws).await;
    next_json(&mut ws).await;

    ws.send(Message::Text(
        r#"{"type":"turn_start","id":"t1"}"#.to_string(),
    ))
    .await
    .unwrap();
    ws.send(Message::Text(
        r#"{"type":"user_stopped","id":"t1"}"#.to_string(),
    ))
    .await
    .unwrap();
    ws.send(Message::Text(
        r#"{"type":"user_stopped","id":"t1"}"#.to_string(),
    ))
    .await
    .unwrap();

    let tally = collect_turn(&mut ws).await;
    assert_eq!(tally.thinking, 1);
    assert_eq!(tally.done, 1);

    // Nothing else trickles in after the turn closed
    let extra = timeout(Duration::from_millis(300), ws.next()).await;
    assert!(extra.is_err(), "no second cycle after duplicate signal");
}

#[tokio::test]
async fn malformed_control_frames_are_ignored() {
    let url = spawn_server().await;
    let mut ws = connect(&url).await;

    next_json(&mut ws).await;
    next_json(&mut ws).await;

    ws.send(Message::Text("{not json at all".to_string()))
        .await
        .unwrap();
    ws.send(Message::Text(r#"{"type":"reboot"}"#.to_string()))
        .await
        .unwrap();

    // Connection survives and a normal turn still works
    ws.send(Message::Text(
        r#"{"type":"user_stopped","id":"t1"}"#.to_string(),
    ))
    .await
    .unwrap();

    let tally = collect_turn(&mut ws).await;
    assert_eq!(tally.done, 1);
}

#[tokio::test]
async fn barge_in_interrupts_and_session_recovers() {
    let url = spawn_server().await;
    let mut ws = connect(&url).await;

    next_json(&mut ws).await;
    next_json(&mut ws).await;

    ws.send(Message::Text(
        r#"{"type":"user_stopped","id":"t1"}"#.to_string(),
    ))
    .await
    .unwrap();
    ws.send(Message::Text(r#"{"type":"barge_in"}"#.to_string()))
        .await
        .unwrap();

    // Whatever was in flight, the session must come back around: a fresh
    // turn with a new id completes normally.
    ws.send(Message::Text(
        r#"{"type":"user_stopped","id":"t2"}"#.to_string(),
    ))
    .await
    .unwrap();

    let mut done = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while done == 0 && tokio::time::Instant::now() < deadline {
        match timeout(Duration::from_secs(5), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let event: serde_json::Value = serde_json::from_str(&text).unwrap();
                if event["type"] == "llm_done" {
                    done += 1;
                }
            }
            Ok(Some(Ok(_))) => {}
            _ => break,
        }
    }
    assert_eq!(done, 1);
}
