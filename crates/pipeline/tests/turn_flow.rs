//! Integration tests for the turn flow (control signals -> pipeline -> events)
//!
//! These run entirely against the deterministic provider stand-ins, so a
//! configured and an unconfigured deployment exercise the same control flow.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use voiceloop_config::Settings;
use voiceloop_core::{Outbound, ServerEvent, SessionState};
use voiceloop_pipeline::{ResponsePipeline, Session};
use voiceloop_providers::{ProviderGateway, TranscriptEvent};

fn make_pipeline() -> Arc<ResponsePipeline> {
    let settings = Settings::default();
    let gateway = Arc::new(ProviderGateway::from_settings(&settings));
    Arc::new(ResponsePipeline::new(
        gateway,
        settings.providers.generation.system_preamble.clone(),
    ))
}

fn make_session() -> (Arc<Session>, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(512);
    (Arc::new(Session::new("itest", tx)), rx)
}

fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Outbound> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}

fn states(events: &[Outbound]) -> Vec<SessionState> {
    events
        .iter()
        .filter_map(|e| match e {
            Outbound::Event(ServerEvent::State { value }) => Some(*value),
            _ => None,
        })
        .collect()
}

/// Full happy path: turn_start, finalized transcript, user_stopped.
/// The utterance contains a trigger word, so the prompt goes through search.
#[tokio::test]
async fn weather_turn_produces_the_full_event_sequence() {
    let pipeline = make_pipeline();
    let (session, mut rx) = make_session();

    session.on_turn_start("t1");
    session
        .on_transcript_event(TranscriptEvent {
            text: "what's the weather".to_string(),
            is_final: true,
        })
        .await;

    let handoff = session
        .on_user_stopped("t1")
        .await
        .expect("first user_stopped accepted");
    assert_eq!(handoff.utterance.as_deref(), Some("what's the weather"));

    timeout(Duration::from_secs(10), pipeline.run(&session, handoff))
        .await
        .expect("turn completes");

    assert_eq!(session.state(), SessionState::Listening);

    let events = drain(&mut rx);

    // transcript_final precedes the state changes
    assert!(matches!(
        events[0],
        Outbound::Event(ServerEvent::TranscriptFinal { .. })
    ));

    assert_eq!(
        states(&events),
        vec![
            SessionState::Thinking,
            SessionState::Speaking,
            SessionState::Listening
        ]
    );

    let tokens = events
        .iter()
        .filter(|e| matches!(e, Outbound::Event(ServerEvent::LlmToken { .. })))
        .count();
    assert!(tokens > 0);

    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Outbound::Event(ServerEvent::LlmDone { .. })))
            .count(),
        1
    );

    let audio_bytes: usize = events
        .iter()
        .filter_map(|e| match e {
            Outbound::Audio { pcm, .. } => Some(pcm.len()),
            _ => None,
        })
        .sum();
    assert!(audio_bytes > 0);

    // llm_started before the first token, llm_done after the last
    let started_at = events
        .iter()
        .position(|e| matches!(e, Outbound::Event(ServerEvent::LlmStarted { .. })))
        .unwrap();
    let first_token_at = events
        .iter()
        .position(|e| matches!(e, Outbound::Event(ServerEvent::LlmToken { .. })))
        .unwrap();
    assert!(started_at < first_token_at);
}

/// Duplicate `user_stopped` with the same id must not start a second cycle.
#[tokio::test]
async fn duplicate_user_stopped_runs_the_pipeline_once() {
    let pipeline = make_pipeline();
    let (session, mut rx) = make_session();

    session.on_turn_start("t1");
    let first = session.on_user_stopped("t1").await;
    assert!(first.is_some());

    // Retransmission while the first cycle is still pending
    assert!(session.on_user_stopped("t1").await.is_none());

    pipeline.run(&session, first.unwrap()).await;
    assert_eq!(session.state(), SessionState::Listening);

    // And again after the turn completed
    assert!(session.on_user_stopped("t1").await.is_none());

    let events = drain(&mut rx);
    let thinking_count = states(&events)
        .into_iter()
        .filter(|s| *s == SessionState::Thinking)
        .count();
    assert_eq!(thinking_count, 1);
}

/// Turn end without a transcript: one fallback token, done, listening again.
#[tokio::test]
async fn transcriptless_turn_gets_the_fallback_reply() {
    let pipeline = make_pipeline();
    let (session, mut rx) = make_session();

    session.on_turn_start("t1");
    let handoff = session.on_user_stopped("t1").await.unwrap();
    assert_eq!(handoff.utterance, None);

    pipeline.run(&session, handoff).await;
    assert_eq!(session.state(), SessionState::Listening);

    let events = drain(&mut rx);
    let tokens: Vec<&Outbound> = events
        .iter()
        .filter(|e| matches!(e, Outbound::Event(ServerEvent::LlmToken { .. })))
        .collect();
    assert_eq!(tokens.len(), 1);

    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Outbound::Event(ServerEvent::LlmDone { .. })))
            .count(),
        1
    );
}

/// Barge-in from every reachable state lands in Listening with no audio left.
#[tokio::test]
async fn barge_in_always_restores_listening() {
    // From Listening (idle)
    let (session, mut rx) = make_session();
    session.on_barge_in().await;
    assert_eq!(session.state(), SessionState::Listening);
    assert!(drain(&mut rx)
        .iter()
        .all(|e| !matches!(e, Outbound::Audio { .. })));

    // From Thinking
    let (session, mut rx) = make_session();
    session.on_user_stopped("t1").await;
    assert_eq!(session.state(), SessionState::Thinking);
    session.on_barge_in().await;
    assert_eq!(session.state(), SessionState::Listening);
    assert!(drain(&mut rx)
        .iter()
        .all(|e| !matches!(e, Outbound::Audio { .. })));

    // From Speaking, mid-pipeline
    let pipeline = make_pipeline();
    let (session, mut rx) = make_session();
    let mut handoff = session.on_user_stopped("t1").await.unwrap();
    handoff.utterance = Some("hello there".to_string());

    let run = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        let session = Arc::clone(&session);
        async move { pipeline.run(&session, handoff).await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    session.on_barge_in().await;
    run.await.unwrap();

    assert_eq!(session.state(), SessionState::Listening);
    assert!(drain(&mut rx)
        .iter()
        .all(|e| !matches!(e, Outbound::Audio { .. })));
}

/// Back-to-back turns with distinct ids both complete.
#[tokio::test]
async fn consecutive_turns_cycle_cleanly() {
    let pipeline = make_pipeline();
    let (session, mut rx) = make_session();

    for turn in ["t1", "t2"] {
        session.on_turn_start(turn);
        session
            .on_transcript_event(TranscriptEvent {
                text: format!("hello on {turn}"),
                is_final: true,
            })
            .await;

        let handoff = session.on_user_stopped(turn).await.expect("accepted");
        pipeline.run(&session, handoff).await;
        assert_eq!(session.state(), SessionState::Listening);
    }

    let events = drain(&mut rx);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Outbound::Event(ServerEvent::LlmDone { .. })))
            .count(),
        2
    );
}
