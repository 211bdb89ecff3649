//! End-to-end coverage for spec §8 P5 (reattach consistency) and scenario 6
//! (a client disconnects mid-task, the task keeps running, a fresh client
//! reattaches and gets the full transcript before any further live event).
//!
//! Drives the real `axum::Router` over a loopback TCP listener with
//! `reqwest`, the same HTTP client the rest of this workspace uses, rather
//! than exercising handlers in-process.

use std::time::Duration;
use zen_claw_core::{Message, Session, StepEvent};
use zen_claw_service::config::GatewayConfig;
use zen_claw_service::state::AppState;

async fn spawn_test_server() -> (String, AppState) {
    let data_dir = tempfile::tempdir().expect("tempdir").into_path();
    let config = GatewayConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        data_dir,
        max_sessions: 5,
        default_provider: "deepseek".to_string(),
        fallback_order: vec![],
        providers: vec![],
    };

    let state = AppState::build(config).await.expect("build state");
    let app = zen_claw_service::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    (format!("http://{addr}"), state)
}

/// Pulls lines out of an SSE byte stream until it has collected a full
/// `event: <name>` block's `data:` payload, or the stream ends.
async fn next_sse_data(resp: &mut reqwest::Response, want_event: Option<&str>) -> Option<String> {
    let mut buf = String::new();
    loop {
        let chunk = resp.chunk().await.ok()??;
        buf.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(pos) = buf.find("\n\n") {
            let block = buf[..pos].to_string();
            buf.drain(..pos + 2);
            let event = block.lines().find_map(|l| l.strip_prefix("event:").map(|s| s.trim().to_string()));
            let data = block.lines().find_map(|l| l.strip_prefix("data:").map(|s| s.trim().to_string()));
            if let Some(data) = data {
                match (&want_event, &event) {
                    (Some(w), Some(e)) if e == *w => return Some(data),
                    (None, None) => return Some(data),
                    _ => continue,
                }
            }
        }
    }
}

#[tokio::test]
async fn reattach_replays_transcript_then_resumes_live_events() {
    let (base_url, state) = spawn_test_server().await;

    let mut session = Session::new("sess-reattach", std::env::temp_dir(), "deepseek".to_string(), "deepseek-chat".to_string());
    session.messages.push(Message::user("hello"));
    session.messages.push(Message::assistant("hi there"));
    state.store.create(session.clone()).await.expect("create session");

    let client = reqwest::Client::new();

    // First client attaches, reads the snapshot, then disconnects mid-task
    // by dropping the response without finishing the stream.
    let mut first = client.get(format!("{base_url}/sessions/{}/stream", session.id)).send().await.expect("attach 1");
    let snapshot = next_sse_data(&mut first, Some("snapshot")).await.expect("first snapshot");
    assert!(snapshot.contains("hi there"), "snapshot should carry the existing transcript: {snapshot}");
    drop(first);

    // Give the server a moment to notice the disconnect and run DetachOnDrop.
    for _ in 0..50 {
        if state.clients.attached_count(&session.id) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.clients.attached_count(&session.id), 0, "first client should have detached");

    // The task keeps running regardless: simulate a live step event posted
    // while nobody is attached.
    state.clients.broadcast(&session.id, &StepEvent::StepBegin { step: 1 });

    // A fresh client reattaches: it must see the full transcript snapshot
    // first, then resume live events from this point on.
    let mut second = client.get(format!("{base_url}/sessions/{}/stream", session.id)).send().await.expect("attach 2");
    let snapshot2 = next_sse_data(&mut second, Some("snapshot")).await.expect("second snapshot");
    assert!(snapshot2.contains("hi there"), "reattach snapshot should still carry the full transcript: {snapshot2}");

    state.clients.broadcast(&session.id, &StepEvent::StepBegin { step: 2 });
    let live = next_sse_data(&mut second, None).await.expect("live event after reattach");
    assert!(live.contains("step_begin"), "expected a live step_begin event, got: {live}");
    assert!(live.contains("\"step\":2"), "expected the post-reattach event, not a replay of step 1: {live}");
}
