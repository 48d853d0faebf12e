//! Server-push event stream behavior.

use std::time::Duration;

use crate::*;
use futures::StreamExt;

/// Read from the SSE response until `needle` appears or the timeout hits.
async fn read_until(response: reqwest::Response, needle: &str, timeout: Duration) -> String {
    let mut stream = response.bytes_stream();
    let mut collected = String::new();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, stream.next()).await {
            Ok(Some(Ok(chunk))) => {
                collected.push_str(&String::from_utf8_lossy(&chunk));
                if collected.contains(needle) {
                    break;
                }
            }
            _ => break,
        }
    }
    collected
}

#[tokio::test]
async fn stream_emits_friend_online_event() {
    let server = spawn_server(ServerOptions {
        update_interval: Duration::from_millis(50),
        ..ServerOptions::default()
    })
    .await;

    let response = server.get("/events").send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .starts_with("text/event-stream"));

    // Flip a friend online after the stream has taken its baseline.
    let upstream = server.upstream.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        upstream.set_friends(vec![playing_friend("A", "t1"), offline_friend("B")]);
    });

    let collected = read_until(response, "friend_online", Duration::from_secs(5)).await;
    assert!(
        collected.contains("event: friend_online"),
        "stream output missing event: {collected}"
    );
    assert!(collected.contains("\"id\":\"A\""));
}

#[tokio::test]
async fn stream_terminates_with_error_event_on_upstream_failure() {
    let server = spawn_server(ServerOptions {
        update_interval: Duration::from_millis(50),
        ..ServerOptions::default()
    })
    .await;

    let response = server.get("/events").send().await.unwrap();

    let upstream = server.upstream.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        upstream
            .fail_friends
            .store(true, std::sync::atomic::Ordering::SeqCst);
    });

    let collected = read_until(response, "event: error", Duration::from_secs(5)).await;
    assert!(
        collected.contains("event: error"),
        "stream output missing error event: {collected}"
    );
    assert!(collected.contains("upstream_error"));
}

#[tokio::test]
async fn stream_requires_identity_secret() {
    let server = spawn_server(ServerOptions::default()).await;
    let response = server.get_anonymous("/events").send().await.unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn concurrent_streams_share_the_cache() {
    let server = spawn_server(ServerOptions {
        update_interval: Duration::from_millis(60),
        ..ServerOptions::default()
    })
    .await;

    let a = server.get("/events").send().await.unwrap();
    let b = server.get("/events").send().await.unwrap();

    // Let both streams poll a few windows, then drop them.
    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(a);
    drop(b);

    // Two streams over ~3 freshness windows: the fetch count tracks windows,
    // not streams. Allow slack for tick alignment.
    let calls = server
        .upstream
        .friends_calls
        .load(std::sync::atomic::Ordering::SeqCst);
    assert!(
        (1..=5).contains(&calls),
        "expected one fetch per window, got {calls}"
    );
}
