//! Coalescing-cache behavior observed through the HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use crate::*;

#[tokio::test]
async fn friends_twice_within_ttl_hits_upstream_once() {
    let server = spawn_server(ServerOptions::default()).await;

    let first: serde_json::Value = server
        .get("/friends")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let second_response = server.get("/friends").send().await.unwrap();

    let cache_control = second_response
        .headers()
        .get("cache-control")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(
        cache_control.contains("max-age="),
        "expected freshness header, got {cache_control:?}"
    );

    let second: serde_json::Value = second_response.json().await.unwrap();
    assert_eq!(first["updated"], second["updated"]);
    assert_eq!(first["friends"].as_array().unwrap().len(), 2);
    assert_eq!(
        server.upstream.friends_calls.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn concurrent_requests_share_one_upstream_fetch() {
    let server = Arc::new(spawn_server(ServerOptions::default()).await);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let server = server.clone();
        handles.push(tokio::spawn(async move {
            server
                .get("/friends")
                .send()
                .await
                .unwrap()
                .error_for_status()
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(
        server.upstream.friends_calls.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    // One handshake too, despite eight concurrent first requests.
    assert_eq!(
        server.upstream.handshakes.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn expired_ttl_triggers_exactly_one_refetch() {
    let server = spawn_server(ServerOptions {
        update_interval: Duration::from_millis(50),
        ..ServerOptions::default()
    })
    .await;

    server.get("/friends").send().await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    server.get("/friends").send().await.unwrap();

    assert_eq!(
        server.upstream.friends_calls.load(std::sync::atomic::Ordering::SeqCst),
        2
    );
}

#[tokio::test]
async fn malformed_friend_code_rejected_before_upstream() {
    let server = spawn_server(ServerOptions::default()).await;

    let response = server.get("/friendcode/not-a-code").send().await.unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(
        server.upstream.lookup_calls.load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn absent_friend_code_is_negative_cached() {
    let server = spawn_server(ServerOptions::default()).await;

    for _ in 0..3 {
        let response = server.get("/friendcode/9999-9999-9999").send().await.unwrap();
        assert_eq!(response.status(), 404);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "not_found");
    }

    assert_eq!(
        server.upstream.lookup_calls.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn known_friend_code_resolves() {
    let server = spawn_server(ServerOptions::default()).await;
    server.upstream.add_lookup(
        "1234-5678-9012",
        vigil_core::RemoteUser {
            id: "u-far".to_string(),
            name: "Far Away".to_string(),
            image_url: None,
        },
    );

    let response = server.get("/friendcode/1234-5678-9012").send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["user"]["id"], "u-far");
    assert!(body["updated"].as_u64().is_some());
}

#[tokio::test]
async fn upstream_failure_is_not_cached() {
    let server = spawn_server(ServerOptions::default()).await;

    server
        .upstream
        .fail_friends
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let response = server.get("/friends").send().await.unwrap();
    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "upstream_error");

    // Recovery: the next caller retries instead of seeing a cached failure.
    server
        .upstream
        .fail_friends
        .store(false, std::sync::atomic::Ordering::SeqCst);
    let response = server.get("/friends").send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        server.upstream.friends_calls.load(std::sync::atomic::Ordering::SeqCst),
        2
    );
}
