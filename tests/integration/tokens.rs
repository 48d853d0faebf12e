//! Scoped-token lifecycle and policy enforcement over HTTP.

use std::time::Duration;

use crate::*;
use serde_json::json;
use vigil_services::Store;

async fn issue_token(server: &TestServer, policy: serde_json::Value) -> String {
    let response = server
        .http
        .post(format!("{}/tokens", server.base))
        .header("Authorization", format!("Secret {SECRET}"))
        .json(&json!({ "policy": policy }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn token_scoped_to_friend_a_denies_friend_b_presence() {
    let server = spawn_server(ServerOptions::default()).await;
    let token = issue_token(
        &server,
        json!({ "friend_presence": true, "friends": ["A"] }),
    )
    .await;

    let allowed = server
        .get_with_token("/friend/A/presence", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);

    let denied = server
        .get_with_token("/friend/B/presence", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);
    let body: serde_json::Value = denied.json().await.unwrap();
    assert_eq!(body["error"], "token_unauthorised");
}

#[tokio::test]
async fn friends_list_is_filtered_by_allow_list() {
    let server = spawn_server(ServerOptions::default()).await;
    let token = issue_token(&server, json!({ "list_friends": true, "friends": ["A"] })).await;

    let response = server.get_with_token("/friends", &token).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let friends = body["friends"].as_array().unwrap();
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0]["id"], "A");
}

#[tokio::test]
async fn token_without_capability_is_denied() {
    let server = spawn_server(ServerOptions::default()).await;
    let token = issue_token(&server, json!({ "list_friends": true })).await;

    // list_friends does not imply webservices.
    let denied = server
        .get_with_token("/webservices", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);
}

#[tokio::test]
async fn secret_caller_is_fully_privileged() {
    let server = spawn_server(ServerOptions::default()).await;

    for path in ["/friends", "/webservices", "/user", "/announcements"] {
        let response = server.get(path).send().await.unwrap();
        assert_eq!(response.status(), 200, "unexpected status for {path}");
    }
}

#[tokio::test]
async fn missing_credential_is_unauthenticated() {
    let server = spawn_server(ServerOptions::default()).await;

    let response = server.get_anonymous("/friends").send().await.unwrap();
    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");
}

#[tokio::test]
async fn inspect_list_and_revoke_roundtrip() {
    let server = spawn_server(ServerOptions::default()).await;
    let token = issue_token(&server, json!({ "list_friends": true })).await;

    // Inspect via the token itself.
    let inspect = server.get_with_token("/token", &token).send().await.unwrap();
    assert_eq!(inspect.status(), 200);
    let policy: serde_json::Value = inspect.json().await.unwrap();
    assert_eq!(policy["list_friends"], true);

    // Listed under the issuing identity.
    let list = server.get("/tokens").send().await.unwrap();
    let body: serde_json::Value = list.json().await.unwrap();
    assert_eq!(body["tokens"].as_array().unwrap().len(), 1);

    // Revoke, then the token no longer authenticates.
    let revoke = server
        .http
        .delete(format!("{}/token", server.base))
        .header("Authorization", format!("Bearer {token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(revoke.status(), 204);

    let after = server
        .get_with_token("/friends", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(after.status(), 401);

    let list = server.get("/tokens").send().await.unwrap();
    let body: serde_json::Value = list.json().await.unwrap();
    assert!(body["tokens"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn scoped_token_cannot_mint_tokens() {
    let server = spawn_server(ServerOptions::default()).await;
    let token = issue_token(&server, json!({ "list_friends": true })).await;

    let response = server
        .http
        .post(format!("{}/tokens", server.base))
        .header("Authorization", format!("Bearer {token}"))
        .json(&json!({ "policy": { "webservices": true } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn idle_session_is_evicted_and_rehandshakes() {
    let server = spawn_server(ServerOptions {
        session_idle: Duration::from_millis(50),
        sweep_interval: Some(Duration::from_millis(20)),
        ..ServerOptions::default()
    })
    .await;

    server.get("/session").send().await.unwrap();
    assert_eq!(
        server.upstream.handshakes.load(std::sync::atomic::Ordering::SeqCst),
        1
    );

    tokio::time::sleep(Duration::from_millis(150)).await;

    server.get("/session").send().await.unwrap();
    assert_eq!(
        server.upstream.handshakes.load(std::sync::atomic::Ordering::SeqCst),
        2
    );
}

#[tokio::test]
async fn resolved_identity_is_recorded() {
    let server = spawn_server(ServerOptions::default()).await;
    server.get("/session").send().await.unwrap();
    assert_eq!(
        server.store.known_identities().await,
        vec![IDENTITY.to_string()]
    );
}
