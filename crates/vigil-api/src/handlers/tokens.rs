//! /token and /tokens handlers — scoped-token issue, inspect, list, revoke.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vigil_core::now_ms;
use vigil_core::policy::{ScopedToken, TokenPolicy};
use vigil_services::Store;

use super::auth::Authed;
use super::ApiState;
use crate::error::ApiError;

// ── /tokens (POST) ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateTokenRequest {
    pub policy: TokenPolicy,
}

#[derive(Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
    pub identity: String,
    pub policy: TokenPolicy,
    pub created_at: u64,
}

/// Issue a scoped token bound to the caller's identity. Requires the real
/// identity secret — a scoped token cannot mint further tokens.
pub async fn handle_token_create(
    State(state): State<ApiState>,
    auth: Authed,
    Json(request): Json<CreateTokenRequest>,
) -> Result<Json<CreateTokenResponse>, ApiError> {
    if auth.policy.is_some() {
        return Err(ApiError::Forbidden);
    }

    let token = ScopedToken {
        token: Uuid::new_v4().to_string(),
        identity: auth.session.identity.clone(),
        policy: request.policy,
        created_at: now_ms() / 1000,
    };
    state.store.save_token(&token).await;

    let mut ids = state.store.token_ids(&token.identity).await;
    if !ids.contains(&token.token) {
        ids.push(token.token.clone());
        state.store.set_token_ids(&token.identity, &ids).await;
    }

    tracing::info!(identity = %token.identity, "scoped token issued");
    Ok(Json(CreateTokenResponse {
        token: token.token,
        identity: token.identity,
        policy: token.policy,
        created_at: token.created_at,
    }))
}

// ── /tokens (GET) ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct TokenListEntry {
    pub token: String,
    pub policy: TokenPolicy,
    pub created_at: u64,
}

#[derive(Serialize)]
pub struct TokenListResponse {
    pub tokens: Vec<TokenListEntry>,
}

pub async fn handle_token_list(
    State(state): State<ApiState>,
    auth: Authed,
) -> Result<Json<TokenListResponse>, ApiError> {
    if auth.policy.is_some() {
        return Err(ApiError::Forbidden);
    }

    let ids = state.store.token_ids(&auth.session.identity).await;
    let mut tokens = Vec::with_capacity(ids.len());
    for id in ids {
        // The index may name tokens revoked out of band; skip them.
        if let Some(token) = state.store.load_token(&id).await {
            tokens.push(TokenListEntry {
                token: token.token,
                policy: token.policy,
                created_at: token.created_at,
            });
        }
    }
    Ok(Json(TokenListResponse { tokens }))
}

// ── /token (GET) ──────────────────────────────────────────────────────────────

/// The policy of the token used to authenticate this request.
pub async fn handle_token_inspect(auth: Authed) -> Result<Json<TokenPolicy>, ApiError> {
    match auth.policy {
        Some(policy) => Ok(Json(policy)),
        None => Err(ApiError::unauthenticated(
            "this endpoint inspects the presented scoped token",
        )),
    }
}

// ── /token (DELETE) ───────────────────────────────────────────────────────────

/// Revoke the token used to authenticate this request.
pub async fn handle_token_revoke(
    State(state): State<ApiState>,
    auth: Authed,
) -> Result<StatusCode, ApiError> {
    let Some(id) = auth.token else {
        return Err(ApiError::unauthenticated(
            "this endpoint revokes the presented scoped token",
        ));
    };

    state.store.delete_token(&id).await;

    let identity = &auth.session.identity;
    let ids: Vec<String> = state
        .store
        .token_ids(identity)
        .await
        .into_iter()
        .filter(|existing| *existing != id)
        .collect();
    state.store.set_token_ids(identity, &ids).await;

    tracing::info!(identity = %identity, "scoped token revoked");
    Ok(StatusCode::NO_CONTENT)
}
