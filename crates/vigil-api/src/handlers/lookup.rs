//! /friendcode handlers — own code, and lookup by code with negative caching.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use vigil_core::{FriendCodeInfo, RemoteUser};
use vigil_services::cache::CacheKey;
use vigil_services::Upstream;

use super::auth::IdentityAuthed;
use super::{cached_json, ApiState};
use crate::error::ApiError;

// ── /friendcode ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OwnCodeResponse {
    friendcode: FriendCodeInfo,
    updated: u64,
}

pub async fn handle_own_friend_code(
    State(state): State<ApiState>,
    auth: IdentityAuthed,
) -> Result<Response, ApiError> {
    let upstream = state.upstream.clone();
    let session = auth.session.clone();
    let snapshot = state
        .caches
        .code_url
        .get_or_fetch(
            CacheKey::code_url(&auth.session.identity),
            state.update_interval,
            async move { upstream.friend_code_info(&session).await },
        )
        .await?;
    Ok(cached_json(
        &snapshot,
        OwnCodeResponse {
            friendcode: snapshot.value.clone(),
            updated: snapshot.updated,
        },
    ))
}

// ── /friendcode/{code} ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct LookupResponse {
    user: RemoteUser,
    updated: u64,
}

/// Look a user up by friend code. Codes change rarely, so positive results
/// cache far longer than presence data; codes known to be unassigned cache
/// longer still, under the negative TTL.
pub async fn handle_friend_code_lookup(
    State(state): State<ApiState>,
    auth: IdentityAuthed,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    // Validated at key construction, before any cache or upstream work.
    let key = CacheKey::lookup(&auth.session.identity, &code)
        .map_err(|err| ApiError::validation(err.to_string()))?;

    let upstream = state.upstream.clone();
    let session = auth.session.clone();
    let snapshot = state
        .caches
        .lookup
        .get_or_lookup(
            key,
            state.lookup_ttl,
            state.negative_lookup_ttl,
            async move { upstream.lookup_by_code(&session, &code).await },
        )
        .await?;

    match &snapshot.value {
        Some(user) => Ok(cached_json(
            &snapshot,
            LookupResponse {
                user: user.clone(),
                updated: snapshot.updated,
            },
        )),
        None => {
            // The absence itself is cached; answer 404 with the same
            // freshness header a hit would carry.
            let mut response = cached_json(
                &snapshot,
                json!({
                    "error": "not_found",
                    "error_message": "no user holds this friend code",
                }),
            )
            .into_response();
            *response.status_mut() = StatusCode::NOT_FOUND;
            Ok(response)
        }
    }
}
