//! /user handlers — the authenticated account's profile and presence.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use vigil_core::{Presence, Profile, RemoteUser};
use vigil_services::cache::{validate_user_id, CacheKey, Snapshot};
use vigil_services::Upstream;

use super::auth::{Authed, IdentityAuthed};
use super::{cached_json, require, ApiState};
use crate::error::ApiError;

/// Fetch the profile through the coalescing cache.
async fn profile_snapshot(state: &ApiState, auth: &Authed) -> Result<Snapshot<Profile>, ApiError> {
    let upstream = state.upstream.clone();
    let session = auth.session.clone();
    let snapshot = state
        .caches
        .profile
        .get_or_fetch(
            CacheKey::profile(&auth.session.identity),
            state.update_interval,
            async move { upstream.fetch_profile(&session).await },
        )
        .await?;
    Ok(snapshot)
}

// ── /user ─────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct UserResponse {
    user: Profile,
    updated: u64,
}

pub async fn handle_user(State(state): State<ApiState>, auth: Authed) -> Result<Response, ApiError> {
    require(auth.policy.as_ref(), |p| p.allows_profile())?;

    let snapshot = profile_snapshot(&state, &auth).await?;
    let updated = snapshot.updated;
    Ok(cached_json(
        &snapshot,
        UserResponse {
            user: snapshot.value.clone(),
            updated,
        },
    ))
}

// ── /user/presence ────────────────────────────────────────────────────────────

pub async fn handle_user_presence(
    State(state): State<ApiState>,
    auth: Authed,
) -> Result<Json<Presence>, ApiError> {
    require(auth.policy.as_ref(), |p| p.allows_presence())?;

    let snapshot = profile_snapshot(&state, &auth).await?;
    Ok(Json(snapshot.value.presence))
}

// ── /user/{id} ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RemoteUserResponse {
    pub user: RemoteUser,
}

/// Uncached passthrough lookup by 16-digit account id.
pub async fn handle_user_by_id(
    State(state): State<ApiState>,
    auth: IdentityAuthed,
    Path(id): Path<String>,
) -> Result<Json<RemoteUserResponse>, ApiError> {
    validate_user_id(&id).map_err(|err| ApiError::validation(err.to_string()))?;

    let user = state.upstream.fetch_user(&auth.session, &id).await?;
    Ok(Json(RemoteUserResponse { user }))
}
