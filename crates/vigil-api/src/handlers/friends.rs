//! /friends and /friend handlers — roster, favorites, and per-friend
//! presence, filtered by the token's allow-lists.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use vigil_core::policy::TokenPolicy;
use vigil_core::{Friend, Presence};
use vigil_services::cache::{CacheKey, Snapshot};
use vigil_services::Upstream;

use super::auth::{Authed, IdentityAuthed};
use super::{cached_json, require, ApiState};
use crate::error::ApiError;

pub(crate) async fn friends_snapshot(
    state: &ApiState,
    identity: &str,
    session: std::sync::Arc<vigil_services::SessionHandle>,
) -> Result<Snapshot<Vec<Friend>>, ApiError> {
    let upstream = state.upstream.clone();
    let snapshot = state
        .caches
        .friends
        .get_or_fetch(
            CacheKey::friends(identity),
            state.update_interval,
            async move { upstream.fetch_friends(&session).await },
        )
        .await?;
    Ok(snapshot)
}

/// Roster entries visible to the policy, if any.
fn visible<'a>(friends: &'a [Friend], policy: Option<&TokenPolicy>) -> Vec<&'a Friend> {
    friends
        .iter()
        .filter(|friend| policy.map_or(true, |p| p.friend_visible(&friend.id)))
        .collect()
}

/// Entries whose presence the policy may see.
fn presence_visible<'a>(friends: &'a [Friend], policy: Option<&TokenPolicy>) -> Vec<&'a Friend> {
    friends
        .iter()
        .filter(|friend| policy.map_or(true, |p| p.friend_presence_visible(&friend.id)))
        .collect()
}

// ── /friends, /friends/favorites ──────────────────────────────────────────────

#[derive(Serialize)]
struct FriendsResponse<'a> {
    friends: Vec<&'a Friend>,
    updated: u64,
}

pub async fn handle_friends(
    State(state): State<ApiState>,
    auth: Authed,
) -> Result<Response, ApiError> {
    require(auth.policy.as_ref(), |p| p.allows_list_friends())?;

    let snapshot = friends_snapshot(&state, &auth.session.identity, auth.session.clone()).await?;
    let friends = visible(&snapshot.value, auth.policy.as_ref());
    Ok(cached_json(
        &snapshot,
        FriendsResponse {
            friends,
            updated: snapshot.updated,
        },
    ))
}

pub async fn handle_favorites(
    State(state): State<ApiState>,
    auth: Authed,
) -> Result<Response, ApiError> {
    require(auth.policy.as_ref(), |p| p.allows_list_friends())?;

    let snapshot = friends_snapshot(&state, &auth.session.identity, auth.session.clone()).await?;
    let friends: Vec<&Friend> = visible(&snapshot.value, auth.policy.as_ref())
        .into_iter()
        .filter(|friend| friend.is_favorite)
        .collect();
    Ok(cached_json(
        &snapshot,
        FriendsResponse {
            friends,
            updated: snapshot.updated,
        },
    ))
}

// ── /friends/presence, /friends/favorites/presence ────────────────────────────

pub async fn handle_friends_presence(
    State(state): State<ApiState>,
    auth: Authed,
) -> Result<Response, ApiError> {
    require(auth.policy.as_ref(), |p| p.allows_list_friends_presence())?;

    let snapshot = friends_snapshot(&state, &auth.session.identity, auth.session.clone()).await?;
    let presence: HashMap<&str, &Presence> = presence_visible(&snapshot.value, auth.policy.as_ref())
        .into_iter()
        .map(|friend| (friend.id.as_str(), &friend.presence))
        .collect();
    Ok(cached_json(&snapshot, presence))
}

pub async fn handle_favorites_presence(
    State(state): State<ApiState>,
    auth: Authed,
) -> Result<Response, ApiError> {
    require(auth.policy.as_ref(), |p| p.allows_list_friends_presence())?;

    let snapshot = friends_snapshot(&state, &auth.session.identity, auth.session.clone()).await?;
    let presence: HashMap<&str, &Presence> = presence_visible(&snapshot.value, auth.policy.as_ref())
        .into_iter()
        .filter(|friend| friend.is_favorite)
        .map(|friend| (friend.id.as_str(), &friend.presence))
        .collect();
    Ok(cached_json(&snapshot, presence))
}

// ── /friend/{id} ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct FriendResponse<'a> {
    friend: &'a Friend,
    updated: u64,
}

fn find_friend<'a>(friends: &'a [Friend], id: &str) -> Result<&'a Friend, ApiError> {
    friends.iter().find(|f| f.id == id).ok_or_else(|| {
        ApiError::not_found("the user is not friends with the authenticated user")
    })
}

pub async fn handle_friend(
    State(state): State<ApiState>,
    auth: Authed,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(auth.policy.as_ref(), |p| p.allows_friend(&id))?;

    let snapshot = friends_snapshot(&state, &auth.session.identity, auth.session.clone()).await?;
    let friend = find_friend(&snapshot.value, &id)?;
    Ok(cached_json(
        &snapshot,
        FriendResponse {
            friend,
            updated: snapshot.updated,
        },
    ))
}

pub async fn handle_friend_presence(
    State(state): State<ApiState>,
    auth: Authed,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(auth.policy.as_ref(), |p| p.allows_friend_presence(&id))?;

    let snapshot = friends_snapshot(&state, &auth.session.identity, auth.session.clone()).await?;
    let friend = find_friend(&snapshot.value, &id)?;
    Ok(cached_json(&snapshot, &friend.presence))
}

// ── /friend/{id} (POST) ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct FriendUpdateRequest {
    pub is_favorite: Option<bool>,
}

/// Toggle the favorite flag. Scoped tokens are not accepted here; this
/// mutates upstream state.
pub async fn handle_friend_update(
    State(state): State<ApiState>,
    auth: IdentityAuthed,
    Path(id): Path<String>,
    Json(request): Json<FriendUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let snapshot =
        friends_snapshot(&state, &auth.session.identity, auth.session.clone()).await?;
    let friend = find_friend(&snapshot.value, &id)?;

    if let Some(favorite) = request.is_favorite {
        if friend.is_favorite != favorite {
            state
                .upstream
                .set_favorite(&auth.session, &id, favorite)
                .await?;
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
