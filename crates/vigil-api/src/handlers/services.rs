//! /webservices, /activeevent, /event, /announcements handlers.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use vigil_core::{ActiveEvent, Announcement, WebService, WebServiceToken};
use vigil_services::cache::{CacheKey, Snapshot};
use vigil_services::{AppData, Upstream};

use super::auth::{Authed, IdentityAuthed};
use super::{cached_json, require, ApiState};
use crate::error::ApiError;

/// Web services and the active event share one freshness unit, fetched
/// together the way the upstream app refreshes them.
async fn app_snapshot(state: &ApiState, auth: &Authed) -> Result<Snapshot<AppData>, ApiError> {
    let upstream = state.upstream.clone();
    let session = auth.session.clone();
    let snapshot = state
        .caches
        .app
        .get_or_fetch(
            CacheKey::app(&auth.session.identity),
            state.update_interval,
            async move {
                let (webservices, active_event) = futures::try_join!(
                    upstream.fetch_web_services(&session),
                    upstream.fetch_active_event(&session),
                )?;
                Ok(AppData {
                    webservices,
                    active_event,
                })
            },
        )
        .await?;
    Ok(snapshot)
}

// ── /webservices ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct WebServicesResponse {
    webservices: Vec<WebService>,
    updated: u64,
}

pub async fn handle_webservices(
    State(state): State<ApiState>,
    auth: Authed,
) -> Result<Response, ApiError> {
    require(auth.policy.as_ref(), |p| p.allows_webservices())?;

    let snapshot = app_snapshot(&state, &auth).await?;
    Ok(cached_json(
        &snapshot,
        WebServicesResponse {
            webservices: snapshot.value.webservices.clone(),
            updated: snapshot.updated,
        },
    ))
}

// ── /webservice/{id}/token ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct WebServiceTokenResponse {
    pub token: WebServiceToken,
}

/// Tokens are single-use upstream credentials; never cached.
pub async fn handle_webservice_token(
    State(state): State<ApiState>,
    auth: IdentityAuthed,
    Path(id): Path<u64>,
) -> Result<Json<WebServiceTokenResponse>, ApiError> {
    let token = state.upstream.web_service_token(&auth.session, id).await?;
    Ok(Json(WebServiceTokenResponse { token }))
}

// ── /activeevent ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ActiveEventResponse {
    activeevent: Option<ActiveEvent>,
    updated: u64,
}

pub async fn handle_active_event(
    State(state): State<ApiState>,
    auth: Authed,
) -> Result<Response, ApiError> {
    require(auth.policy.as_ref(), |p| p.allows_active_event())?;

    let snapshot = app_snapshot(&state, &auth).await?;
    Ok(cached_json(
        &snapshot,
        ActiveEventResponse {
            activeevent: snapshot.value.active_event.clone(),
            updated: snapshot.updated,
        },
    ))
}

// ── /event/{id} ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventResponse {
    pub event: ActiveEvent,
}

pub async fn handle_event(
    State(state): State<ApiState>,
    auth: IdentityAuthed,
    Path(id): Path<u64>,
) -> Result<Json<EventResponse>, ApiError> {
    let event = state.upstream.fetch_event(&auth.session, id).await?;
    Ok(Json(EventResponse { event }))
}

// ── /announcements ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct AnnouncementsResponse {
    announcements: Vec<Announcement>,
    updated: u64,
}

/// Announcements are identical for every identity; one cache entry serves
/// all callers.
pub async fn handle_announcements(
    State(state): State<ApiState>,
    auth: Authed,
) -> Result<Response, ApiError> {
    require(auth.policy.as_ref(), |p| p.allows_announcements())?;

    let upstream = state.upstream.clone();
    let session = auth.session.clone();
    let snapshot = state
        .caches
        .announcements
        .get_or_fetch(
            CacheKey::announcements(),
            state.announcement_ttl,
            async move { upstream.fetch_announcements(&session).await },
        )
        .await?;
    Ok(cached_json(
        &snapshot,
        AnnouncementsResponse {
            announcements: snapshot.value.clone(),
            updated: snapshot.updated,
        },
    ))
}
