//! HTTP API handlers — the cached upstream entities as JSON.

pub mod auth;
pub mod friends;
pub mod lookup;
pub mod profile;
pub mod services;
pub mod stream;
pub mod tokens;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use vigil_core::policy::TokenPolicy;
use vigil_core::{Announcement, Friend, FriendCodeInfo, Profile, RemoteUser};
use vigil_services::{AppData, AuthGate, PresenceDiffer, Snapshot, Store, TtlCache, Upstream};

use crate::error::ApiError;

/// One cache per entity kind, shared by every request and the presence pump.
#[derive(Default)]
pub struct EntityCaches {
    pub profile: TtlCache<Profile>,
    pub friends: TtlCache<Vec<Friend>>,
    pub app: TtlCache<AppData>,
    pub code_url: TtlCache<FriendCodeInfo>,
    pub lookup: TtlCache<Option<RemoteUser>>,
    pub announcements: TtlCache<Vec<Announcement>>,
}

#[derive(Clone)]
pub struct ApiState {
    pub gate: Arc<AuthGate>,
    pub upstream: Arc<dyn Upstream>,
    pub store: Arc<dyn Store>,
    pub differ: Arc<dyn PresenceDiffer>,
    pub caches: Arc<EntityCaches>,
    /// If false, `?identity=` may select a stored secret.
    pub require_secret: bool,
    /// Freshness window for per-identity entities.
    pub update_interval: Duration,
    pub lookup_ttl: Duration,
    pub negative_lookup_ttl: Duration,
    pub announcement_ttl: Duration,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Gate a capability: no policy means a trusted local caller.
pub(crate) fn require(
    policy: Option<&TokenPolicy>,
    allowed: impl FnOnce(&TokenPolicy) -> bool,
) -> Result<(), ApiError> {
    match policy {
        None => Ok(()),
        Some(policy) if allowed(policy) => Ok(()),
        Some(_) => Err(ApiError::Forbidden),
    }
}

/// JSON response with the freshness header derived from the cache snapshot:
/// max-age counts down to `(updated + ttl)`.
pub(crate) fn cached_json<T: Serialize, V>(snapshot: &Snapshot<V>, body: T) -> Response {
    let mut response = Json(body).into_response();
    let value = format!(
        "private, immutable, max-age={}",
        snapshot.max_age.as_secs()
    );
    if let Ok(value) = HeaderValue::from_str(&value) {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, value);
    }
    response
}

// Re-export handler functions for use in router setup.
pub use auth::handle_session;
pub use friends::{
    handle_favorites, handle_favorites_presence, handle_friend, handle_friend_presence,
    handle_friend_update, handle_friends, handle_friends_presence,
};
pub use lookup::{handle_friend_code_lookup, handle_own_friend_code};
pub use profile::{handle_user, handle_user_by_id, handle_user_presence};
pub use services::{
    handle_active_event, handle_announcements, handle_event, handle_webservice_token,
    handle_webservices,
};
pub use stream::handle_event_stream;
pub use tokens::{
    handle_token_create, handle_token_inspect, handle_token_list, handle_token_revoke,
};
