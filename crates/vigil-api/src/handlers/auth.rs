//! Credential resolution — request extractors for the two auth paths.
//!
//! Scoped tokens arrive as `Authorization: Bearer <id>` or `?token=`; the
//! token's bound identity is resolved through its stored secret and the
//! token's policy is attached to the request. Identity secrets arrive as
//! `Authorization: Secret <secret>`. With `require_secret` off, `?identity=`
//! selects a stored secret for that identity (trusted local use).

use std::sync::Arc;

use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use serde::{Deserialize, Serialize};

use vigil_core::policy::TokenPolicy;
use vigil_services::{SessionHandle, Store};

use super::ApiState;
use crate::error::ApiError;

#[derive(Deserialize)]
struct AuthQuery {
    token: Option<String>,
    identity: Option<String>,
}

/// A request authenticated either way: always a session, plus the policy and
/// token id when a scoped token was presented.
pub struct Authed {
    pub session: Arc<SessionHandle>,
    pub policy: Option<TokenPolicy>,
    pub token: Option<String>,
}

/// A request authenticated by identity secret only. Endpoints using this do
/// not accept scoped tokens at all (lookup, raw upstream passthroughs, the
/// event stream).
pub struct IdentityAuthed {
    pub session: Arc<SessionHandle>,
}

fn auth_query(parts: &Parts) -> AuthQuery {
    // An unparsable query string just means no auth-relevant parameters.
    Query::<AuthQuery>::try_from_uri(&parts.uri)
        .map(|Query(q)| q)
        .unwrap_or(AuthQuery {
            token: None,
            identity: None,
        })
}

fn header_scheme<'a>(parts: &'a Parts, scheme: &str) -> Option<&'a str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(scheme))
}

/// Resolve an identity secret from the request, honoring the
/// `?identity=` fallback when secrets are not required.
async fn secret_from_request(parts: &Parts, state: &ApiState) -> Result<String, ApiError> {
    if let Some(secret) = header_scheme(parts, "Secret ") {
        return Ok(secret.to_string());
    }
    if !state.require_secret {
        if let Some(identity) = auth_query(parts).identity {
            if let Some(secret) = state.store.identity_secret(&identity).await {
                return Ok(secret);
            }
        }
    }
    Err(ApiError::unauthenticated(
        "an identity secret is required",
    ))
}

impl FromRequestParts<ApiState> for Authed {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        // Scoped-token path first. An unknown token id falls through rather
        // than failing: the request is simply unauthenticated for policy
        // purposes and may still carry a secret.
        let candidate = header_scheme(parts, "Bearer ")
            .map(str::to_string)
            .or_else(|| auth_query(parts).token);

        if let Some(id) = candidate {
            if let Some(token) = state.store.load_token(&id).await {
                let secret = state
                    .store
                    .identity_secret(&token.identity)
                    .await
                    .ok_or_else(|| {
                        ApiError::unauthenticated(
                            "the identity bound to this token must re-authenticate",
                        )
                    })?;
                let session = state.gate.resolve(&secret).await?;
                return Ok(Authed {
                    session,
                    policy: Some(token.policy),
                    token: Some(id),
                });
            }
        }

        let secret = secret_from_request(parts, state).await?;
        let session = state.gate.resolve(&secret).await?;
        Ok(Authed {
            session,
            policy: None,
            token: None,
        })
    }
}

impl FromRequestParts<ApiState> for IdentityAuthed {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let secret = secret_from_request(parts, state).await?;
        let session = state.gate.resolve(&secret).await?;
        Ok(IdentityAuthed { session })
    }
}

// ── /session ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionResponse {
    pub identity: String,
    pub presence_id: String,
    pub display_name: String,
    pub issued_at: u64,
}

/// The resolved session, without its upstream credential.
pub async fn handle_session(auth: Authed) -> Json<SessionResponse> {
    let session = &auth.session;
    Json(SessionResponse {
        identity: session.identity.clone(),
        presence_id: session.presence_id.clone(),
        display_name: session.display_name.clone(),
        issued_at: session.issued_at,
    })
}
