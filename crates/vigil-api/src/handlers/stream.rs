//! /events handler — server-push stream of semantic presence events.
//!
//! Each connection polls the shared friends cache on the update interval,
//! runs the differ against its previous snapshot, and forwards the events.
//! Concurrent streams for one identity still produce one upstream fetch per
//! freshness window — they all join the same in-flight fetch. An upstream
//! failure terminates the stream with an `error` event.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::Stream;
use serde_json::json;

use vigil_core::Friend;
use vigil_services::cache::CacheKey;
use vigil_services::{PresenceDiffer, PresenceEvent, Upstream};

use super::auth::IdentityAuthed;
use super::ApiState;

fn sse_event(event: &PresenceEvent) -> Option<Event> {
    let data = serde_json::to_string(event).ok()?;
    Some(Event::default().event(event.kind.name()).data(data))
}

fn error_event(code: &str, message: &str) -> Event {
    let body = json!({ "error": code, "error_message": message });
    Event::default().event("error").data(body.to_string())
}

pub async fn handle_event_stream(
    State(state): State<ApiState>,
    auth: IdentityAuthed,
) -> impl IntoResponse {
    let stream = event_stream(state, auth);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn event_stream(
    state: ApiState,
    auth: IdentityAuthed,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let session = auth.session;
        let mut prev: Vec<Friend> = Vec::new();
        let mut first = true;
        let mut ticker = tokio::time::interval(state.update_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let upstream = state.upstream.clone();
            let fetch_session = session.clone();
            let result = state
                .caches
                .friends
                .get_or_fetch(
                    CacheKey::friends(&session.identity),
                    state.update_interval,
                    async move { upstream.fetch_friends(&fetch_session).await },
                )
                .await;

            match result {
                Ok(snapshot) => {
                    if !first {
                        for event in state.differ.diff(&prev, &snapshot.value) {
                            if let Some(event) = sse_event(&event) {
                                yield Ok(event);
                            }
                        }
                    }
                    prev = snapshot.value;
                    first = false;
                }
                Err(err) => {
                    tracing::debug!(error = %err, "event stream fetch failed, closing");
                    yield Ok(error_event("upstream_error", &err.to_string()));
                    break;
                }
            }
        }
    }
}
