//! vigil-api — HTTP surface over the presence core.

pub mod error;
pub mod handlers;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use handlers::ApiState;

/// Build the full router. Exposed separately from [`serve`] so tests can
/// drive it on an ephemeral listener.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/session", get(handlers::handle_session))
        .route("/token", get(handlers::handle_token_inspect).delete(handlers::handle_token_revoke))
        .route("/tokens", get(handlers::handle_token_list).post(handlers::handle_token_create))
        .route("/announcements", get(handlers::handle_announcements))
        .route("/user", get(handlers::handle_user))
        .route("/user/presence", get(handlers::handle_user_presence))
        .route("/user/{id}", get(handlers::handle_user_by_id))
        .route("/friends", get(handlers::handle_friends))
        .route("/friends/favorites", get(handlers::handle_favorites))
        .route("/friends/presence", get(handlers::handle_friends_presence))
        .route(
            "/friends/favorites/presence",
            get(handlers::handle_favorites_presence),
        )
        .route(
            "/friend/{id}",
            get(handlers::handle_friend).post(handlers::handle_friend_update),
        )
        .route("/friend/{id}/presence", get(handlers::handle_friend_presence))
        .route("/webservices", get(handlers::handle_webservices))
        .route("/webservice/{id}/token", get(handlers::handle_webservice_token))
        .route("/activeevent", get(handlers::handle_active_event))
        .route("/event/{id}", get(handlers::handle_event))
        .route("/friendcode", get(handlers::handle_own_friend_code))
        .route("/friendcode/{code}", get(handlers::handle_friend_code_lookup))
        .route("/events", get(handlers::handle_event_stream))
        .with_state(state);

    Router::new()
        .nest("/api/presence", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, app).await?;
    Ok(())
}
