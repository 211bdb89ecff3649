//! Library surface for `zen-claw-service`: the Streaming Plane and HTTP/WS
//! routes, exposed so integration tests can build an `AppState` and drive
//! the router directly instead of shelling out to the binary.

pub mod client_registry;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use state::AppState;
use tower_http::cors::CorsLayer;

/// Builds the full `axum::Router` wiring every route onto `state`, exactly
/// as the process entry point does. Shared by `main.rs` and integration
/// tests so the two never drift apart.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/chat", post(routes::chat))
        .route("/chat/stream", post(routes::chat_stream))
        .route("/sessions", get(routes::list_sessions))
        .route("/sessions/:id", get(routes::get_session).delete(routes::delete_session))
        .route("/sessions/:id/background", post(routes::background_session))
        .route("/sessions/:id/activate", post(routes::activate_session))
        .route("/sessions/:id/stream", get(routes::session_stream))
        .route("/preferences", get(routes::preferences))
        .route("/ws", get(ws::ws_handler))
        .fallback(routes::not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
