//! Axum router construction for the gateway.
//!
//! Assembles all routes (registration, `WebSocket` sessions, read API)
//! into a single [`Router`] with CORS middleware enabled for dashboard
//! and harness access.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::registration;
use crate::session;
use crate::state::AppState;

/// Build the complete Axum router for the gateway.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `POST /passport` -- registration
/// - `GET /connect` -- player and spectator `WebSocket` sessions
/// - `GET /map`, `/resident/{id}`, `/status`, `/feed`, `/buildings`,
///   `/leaderboard` -- the read surface
///
/// CORS is configured to allow any origin for development. In
/// production this should be restricted.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // Registration and sessions
        .route("/passport", post(registration::register))
        .route("/connect", get(session::connect))
        // Read API
        .route("/map", get(handlers::get_map))
        .route("/resident/{id}", get(handlers::get_resident))
        .route("/status", get(handlers::get_status))
        .route("/feed", get(handlers::get_feed))
        .route("/buildings", get(handlers::get_buildings))
        .route("/leaderboard", get(handlers::get_leaderboard))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
