//! REST endpoint handlers for the gateway's read surface.
//!
//! All reads are served from the public snapshot the engine refreshes
//! between ticks; no handler ever touches world state or the database.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/map` | Static map data |
//! | `GET` | `/resident/{id}` | Public record by id or passport |
//! | `GET` | `/status` | Counts and clock |
//! | `GET` | `/feed` | Recent narrative events |
//! | `GET` | `/buildings` | Per-building info payloads |
//! | `GET` | `/leaderboard` | Alive first, then longevity, then wallet |

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::state::AppState;

/// Query parameters for `GET /feed`.
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// Maximum events to return (default 50).
    pub limit: Option<usize>,
}

/// Serve a minimal HTML page showing server status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    let world_time = snapshot.world_time;
    let day = snapshot.day;
    let alive = snapshot.alive;
    let queued = snapshot.queued_for_train;
    let bodies = snapshot.bodies;

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>The City</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        li::before {{ content: "GET "; color: #7ee787; font-weight: bold; }}
        .status {{ color: #3fb950; font-weight: bold; }}
    </style>
</head>
<body>
    <h1>The City</h1>
    <p class="subtitle">Multi-agent simulation server</p>

    <p>Status: <span class="status">RUNNING</span></p>

    <div>
        <div class="metric">
            <div class="label">Game time</div>
            <div class="value">{world_time:.0}</div>
        </div>
        <div class="metric">
            <div class="label">Day</div>
            <div class="value">{day}</div>
        </div>
        <div class="metric">
            <div class="label">Alive</div>
            <div class="value">{alive}</div>
        </div>
        <div class="metric">
            <div class="label">On the train</div>
            <div class="value">{queued}</div>
        </div>
        <div class="metric">
            <div class="label">Bodies</div>
            <div class="value">{bodies}</div>
        </div>
    </div>

    <h2>API</h2>
    <ul>
        <li><a href="/map">/map</a></li>
        <li><a href="/status">/status</a></li>
        <li><a href="/feed">/feed</a></li>
        <li><a href="/buildings">/buildings</a></li>
        <li><a href="/leaderboard">/leaderboard</a></li>
    </ul>
</body>
</html>"#
    ))
}

/// `GET /map` -- the static map data.
pub async fn get_map(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.map_data.as_ref().clone())
}

/// `GET /resident/{id}` -- public record by resident id or passport.
pub async fn get_resident(
    State(state): State<Arc<AppState>>,
    Path(id_or_passport): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let snapshot = state.snapshot.read().await;
    let by_id = Uuid::parse_str(&id_or_passport).ok();
    let record = snapshot.residents.iter().find(|r| {
        by_id.is_some_and(|uuid| r.id.into_inner() == uuid) || r.passport == id_or_passport
    });
    record
        .map(|r| Json(r.clone()))
        .ok_or_else(|| GatewayError::NotFound(id_or_passport))
}

/// `GET /status` -- counts and the world clock.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(json!({
        "world_time": snapshot.world_time,
        "day": snapshot.day,
        "alive": snapshot.alive,
        "queued_for_train": snapshot.queued_for_train,
        "bodies": snapshot.bodies,
        "registered": snapshot.residents.len(),
    }))
}

/// `GET /feed` -- recent narrative events, newest first.
pub async fn get_feed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50).min(250);
    let snapshot = state.snapshot.read().await;
    let events: Vec<_> = snapshot.feed.iter().take(limit).cloned().collect();
    Json(events)
}

/// `GET /buildings` -- per-building info payloads.
pub async fn get_buildings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(snapshot.buildings.clone())
}

/// `GET /leaderboard` -- alive first, then longevity, then wallet.
pub async fn get_leaderboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(snapshot.leaderboard.clone())
}
