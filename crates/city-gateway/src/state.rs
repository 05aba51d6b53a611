//! Shared application state for the gateway.
//!
//! [`AppState`] holds the engine handle (the only write path into the
//! world), the read-only public snapshot refreshed by the engine between
//! ticks, the immutable map data, and the token authority. Wrapped in
//! [`Arc`] and injected via Axum's `State` extractor.

use std::sync::Arc;

use city_core::config::SessionConfig;
use city_core::{EngineHandle, GatewayConfig, PublicSnapshot};
use city_world::TileMapData;
use tokio::sync::RwLock;

use crate::token::TokenAuthority;

/// Shared state for the Axum application.
#[derive(Clone)]
pub struct AppState {
    /// Write path into the tick worker.
    pub engine: EngineHandle,
    /// Read-only world projection, refreshed at perception cadence.
    pub snapshot: Arc<RwLock<PublicSnapshot>>,
    /// The static map as served by `GET /map`.
    pub map_data: Arc<TileMapData>,
    /// Credential signer/verifier.
    pub tokens: Arc<TokenAuthority>,
    /// Registration policy and passport prefix.
    pub gateway_config: GatewayConfig,
    /// Session queue limits.
    pub session_config: SessionConfig,
}

impl AppState {
    /// Assemble gateway state from engine wiring.
    pub fn new(
        engine: EngineHandle,
        snapshot: Arc<RwLock<PublicSnapshot>>,
        map_data: TileMapData,
        gateway_config: GatewayConfig,
        session_config: SessionConfig,
    ) -> Self {
        let tokens = Arc::new(TokenAuthority::new(
            &gateway_config.token_key,
            gateway_config.token_ttl_days,
        ));
        Self {
            engine,
            snapshot,
            map_data: Arc::new(map_data),
            tokens,
            gateway_config,
            session_config,
        }
    }
}
