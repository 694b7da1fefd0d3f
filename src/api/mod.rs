//! HTTP API module for the Tilerealm server
//!
//! This module provides read-only HTTP endpoints for:
//! - Health checks
//! - Server information used by clients before connecting
//!
//! The API is built with Axum and shares the game server's [`AppState`].

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::game::world::TileMetadata;
use crate::state::AppState;
use crate::VERSION;

/// API version prefix
pub const API_VERSION: &str = "v1";

/// Server information returned by `GET /info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub tile_size: u32,
    pub areas: usize,
    pub players_online: usize,
    pub tick_rate_ms: u64,
    pub walk_delay_ms: u64,
    /// Side of the square player footprint in pixels
    pub entity_size: u32,
    /// Per-tile collision boxes, for client-side movement prediction
    pub tileset: Vec<TileMetadata>,
}

impl ServerInfo {
    /// Collect the current server information
    pub fn collect(state: &AppState) -> Self {
        Self {
            name: state.config.server_name.clone(),
            version: VERSION.to_string(),
            tile_size: state.world.tile_size(),
            areas: state.world.area_count(),
            players_online: state.players_online(),
            tick_rate_ms: state.config.tick_rate_ms,
            walk_delay_ms: state.config.walk_delay_ms,
            entity_size: state.config.entity_size,
            tileset: state.world.tileset().to_vec(),
        }
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info));

    Router::new()
        .nest(&format!("/api/{}", API_VERSION), api_routes)
        // Add CORS middleware
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        // Add request tracing
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Server information endpoint
async fn server_info(State(state): State<Arc<AppState>>) -> Json<ServerInfo> {
    Json(ServerInfo::collect(&state))
}
