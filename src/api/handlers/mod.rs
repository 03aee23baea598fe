//! API request handlers

pub mod resolver;
pub mod torrents;

use axum::{extract::State, Json};
use serde_json::json;

use super::AppState;

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "dns_healthy": state.probe.is_healthy(),
        "autoload_dir": state.autoload_dir,
        "active_torrents": state.engine.active_count(),
    }))
}
