//! Resolver status

use axum::{extract::State, Json};
use serde::Serialize;
use std::net::SocketAddr;

use crate::api::AppState;
use crate::resolver::Attempt;

#[derive(Debug, Serialize)]
pub struct ResolverStatus {
    /// DNS server lookups are pinned to; absent when the system resolver is used
    pub upstream: Option<SocketAddr>,
    pub healthy: bool,
    pub attempts: Vec<Attempt>,
}

/// Outcome of the startup probe
pub async fn status(State(state): State<AppState>) -> Json<ResolverStatus> {
    Json(ResolverStatus {
        upstream: state.probe.resolver.upstream(),
        healthy: state.probe.is_healthy(),
        attempts: state.probe.attempts.clone(),
    })
}
