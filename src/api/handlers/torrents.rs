//! Persisted torrent handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::{AppError, AppState};
use crate::db::TorrentRecord;
use crate::engine::{AddOptions, TorrentEngine, TorrentHandle};

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    /// `http(s)://`, `magnet:` or bare info hash
    pub link: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddResponse {
    pub info_hash: String,
    pub title: String,
    pub name: String,
    pub has_metadata: bool,
}

/// List persisted torrents
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<TorrentRecord>>, AppError> {
    Ok(Json(state.db.list_torrents()?))
}

/// Get a persisted torrent by info hash
pub async fn get_one(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<TorrentRecord>, AppError> {
    state
        .db
        .get_torrent(&hash.to_ascii_lowercase())?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Torrent not found: {}", hash)))
}

/// Add a torrent by link
///
/// Returns 201 once the record is saved, or 202 when the engine is still
/// waiting for metadata.
pub async fn add(
    State(state): State<AppState>,
    Json(req): Json<AddRequest>,
) -> Result<(StatusCode, Json<AddResponse>), AppError> {
    let scheme = req.link.get(..5).unwrap_or_default();
    if scheme.eq_ignore_ascii_case("file:") {
        return Err(AppError::bad_request(
            "Local files are loaded through the autoload directory",
        ));
    }

    let engine = &state.engine;
    let source = engine.parse_source(&req.link).await?;
    let options = AddOptions {
        title: req.title,
        category: req.category,
    };
    let mut torrent = engine.add_torrent(source, options).await?;

    let mut response = AddResponse {
        info_hash: torrent.info_hash().to_string(),
        title: torrent.title().to_string(),
        name: torrent.name().to_string(),
        has_metadata: torrent.has_metadata(),
    };
    if !response.has_metadata {
        return Ok((StatusCode::ACCEPTED, Json(response)));
    }

    if torrent.title().is_empty() {
        let name = torrent.name().to_string();
        torrent.set_title(name);
    }
    response.title = torrent.title().to_string();

    let persisted = engine.persist(&torrent).await;
    engine.release(torrent).await;
    persisted?;

    Ok((StatusCode::CREATED, Json(response)))
}
