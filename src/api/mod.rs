//! HTTP API layer

mod error;
pub mod handlers;

use axum::{routing::get, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::Database;
use crate::engine::LocalEngine;
use crate::resolver::ProbeReport;

pub use error::AppError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: Arc<LocalEngine>,
    pub probe: Arc<ProbeReport>,
    pub autoload_dir: Option<PathBuf>,
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/resolver", get(handlers::resolver::status))
        .route(
            "/torrents",
            get(handlers::torrents::list).post(handlers::torrents::add),
        )
        .route("/torrents/{hash}", get(handlers::torrents::get_one));

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TorrentRecord;
    use crate::resolver::{Attempt, ProbeResult, Resolver};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn state() -> AppState {
        let db = Database::in_memory().unwrap();
        db.migrate().unwrap();
        let engine = LocalEngine::new(db.clone(), Resolver::system(), false).unwrap();
        AppState {
            db,
            engine: Arc::new(engine),
            probe: Arc::new(ProbeReport {
                resolver: Resolver::system(),
                attempts: vec![Attempt {
                    server: None,
                    result: ProbeResult::NativeOk,
                }],
            }),
            autoload_dir: Some(PathBuf::from("/srv/drop")),
        }
    }

    async fn get(state: AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn post(
        state: AppState,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = create_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get(state(), "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["dns_healthy"], true);
        assert_eq!(body["autoload_dir"], "/srv/drop");
    }

    #[tokio::test]
    async fn test_resolver_status() {
        let (status, body) = get(state(), "/api/resolver").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["upstream"].is_null());
        assert_eq!(body["attempts"][0]["result"], "native_ok");
    }

    #[tokio::test]
    async fn test_torrents() {
        let state = state();
        let now = chrono::Utc::now();
        state
            .db
            .upsert_torrent(&TorrentRecord {
                info_hash: "0123456789abcdef0123456789abcdef01234567".to_string(),
                title: "Movie".to_string(),
                name: "movie.mkv".to_string(),
                category: None,
                size: 10,
                file_count: 1,
                metainfo: None,
                created_at: now,
                updated_at: now,
            })
            .unwrap();

        let (status, body) = get(state.clone(), "/api/torrents").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = get(
            state.clone(),
            "/api/torrents/0123456789ABCDEF0123456789ABCDEF01234567",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Movie");

        let (status, body) = get(state, "/api/torrents/ffff").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("ffff"));
    }

    #[tokio::test]
    async fn test_add_magnet_waits_for_metadata() {
        let state = state();
        let link = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=Film";

        let (status, body) = post(state.clone(), "/api/torrents", json!({ "link": link })).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["has_metadata"], false);
        assert_eq!(body["name"], "Film");
        assert_eq!(state.engine.active_count(), 1);
        assert!(state.db.list_torrents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_rejects_local_and_unknown_links() {
        let (status, body) = post(
            state(),
            "/api/torrents",
            json!({ "link": "file:///srv/drop/movie.torrent" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = post(state(), "/api/torrents", json!({ "link": "ftp://x/y" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
