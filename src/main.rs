//! torrhost server binary

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use torrhost::api::{self, AppState};
use torrhost::config::Settings;
use torrhost::db::Database;
use torrhost::engine::LocalEngine;
use torrhost::resolver::Prober;
use torrhost::watcher::{WatchOptions, Watcher};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting torrhost v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!("Configuration loaded from {:?}", settings.config_path());

    // Initialize database
    let db = if settings.database.read_only {
        Database::open_read_only(&settings.database.path)?
    } else {
        let db = Database::new(&settings.database.path)?;
        db.migrate()?;
        db
    };
    info!(
        read_only = settings.database.read_only,
        "Database initialized at {:?}", settings.database.path
    );

    // Must finish before anything resolves names or the listener binds
    let probe = Prober::new().probe().await;

    let engine = Arc::new(
        LocalEngine::new(db.clone(), probe.resolver.clone(), settings.database.read_only)
            .context("Failed to create torrent engine")?,
    );

    // Start the autoload watcher
    if let Some(dir) = &settings.autoload.dir {
        let watcher = Watcher::new(engine.clone(), dir, WatchOptions::from(&settings.autoload));
        info!("Autoloading torrents from {:?}", watcher.target());
        watcher.spawn();
    }

    // Create application state
    let state = AppState {
        db,
        engine,
        probe: Arc::new(probe),
        autoload_dir: settings.autoload.dir.clone(),
    };

    // Build router
    let app = api::create_router(state);

    // Start server
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "torrhost=info,tower_http=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var("TORRHOST_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
