//! SQLite-backed engine

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use super::source::{self, Link};
use super::{AddOptions, EngineError, Metainfo, Result, Torrent, TorrentEngine, TorrentSource};
use crate::db::{Database, TorrentRecord};
use crate::resolver::Resolver;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client settings for remote sources; names resolve through `resolver`
fn client_builder(resolver: Resolver) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .dns_resolver(Arc::new(resolver))
        .timeout(FETCH_TIMEOUT)
}

/// Engine that keeps ingested torrents in memory and persists them to SQLite
pub struct LocalEngine {
    db: Database,
    http_client: reqwest::Client,
    read_only: bool,
    active: Mutex<HashMap<String, Torrent>>,
}

impl LocalEngine {
    /// Remote sources are fetched through `resolver`
    pub fn new(db: Database, resolver: Resolver, read_only: bool) -> Result<Self> {
        let http_client = client_builder(resolver).build()?;
        Ok(Self::with_client(db, http_client, read_only))
    }

    fn with_client(db: Database, http_client: reqwest::Client, read_only: bool) -> Self {
        Self {
            db,
            http_client,
            read_only,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Number of torrents currently held in memory
    pub fn active_count(&self) -> usize {
        self.active().len()
    }

    pub fn is_active(&self, info_hash: &str) -> bool {
        self.active().contains_key(info_hash)
    }

    fn active(&self) -> std::sync::MutexGuard<'_, HashMap<String, Torrent>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http_client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Metainfo for a hash we persisted before, if any
    fn stored_metainfo(&self, info_hash: &str) -> Result<Option<Metainfo>> {
        let Some(raw) = self.db.get_torrent(info_hash)?.and_then(|r| r.metainfo) else {
            return Ok(None);
        };
        Ok(Metainfo::from_bytes(raw).ok())
    }
}

#[async_trait]
impl TorrentEngine for LocalEngine {
    type Source = TorrentSource;
    type Handle = Torrent;

    async fn parse_source(&self, uri: &str) -> Result<TorrentSource> {
        match source::classify(uri)? {
            Link::File(path) => {
                let raw = tokio::fs::read(&path).await?;
                Ok(TorrentSource::Metainfo(Metainfo::from_bytes(raw)?))
            }
            Link::Remote(url) => {
                let raw = self.fetch(&url).await?;
                Ok(TorrentSource::Metainfo(Metainfo::from_bytes(raw)?))
            }
            Link::Magnet(link) => source::parse_magnet(&link),
        }
    }

    async fn add_torrent(&self, source: TorrentSource, options: AddOptions) -> Result<Torrent> {
        let (info_hash, name, meta) = match source {
            TorrentSource::Metainfo(meta) => {
                (meta.info_hash.clone(), meta.name.clone(), Some(meta))
            }
            TorrentSource::Magnet { info_hash, name, .. } => {
                let meta = self.stored_metainfo(&info_hash)?;
                let name = meta
                    .as_ref()
                    .map(|m| m.name.clone())
                    .or(name)
                    .unwrap_or_else(|| info_hash.clone());
                (info_hash, name, meta)
            }
        };

        let torrent = Torrent {
            info_hash: info_hash.clone(),
            title: options.title.unwrap_or_default(),
            name,
            category: options.category,
            meta,
        };

        debug!(%info_hash, has_metadata = torrent.meta.is_some(), "torrent added");
        self.active().insert(info_hash, torrent.clone());
        Ok(torrent)
    }

    async fn persist(&self, torrent: &Torrent) -> Result<()> {
        if self.read_only {
            return Err(EngineError::ReadOnly);
        }

        let now = Utc::now();
        let record = TorrentRecord {
            info_hash: torrent.info_hash.clone(),
            title: torrent.title.clone(),
            name: torrent.name.clone(),
            category: torrent.category.clone(),
            size: torrent.meta.as_ref().map_or(0, |m| m.size),
            file_count: torrent.meta.as_ref().map_or(0, |m| m.files.len()),
            metainfo: torrent.meta.as_ref().map(|m| m.raw.clone()),
            created_at: now,
            updated_at: now,
        };
        self.db.upsert_torrent(&record)?;

        info!(info_hash = %torrent.info_hash, title = %torrent.title, "torrent saved");
        Ok(())
    }

    async fn release(&self, torrent: Torrent) {
        self.active().remove(&torrent.info_hash);
    }
}
