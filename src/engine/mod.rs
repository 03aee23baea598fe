//! Torrent engine abstraction
//!
//! The autoload watcher only sequences a handful of engine calls, so the
//! engine is modelled as a trait. [`LocalEngine`] is the implementation the
//! server runs with: it parses metainfo, keeps ingested torrents in memory
//! and persists records to SQLite.

mod local;
mod source;

pub use local::LocalEngine;
pub use source::{Metainfo, TorrentFile, TorrentSource};

use async_trait::async_trait;

/// Unified error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unsupported torrent source: {0}")]
    UnsupportedSource(String),

    #[error("Invalid magnet link: {0}")]
    InvalidMagnet(String),

    #[error("Failed to read torrent source: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid torrent metainfo: {0}")]
    Metainfo(#[from] lava_torrent::LavaTorrentError),

    #[error("Failed to fetch torrent: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Torrent store is read-only")]
    ReadOnly,
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Options for adding a torrent
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub title: Option<String>,
    pub category: Option<String>,
}

/// A torrent owned by the engine
pub trait TorrentHandle: Send + Sync {
    /// Whether the info dictionary (file list, sizes) is known
    fn has_metadata(&self) -> bool;

    /// Display title, possibly empty
    fn title(&self) -> &str;

    fn set_title(&mut self, title: String);

    /// Name carried by the torrent itself
    fn name(&self) -> &str;
}

#[async_trait]
pub trait TorrentEngine: Send + Sync {
    type Source: Send + 'static;
    type Handle: TorrentHandle + 'static;

    /// Turn a link (`file://`, `http(s)://`, `magnet:`, bare hash) into something ingestible
    async fn parse_source(&self, uri: &str) -> Result<Self::Source>;

    /// Start tracking a torrent
    async fn add_torrent(&self, source: Self::Source, options: AddOptions) -> Result<Self::Handle>;

    /// Write the torrent record to durable storage
    async fn persist(&self, torrent: &Self::Handle) -> Result<()>;

    /// Free in-memory resources; persisted state is untouched
    async fn release(&self, torrent: Self::Handle);
}

/// An ingested torrent
#[derive(Debug, Clone)]
pub struct Torrent {
    info_hash: String,
    title: String,
    name: String,
    category: Option<String>,
    meta: Option<Metainfo>,
}

impl Torrent {
    pub fn info_hash(&self) -> &str {
        &self.info_hash
    }
}

impl TorrentHandle for Torrent {
    fn has_metadata(&self) -> bool {
        self.meta.is_some()
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn set_title(&mut self, title: String) {
        self.title = title;
    }

    fn name(&self) -> &str {
        &self.name
    }
}
