//! Torrent sources and link parsing

use lava_torrent::torrent::v1::Torrent as RawTorrent;
use serde::Serialize;
use std::path::PathBuf;
use url::Url;

use super::{EngineError, Result};

/// Something the engine can ingest
#[derive(Debug, Clone)]
pub enum TorrentSource {
    /// Complete metainfo (from a `.torrent` file or download)
    Metainfo(Metainfo),
    /// Only the info hash is known; metadata must come from elsewhere
    Magnet {
        info_hash: String,
        name: Option<String>,
        trackers: Vec<String>,
    },
}

/// Parsed info dictionary plus the raw bytes it came from
#[derive(Debug, Clone)]
pub struct Metainfo {
    pub info_hash: String,
    pub name: String,
    pub size: u64,
    pub files: Vec<TorrentFile>,
    pub trackers: Vec<String>,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TorrentFile {
    pub path: String,
    pub size: u64,
}

impl Metainfo {
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self> {
        let torrent = RawTorrent::read_from_bytes(&raw)?;

        let files = match &torrent.files {
            Some(files) => files
                .iter()
                .map(|f| TorrentFile {
                    path: f.path.to_string_lossy().into_owned(),
                    size: f.length.max(0) as u64,
                })
                .collect(),
            None => vec![TorrentFile {
                path: torrent.name.clone(),
                size: torrent.length.max(0) as u64,
            }],
        };

        let mut trackers: Vec<String> = torrent.announce.iter().cloned().collect();
        for tier in torrent.announce_list.iter().flatten() {
            for url in tier {
                if !trackers.contains(url) {
                    trackers.push(url.clone());
                }
            }
        }

        Ok(Self {
            info_hash: torrent.info_hash(),
            name: torrent.name.clone(),
            size: torrent.length.max(0) as u64,
            files,
            trackers,
            raw,
        })
    }
}

/// Kind of link handed to the engine
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Link {
    File(PathBuf),
    Remote(String),
    Magnet(String),
}

pub(crate) fn classify(uri: &str) -> Result<Link> {
    let lower = uri.to_ascii_lowercase();

    if lower.starts_with("file://") {
        let path = Url::parse(uri)
            .ok()
            .and_then(|url| url.to_file_path().ok())
            .unwrap_or_else(|| PathBuf::from(&uri["file://".len()..]));
        return Ok(Link::File(path));
    }
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(Link::Remote(uri.to_string()));
    }
    if lower.starts_with("magnet:") {
        return Ok(Link::Magnet(uri.to_string()));
    }
    if is_info_hash(uri) {
        return Ok(Link::Magnet(format!("magnet:?xt=urn:btih:{}", uri)));
    }

    Err(EngineError::UnsupportedSource(uri.to_string()))
}

/// Hex-encoded v1 info hash
fn is_info_hash(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

pub(crate) fn parse_magnet(uri: &str) -> Result<TorrentSource> {
    let url = Url::parse(uri).map_err(|e| EngineError::InvalidMagnet(e.to_string()))?;

    let mut info_hash = None;
    let mut name = None;
    let mut trackers = Vec::new();

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "xt" => {
                if let Some(hash) = value.strip_prefix("urn:btih:") {
                    if is_info_hash(hash) {
                        info_hash = Some(hash.to_ascii_lowercase());
                    }
                }
            }
            "dn" if !value.is_empty() => name = Some(value.into_owned()),
            "tr" => trackers.push(value.into_owned()),
            _ => {}
        }
    }

    let info_hash =
        info_hash.ok_or_else(|| EngineError::InvalidMagnet(format!("no btih hash in {}", uri)))?;

    Ok(TorrentSource::Magnet {
        info_hash,
        name,
        trackers,
    })
}
