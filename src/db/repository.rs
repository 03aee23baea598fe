//! Torrent record storage

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::Database;

/// A torrent as persisted in the store
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TorrentRecord {
    pub info_hash: String,
    pub title: String,
    pub name: String,
    pub category: Option<String>,
    pub size: u64,
    pub file_count: usize,
    #[serde(skip)]
    pub metainfo: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const COLUMNS: &str =
    "info_hash, title, name, category, size, file_count, metainfo, created_at, updated_at";

impl TorrentRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let size: i64 = row.get(4)?;
        let file_count: i64 = row.get(5)?;
        Ok(Self {
            info_hash: row.get(0)?,
            title: row.get(1)?,
            name: row.get(2)?,
            category: row.get(3)?,
            size: size.max(0) as u64,
            file_count: file_count.max(0) as usize,
            metainfo: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl Database {
    /// Insert a torrent or refresh an existing one with the same info hash.
    ///
    /// `created_at` of an existing row is preserved.
    pub fn upsert_torrent(&self, record: &TorrentRecord) -> rusqlite::Result<()> {
        self.conn().execute(
            "INSERT INTO torrents (info_hash, title, name, category, size, file_count, metainfo, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(info_hash) DO UPDATE SET
                title = excluded.title,
                name = excluded.name,
                category = excluded.category,
                size = excluded.size,
                file_count = excluded.file_count,
                metainfo = COALESCE(excluded.metainfo, torrents.metainfo),
                updated_at = excluded.updated_at",
            params![
                record.info_hash,
                record.title,
                record.name,
                record.category,
                record.size as i64,
                record.file_count as i64,
                record.metainfo,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_torrent(&self, info_hash: &str) -> rusqlite::Result<Option<TorrentRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM torrents WHERE info_hash = ?1"),
            [info_hash],
            TorrentRecord::from_row,
        )
        .optional()
    }

    /// All torrents, most recently updated first
    pub fn list_torrents(&self) -> rusqlite::Result<Vec<TorrentRecord>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(&format!("SELECT {COLUMNS} FROM torrents ORDER BY updated_at DESC"))?;
        let rows = stmt.query_map([], TorrentRecord::from_row)?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash: &str, title: &str) -> TorrentRecord {
        let now = Utc::now();
        TorrentRecord {
            info_hash: hash.to_string(),
            title: title.to_string(),
            name: "movie.mkv".to_string(),
            category: None,
            size: 4096,
            file_count: 1,
            metainfo: Some(vec![1, 2, 3]),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let db = Database::in_memory().unwrap();
        db.migrate().unwrap();

        db.upsert_torrent(&record("aa", "Movie")).unwrap();
        let stored = db.get_torrent("aa").unwrap().unwrap();

        assert_eq!(stored.title, "Movie");
        assert_eq!(stored.size, 4096);
        assert_eq!(stored.metainfo, Some(vec![1, 2, 3]));
        assert!(db.get_torrent("bb").unwrap().is_none());
    }

    #[test]
    fn test_upsert_keeps_created_at_and_metainfo() {
        let db = Database::in_memory().unwrap();
        db.migrate().unwrap();

        let first = record("aa", "Old");
        db.upsert_torrent(&first).unwrap();

        let mut second = record("aa", "New");
        second.metainfo = None;
        second.created_at = first.created_at + chrono::Duration::hours(1);
        db.upsert_torrent(&second).unwrap();

        let stored = db.get_torrent("aa").unwrap().unwrap();
        assert_eq!(stored.title, "New");
        assert_eq!(stored.created_at, first.created_at);
        assert_eq!(stored.metainfo, Some(vec![1, 2, 3]));
        assert_eq!(db.list_torrents().unwrap().len(), 1);
    }
}
