//! torrhost - startup core of a torrent media server
//!
//! Before the HTTP server binds, torrhost makes sure outbound name
//! resolution works, falling back to a public DNS server when the system
//! resolver is broken. It can also watch a directory for dropped
//! `.torrent` files and ingest them into the torrent store.

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod resolver;
pub mod watcher;
