//! Configuration management module

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub autoload: AutoloadSettings,

    #[serde(skip)]
    config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Refuse every write to the torrent store
    #[serde(default)]
    pub read_only: bool,
}

/// Torrent-file autoload watcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoloadSettings {
    /// Directory to watch; the watcher is disabled when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Grace period before the first scan
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,

    /// Delay between two poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Pause after each ingested file
    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    /// Upper bound for a single engine call
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,

    /// Rename a file aside after this many consecutive failures
    #[serde(default)]
    pub quarantine_after: Option<u32>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/torrhost.db")
}

fn default_startup_delay() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_settle() -> u64 {
    1000
}

fn default_operation_timeout() -> u64 {
    30
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_backoff_max() -> u64 {
    300
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            read_only: false,
        }
    }
}

impl Default for AutoloadSettings {
    fn default() -> Self {
        Self {
            dir: None,
            startup_delay_secs: default_startup_delay(),
            poll_interval_ms: default_poll_interval(),
            settle_ms: default_settle(),
            operation_timeout_secs: default_operation_timeout(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
            quarantine_after: None,
        }
    }
}

impl AutoloadSettings {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            autoload: AutoloadSettings::default(),
            config_file: None,
        }
    }
}

impl Settings {
    /// Load settings from environment and config file
    pub fn load() -> Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        // Try to find config file
        let mut config_paths = vec![
            PathBuf::from("config.toml"),
            PathBuf::from("./data/config.toml"),
        ];
        if let Some(path) = dirs_config_path() {
            config_paths.push(path);
        }

        let mut settings = Self::load_first(config_paths)?;

        // Override with environment variables
        settings.apply_env_overrides();

        // Ensure data directory exists
        if let Some(parent) = settings.database.path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create data directory")?;
        }

        Ok(settings)
    }

    /// Load the first existing file of `paths`, or defaults if there is none
    fn load_first(paths: impl IntoIterator<Item = PathBuf>) -> Result<Self> {
        let Some(path) = paths.into_iter().find(|path| path.exists()) else {
            return Ok(Settings::default());
        };

        let mut settings = Self::load_from_file(&path)?;
        settings.config_file = Some(path);
        Ok(settings)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("TORRHOST_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("TORRHOST_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Some(path) = var("TORRHOST_DATA_DIR") {
            self.database.path = PathBuf::from(path).join("torrhost.db");
        }
        if let Some(path) = var("TORRHOST_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(flag) = var("TORRHOST_READ_ONLY") {
            self.database.read_only = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        if let Some(dir) = var("TORRHOST_TORRENTS_DIR") {
            self.autoload.dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }
    }

    /// Get the path to the config file (if loaded from file)
    pub fn config_path(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }
}

/// Get platform-specific config directory
fn dirs_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
            .map(|p| p.join("torrhost/config.toml"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/torrhost/config.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .ok()
            .map(|p| PathBuf::from(p).join("torrhost/config.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}
