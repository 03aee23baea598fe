//! Torrent-file autoload watcher
//!
//! Polls one directory for `*.torrent` files, ingests each into the engine,
//! and deletes the file once the engine has the torrent's metadata and the
//! record has been persisted. Everything that goes wrong is absorbed: the
//! file stays where it is and is picked up again on a later cycle.

mod backoff;

pub use backoff::{Backoff, FailureTracker};

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AutoloadSettings;
use crate::engine::{AddOptions, EngineError, TorrentEngine, TorrentHandle};

const TORRENT_SUFFIX: &str = ".torrent";
const QUARANTINE_SUFFIX: &str = "failed";

/// Timing and retry policy of the watcher
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub startup_delay: Duration,
    pub poll_interval: Duration,
    pub settle: Duration,
    pub operation_timeout: Duration,
    pub backoff: Backoff,
    pub quarantine_after: Option<u32>,
}

impl From<&AutoloadSettings> for WatchOptions {
    fn from(settings: &AutoloadSettings) -> Self {
        Self {
            startup_delay: settings.startup_delay(),
            poll_interval: settings.poll_interval(),
            settle: settings.settle(),
            operation_timeout: settings.operation_timeout(),
            backoff: Backoff::new(settings.backoff_base(), settings.backoff_max()),
            quarantine_after: settings.quarantine_after,
        }
    }
}

/// What one poll cycle did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub listing_failed: bool,
    /// Matching `*.torrent` entries found
    pub candidates: usize,
    /// Skipped because their backoff has not elapsed
    pub deferred: usize,
    pub ingested: usize,
    pub pending: usize,
    pub failed: usize,
    pub quarantined: usize,
    /// Persisted but the file could not be removed
    pub stranded: usize,
}

impl CycleReport {
    fn is_idle(&self) -> bool {
        self.candidates == 0 && !self.listing_failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Parse,
    Ingest,
    Persist,
}

#[derive(Debug, thiserror::Error)]
enum StepError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
enum FileOutcome {
    Ingested,
    /// Ingested but the engine has no metadata yet
    Pending,
    /// Persisted, but the file is still on disk
    Stranded(std::io::Error),
    Failed(Stage, StepError),
}

/// Resolve the watched directory once; keep the input as-is if that fails
pub fn resolve_target(dir: &Path) -> PathBuf {
    std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf())
}

/// Link the engine reads a local torrent file from
fn file_uri(path: &Path) -> String {
    Url::from_file_path(path)
        .map(String::from)
        .unwrap_or_else(|_| format!("file://{}", path.display()))
}

/// Case-insensitive `.torrent` suffix check; a bare `.torrent` counts too
fn is_torrent_name(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|name| name.ends_with(TORRENT_SUFFIX))
}

/// Background ingestion of dropped torrent files
pub struct Watcher<E: TorrentEngine> {
    engine: Arc<E>,
    target: PathBuf,
    options: WatchOptions,
    failures: FailureTracker,
}

impl<E: TorrentEngine + 'static> Watcher<E> {
    pub fn new(engine: Arc<E>, dir: &Path, options: WatchOptions) -> Self {
        Self {
            engine,
            target: resolve_target(dir),
            failures: FailureTracker::new(options.backoff),
            options,
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Run on a background task until the process exits
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!(dir = %self.target.display(), "autoload watcher started");
        tokio::time::sleep(self.options.startup_delay).await;

        loop {
            let report = self.poll_once().await;
            if !report.is_idle() {
                debug!(?report, tracked = self.failures.len(), "autoload cycle finished");
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    /// Scan the directory once and process every eligible file
    pub async fn poll_once(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        let candidates = match self.list_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                debug!(dir = %self.target.display(), error = %e, "cannot list autoload directory");
                report.listing_failed = true;
                return report;
            }
        };

        let present: HashSet<PathBuf> = candidates.iter().cloned().collect();
        self.failures.retain_present(&present);
        report.candidates = candidates.len();

        for path in candidates {
            if self.failures.is_deferred(&path, Instant::now()) {
                report.deferred += 1;
                continue;
            }

            match self.process(&path).await {
                FileOutcome::Ingested => {
                    self.failures.clear(&path);
                    report.ingested += 1;
                    tokio::time::sleep(self.options.settle).await;
                }
                FileOutcome::Pending => {
                    debug!(path = %path.display(), "metadata not ready, retrying next cycle");
                    report.pending += 1;
                    self.note_failure(&path, &mut report).await;
                }
                FileOutcome::Stranded(e) => {
                    warn!(path = %path.display(), error = %e, "torrent saved but file not removed");
                    self.failures.clear(&path);
                    report.stranded += 1;
                    tokio::time::sleep(self.options.settle).await;
                }
                FileOutcome::Failed(stage, e) => {
                    debug!(path = %path.display(), ?stage, error = %e, "autoload failed");
                    report.failed += 1;
                    self.note_failure(&path, &mut report).await;
                }
            }
        }

        report
    }

    async fn list_candidates(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.target).await?;
        let mut candidates = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_torrent_name(&path) {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                candidates.push(path);
            }
        }

        Ok(candidates)
    }

    async fn process(&self, path: &Path) -> FileOutcome {
        let source = match self.bounded(self.engine.parse_source(&file_uri(path))).await {
            Ok(source) => source,
            Err(e) => return FileOutcome::Failed(Stage::Parse, e),
        };

        let mut torrent = match self
            .bounded(self.engine.add_torrent(source, AddOptions::default()))
            .await
        {
            Ok(torrent) => torrent,
            Err(e) => return FileOutcome::Failed(Stage::Ingest, e),
        };

        if !torrent.has_metadata() {
            return FileOutcome::Pending;
        }

        if torrent.title().is_empty() {
            let name = torrent.name().to_string();
            torrent.set_title(name);
        }
        let title = torrent.title().to_string();

        let persisted = self.bounded(self.engine.persist(&torrent)).await;
        if tokio::time::timeout(self.options.operation_timeout, self.engine.release(torrent))
            .await
            .is_err()
        {
            debug!(path = %path.display(), "engine release timed out");
        }
        if let Err(e) = persisted {
            return FileOutcome::Failed(Stage::Persist, e);
        }

        if let Err(e) = tokio::fs::remove_file(path).await {
            return FileOutcome::Stranded(e);
        }

        info!(path = %path.display(), %title, "torrent autoloaded");
        FileOutcome::Ingested
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, StepError> {
        match tokio::time::timeout(self.options.operation_timeout, op).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StepError::Timeout(self.options.operation_timeout)),
        }
    }

    async fn note_failure(&mut self, path: &Path, report: &mut CycleReport) {
        let failures = self.failures.record_failure(path, Instant::now());
        let Some(limit) = self.options.quarantine_after else {
            return;
        };
        if failures < limit {
            return;
        }

        let Some(file_name) = path.file_name() else {
            return;
        };
        let mut aside = file_name.to_os_string();
        aside.push(".");
        aside.push(QUARANTINE_SUFFIX);
        let aside = path.with_file_name(aside);

        match tokio::fs::rename(path, &aside).await {
            Ok(()) => {
                warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    failures,
                    "giving up on torrent file"
                );
                self.failures.clear(path);
                report.quarantined += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to move torrent file aside");
            }
        }
    }
}
