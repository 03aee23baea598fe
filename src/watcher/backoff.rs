//! Per-file retry bookkeeping

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Exponential delay between retries of the same file.
///
/// The first failure is retried on the next cycle; from the second
/// consecutive failure on the wait doubles, starting at `base` and capped
/// at `max`. A zero `base` retries every cycle.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn delay(&self, failures: u32) -> Duration {
        if failures <= 1 {
            return Duration::ZERO;
        }
        let exp = (failures - 2).min(20);
        self.base.saturating_mul(1 << exp).min(self.max)
    }
}

#[derive(Debug)]
struct FailureRecord {
    failures: u32,
    retry_at: Instant,
}

/// Consecutive failures per file, forgotten on success or when the file goes away
#[derive(Debug)]
pub struct FailureTracker {
    backoff: Backoff,
    records: HashMap<PathBuf, FailureRecord>,
}

impl FailureTracker {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            records: HashMap::new(),
        }
    }

    /// Whether `path` is still waiting out its backoff
    pub fn is_deferred(&self, path: &Path, now: Instant) -> bool {
        self.records
            .get(path)
            .is_some_and(|record| now < record.retry_at)
    }

    /// Count one more failure and return the running total
    pub fn record_failure(&mut self, path: &Path, now: Instant) -> u32 {
        let record = self
            .records
            .entry(path.to_path_buf())
            .or_insert(FailureRecord {
                failures: 0,
                retry_at: now,
            });
        record.failures = record.failures.saturating_add(1);
        record.retry_at = now + self.backoff.delay(record.failures);
        record.failures
    }

    pub fn clear(&mut self, path: &Path) {
        self.records.remove(path);
    }

    /// Drop records of files that are no longer listed
    pub fn retain_present(&mut self, present: &HashSet<PathBuf>) {
        self.records.retain(|path, _| present.contains(path));
    }

    pub fn failures(&self, path: &Path) -> u32 {
        self.records.get(path).map_or(0, |record| record.failures)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10));

        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::ZERO);
        assert_eq!(backoff.delay(2), Duration::from_secs(1));
        assert_eq!(backoff.delay(3), Duration::from_secs(2));
        assert_eq!(backoff.delay(5), Duration::from_secs(8));
        assert_eq!(backoff.delay(6), Duration::from_secs(10));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_base_never_defers() {
        let mut tracker = FailureTracker::new(Backoff::new(Duration::ZERO, Duration::ZERO));
        let path = Path::new("/drop/a.torrent");
        let now = Instant::now();

        for _ in 0..5 {
            tracker.record_failure(path, now);
            assert!(!tracker.is_deferred(path, now));
        }
        assert_eq!(tracker.failures(path), 5);
    }

    #[test]
    fn test_tracker_defers_after_second_failure() {
        let mut tracker =
            FailureTracker::new(Backoff::new(Duration::from_secs(60), Duration::from_secs(600)));
        let path = Path::new("/drop/a.torrent");
        let now = Instant::now();

        assert_eq!(tracker.record_failure(path, now), 1);
        assert!(!tracker.is_deferred(path, now));

        assert_eq!(tracker.record_failure(path, now), 2);
        assert!(tracker.is_deferred(path, now + Duration::from_secs(59)));
        assert!(!tracker.is_deferred(path, now + Duration::from_secs(60)));

        tracker.clear(path);
        assert_eq!(tracker.failures(path), 0);
    }

    #[test]
    fn test_retain_present() {
        let mut tracker = FailureTracker::new(Backoff::new(Duration::ZERO, Duration::ZERO));
        let now = Instant::now();
        tracker.record_failure(Path::new("/drop/a.torrent"), now);
        tracker.record_failure(Path::new("/drop/b.torrent"), now);

        let present = HashSet::from([PathBuf::from("/drop/b.torrent")]);
        tracker.retain_present(&present);

        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.failures(Path::new("/drop/b.torrent")), 1);
    }
}
