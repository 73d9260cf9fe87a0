// Live statistics aggregation — lookup hit rates, worker counts, download outcomes.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub lookups: u64,
    pub hit_rate: f64,
    pub active_workers: u32,
    pub downloads_completed: u64,
    pub downloads_failed: u64,
}

pub struct StatsCollector {
    lookups: AtomicU64,
    hits: AtomicU64,
    active_workers: AtomicU32,
    downloads_completed: AtomicU64,
    downloads_failed: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            active_workers: AtomicU32::new(0),
            downloads_completed: AtomicU64::new(0),
            downloads_failed: AtomicU64::new(0),
        }
    }

    /// Record a catalog lookup and whether it hit.
    pub fn record_lookup(&self, hit: bool) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_workers(&self) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_workers(&self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_download_ok(&self) {
        self.downloads_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_download_failed(&self) {
        self.downloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_workers(&self) -> u32 {
        self.active_workers.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let lookups = self.lookups.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        let hit_rate = if lookups > 0 {
            hits as f64 / lookups as f64
        } else {
            0.0
        };

        StatsSnapshot {
            lookups,
            hit_rate,
            active_workers: self.active_workers.load(Ordering::Relaxed),
            downloads_completed: self.downloads_completed.load(Ordering::Relaxed),
            downloads_failed: self.downloads_failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_basic() {
        let stats = StatsCollector::new();
        stats.record_lookup(true);
        stats.record_lookup(true);
        stats.record_lookup(false);
        stats.record_lookup(false);

        stats.increment_workers();
        stats.increment_workers();
        stats.decrement_workers();

        stats.record_download_ok();
        stats.record_download_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.lookups, 4);
        assert!((snap.hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(snap.active_workers, 1);
        assert_eq!(snap.downloads_completed, 1);
        assert_eq!(snap.downloads_failed, 1);
    }
}
