// Persistent asset downloader — bounded worker pool over a lazily loaded
// catalog of already-stored assets.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::stats::{StatsCollector, StatsSnapshot};
use crate::config::CacheSettings;
use crate::provider::traits::AssetStore;

#[derive(Debug, Clone)]
struct DownloadTask {
    asset_id: String,
    source_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManagerState {
    Uninitialized,
    Initializing,
    Ready,
}

struct ManagerInner {
    state: ManagerState,
    /// In-memory mirror of the persisted asset-id → path catalog.
    catalog: HashMap<String, PathBuf>,
    /// Asset ids currently owned by an active worker.
    pending: HashSet<String>,
    queue: VecDeque<DownloadTask>,
    /// Requests buffered while the catalog is still loading.
    deferred: Vec<DownloadTask>,
    active: u32,
}

impl ManagerInner {
    fn is_tracked(&self, asset_id: &str) -> bool {
        self.catalog.contains_key(asset_id)
            || self.pending.contains(asset_id)
            || self.queue.iter().any(|t| t.asset_id == asset_id)
            || self.deferred.iter().any(|t| t.asset_id == asset_id)
    }
}

struct ManagerCtx {
    category: String,
    store: Arc<dyn AssetStore>,
    expiry_days: u32,
    max_workers: u32,
    inner: Mutex<ManagerInner>,
    stats: StatsCollector,
    shutdown: CancellationToken,
}

/// Downloads and catalogs binary assets for one category (badge icons,
/// paint textures, ...), at most once per asset id per process lifetime.
///
/// The persisted catalog is loaded on the first `request`; requests that
/// arrive before the load finishes are buffered and re-checked against the
/// loaded catalog before being queued. Active downloads are bounded by the
/// configured worker limit.
pub struct AssetDownloadManager {
    enabled: bool,
    ctx: Arc<ManagerCtx>,
}

impl AssetDownloadManager {
    pub fn new(
        category: impl Into<String>,
        store: Arc<dyn AssetStore>,
        settings: &CacheSettings,
        max_workers: u32,
    ) -> Self {
        Self {
            enabled: settings.enabled,
            ctx: Arc::new(ManagerCtx {
                category: category.into(),
                store,
                expiry_days: settings.expiry_days,
                max_workers: max_workers.max(1),
                inner: Mutex::new(ManagerInner {
                    state: ManagerState::Uninitialized,
                    catalog: HashMap::new(),
                    pending: HashSet::new(),
                    queue: VecDeque::new(),
                    deferred: Vec::new(),
                    active: 0,
                }),
                stats: StatsCollector::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Queue `asset_id` for download unless it is already stored, queued,
    /// buffered, or being downloaded. No-op when caching is disabled.
    pub fn request(&self, asset_id: &str, source_url: &str) {
        if !self.enabled {
            return;
        }
        if self.ctx.shutdown.is_cancelled() {
            return;
        }

        let mut start_init = false;
        {
            let mut inner = self.ctx.inner.lock();
            if inner.is_tracked(asset_id) {
                debug!("{} asset {} already tracked", self.ctx.category, asset_id);
                return;
            }
            let task = DownloadTask {
                asset_id: asset_id.to_string(),
                source_url: source_url.to_string(),
            };
            match inner.state {
                ManagerState::Uninitialized => {
                    inner.deferred.push(task);
                    inner.state = ManagerState::Initializing;
                    start_init = true;
                }
                ManagerState::Initializing => inner.deferred.push(task),
                ManagerState::Ready => inner.queue.push_back(task),
            }
        }

        if start_init {
            let ctx = Arc::clone(&self.ctx);
            tokio::spawn(async move {
                ManagerCtx::initialize(ctx).await;
            });
        } else {
            ManagerCtx::pump(&self.ctx);
        }
    }

    /// Synchronous catalog-mirror read. Callers fall back to the remote URL
    /// when this returns `None`.
    pub fn get_cached_path(&self, asset_id: &str) -> Option<PathBuf> {
        let path = self.ctx.inner.lock().catalog.get(asset_id).cloned();
        self.ctx.stats.record_lookup(path.is_some());
        path
    }

    /// Empty the in-memory mirror. The persisted catalog is untouched, so
    /// already-stored assets will simply be rediscovered on the next load.
    pub fn clear(&self) {
        self.ctx.inner.lock().catalog.clear();
        debug!("{} catalog mirror cleared", self.ctx.category);
    }

    /// Stop dispatching new downloads and drop queued work. In-flight
    /// downloads run to completion and still populate the catalog.
    pub fn shutdown(&self) {
        self.ctx.shutdown.cancel();
        let mut inner = self.ctx.inner.lock();
        inner.queue.clear();
        inner.deferred.clear();
    }

    /// Number of downloads currently running.
    pub fn active_downloads(&self) -> u32 {
        self.ctx.inner.lock().active
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }
}

impl ManagerCtx {
    /// Load the persisted catalog, then drain the deferred buffer exactly
    /// once: items the catalog already resolves are dropped, the rest move
    /// to the work queue.
    async fn initialize(ctx: Arc<ManagerCtx>) {
        let loaded = match ctx.store.load_catalog(&ctx.category).await {
            Ok(catalog) => catalog,
            Err(err) => {
                // Degrade to re-downloading rather than wedging the manager.
                warn!("{} catalog load failed: {}", ctx.category, err);
                HashMap::new()
            }
        };

        {
            let mut inner = ctx.inner.lock();
            inner.catalog = loaded;
            inner.state = ManagerState::Ready;
            let deferred = std::mem::take(&mut inner.deferred);
            let mut queued = 0usize;
            for task in deferred {
                if inner.catalog.contains_key(&task.asset_id) {
                    continue;
                }
                inner.queue.push_back(task);
                queued += 1;
            }
            debug!(
                "{} catalog ready: {} entries, {} deferred requests queued",
                ctx.category,
                inner.catalog.len(),
                queued
            );
        }

        Self::pump(&ctx);
    }

    /// Scheduler: start workers for queued tasks while under the limit.
    fn pump(ctx: &Arc<ManagerCtx>) {
        if ctx.shutdown.is_cancelled() {
            return;
        }

        let mut to_run = Vec::new();
        {
            let mut inner = ctx.inner.lock();
            if inner.state != ManagerState::Ready {
                return;
            }
            while inner.active < ctx.max_workers {
                let Some(task) = inner.queue.pop_front() else {
                    break;
                };
                inner.pending.insert(task.asset_id.clone());
                inner.active += 1;
                to_run.push(task);
            }
        }

        for task in to_run {
            let ctx = Arc::clone(ctx);
            tokio::spawn(async move {
                ManagerCtx::worker(ctx, task).await;
            });
        }
    }

    async fn worker(ctx: Arc<ManagerCtx>, task: DownloadTask) {
        ctx.stats.increment_workers();
        let result = ctx
            .store
            .download_and_store(&ctx.category, &task.asset_id, &task.source_url, ctx.expiry_days)
            .await;
        ctx.stats.decrement_workers();

        {
            let mut inner = ctx.inner.lock();
            inner.pending.remove(&task.asset_id);
            inner.active -= 1;
            match result {
                Ok(path) => {
                    debug!("{} asset {} stored at {:?}", ctx.category, task.asset_id, path);
                    inner.catalog.insert(task.asset_id.clone(), path);
                    ctx.stats.record_download_ok();
                }
                Err(err) => {
                    // Not retried and not recorded: a later explicit request
                    // for the same id may attempt again.
                    warn!("{} asset {} download failed: {}", ctx.category, task.asset_id, err);
                    ctx.stats.record_download_failed();
                }
            }
        }

        Self::pump(&ctx);
    }
}
