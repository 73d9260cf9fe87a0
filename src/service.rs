// Service wiring — the one object an embedding client constructs and passes
// around by reference.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::config::{CacheSettings, EngineConfig};
use crate::engine::downloader::AssetDownloadManager;
use crate::engine::profile::ProfileAggregator;
use crate::engine::retry::RetryPolicy;
use crate::provider::traits::{
    AssetStore, BadgeProvider, CosmeticsProvider, SettingsProvider, ThirdPartyBadgeProvider,
};

/// Asset category for channel/identity badge icons.
pub const BADGE_ASSET_CATEGORY: &str = "badges";

/// Asset category for paint/overlay textures.
pub const PAINT_ASSET_CATEGORY: &str = "paints";

/// The decoration cache engine: profile aggregation plus one asset manager
/// per asset category, behind a single constructed-once service object.
pub struct DecorationService {
    settings: CacheSettings,
    profiles: ProfileAggregator,
    badge_assets: AssetDownloadManager,
    paint_assets: AssetDownloadManager,
}

impl DecorationService {
    /// Construct the service. Cache settings are read here, exactly once
    /// per process.
    pub async fn new(
        config: EngineConfig,
        settings_provider: Arc<dyn SettingsProvider>,
        store: Arc<dyn AssetStore>,
        badge_provider: Arc<dyn BadgeProvider>,
        cosmetics_provider: Arc<dyn CosmeticsProvider>,
        third_party_provider: Arc<dyn ThirdPartyBadgeProvider>,
    ) -> Result<Self> {
        let settings = settings_provider.cache_settings().await?;
        info!(
            "decoration cache settings: enabled={} expiry_days={}",
            settings.enabled, settings.expiry_days
        );

        let retry = RetryPolicy::new(
            config.retry_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
        );
        let profiles = ProfileAggregator::new(
            badge_provider,
            cosmetics_provider,
            third_party_provider,
            retry,
        );
        let badge_assets = AssetDownloadManager::new(
            BADGE_ASSET_CATEGORY,
            Arc::clone(&store),
            &settings,
            config.download_workers,
        );
        let paint_assets = AssetDownloadManager::new(
            PAINT_ASSET_CATEGORY,
            store,
            &settings,
            config.download_workers,
        );

        Ok(Self {
            settings,
            profiles,
            badge_assets,
            paint_assets,
        })
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn profiles(&self) -> &ProfileAggregator {
        &self.profiles
    }

    pub fn badge_assets(&self) -> &AssetDownloadManager {
        &self.badge_assets
    }

    pub fn paint_assets(&self) -> &AssetDownloadManager {
        &self.paint_assets
    }

    /// Teardown hook: stop dispatching downloads. In-flight work completes
    /// and still lands in the catalogs.
    pub fn shutdown(&self) {
        self.badge_assets.shutdown();
        self.paint_assets.shutdown();
        info!("decoration service shut down");
    }
}
