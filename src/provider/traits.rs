use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::CacheSettings;

/// A channel or identity badge attached to a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub title: String,
    pub image_url: String,
}

/// A paint/overlay cosmetic applied to a subject's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cosmetic {
    pub id: String,
    pub name: String,
    pub image_url: String,
}

/// A badge issued by a third-party decoration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThirdPartyBadge {
    pub id: String,
    pub provider: String,
    pub title: String,
    pub image_url: String,
}

/// Source of the user's cache settings, read once per process.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn cache_settings(&self) -> Result<CacheSettings>;
}

/// Fixed settings, for embedders that configure the cache statically.
pub struct StaticSettings(pub CacheSettings);

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn cache_settings(&self) -> Result<CacheSettings> {
        Ok(self.0.clone())
    }
}

/// Persistent store for downloaded assets. The core treats the catalog as
/// opaque and never inspects stored file contents.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Load the persisted asset-id → local-path catalog for a category.
    async fn load_catalog(&self, category: &str) -> Result<HashMap<String, PathBuf>>;

    /// Download `source_url` and persist it, returning the local path.
    async fn download_and_store(
        &self,
        category: &str,
        asset_id: &str,
        source_url: &str,
        expiry_days: u32,
    ) -> Result<PathBuf>;
}

/// Remote lookup for channel/identity badges.
#[async_trait]
pub trait BadgeProvider: Send + Sync {
    async fn fetch_badges(&self, subject_id: &str, context_id: Option<&str>) -> Result<Vec<Badge>>;
}

/// Remote lookup for paint cosmetics.
#[async_trait]
pub trait CosmeticsProvider: Send + Sync {
    async fn fetch_cosmetics(&self, subject_id: &str) -> Result<Vec<Cosmetic>>;
}

/// Remote lookup for third-party badges.
#[async_trait]
pub trait ThirdPartyBadgeProvider: Send + Sync {
    async fn fetch_third_party_badges(&self, subject_id: &str) -> Result<Vec<ThirdPartyBadge>>;
}
