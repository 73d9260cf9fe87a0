// Disk-backed asset store — downloads over HTTP and catalogs files under a
// per-category directory with a JSON index.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use super::traits::AssetStore;

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    asset_id: String,
    file_name: String,
    stored_at_secs: u64,
    expiry_days: u32,
}

/// Concrete `AssetStore` keeping assets at `<root>/<category>/<file>` with
/// an `index.json` catalog per category. Entries record the expiry bound in
/// force when they were stored; expired entries are pruned on load.
pub struct DiskAssetStore {
    root: PathBuf,
    client: Client,
}

impl DiskAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            client: Client::new(),
        }
    }

    fn category_dir(&self, category: &str) -> PathBuf {
        self.root.join(category)
    }

    fn index_path(&self, category: &str) -> PathBuf {
        self.category_dir(category).join("index.json")
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// File name from the asset id, keeping the source extension when it
    /// looks like one.
    fn file_name_for(asset_id: &str, source_url: &str) -> String {
        let stem: String = asset_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        let trimmed = source_url.split(['?', '#']).next().unwrap_or(source_url);
        let ext = match trimmed.rsplit_once('.') {
            Some((_, e))
                if !e.is_empty()
                    && e.len() <= 4
                    && e.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                e
            }
            _ => "bin",
        };

        format!("{stem}.{ext}")
    }

    async fn read_index(&self, category: &str) -> Result<Vec<IndexEntry>> {
        let path = self.index_path(category);
        match fs::read(&path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_index(&self, category: &str, entries: &[IndexEntry]) -> Result<()> {
        fs::create_dir_all(self.category_dir(category)).await?;
        let data = serde_json::to_vec_pretty(entries)?;
        fs::write(self.index_path(category), data).await?;
        Ok(())
    }
}

#[async_trait]
impl AssetStore for DiskAssetStore {
    async fn load_catalog(&self, category: &str) -> Result<HashMap<String, PathBuf>> {
        let entries = self.read_index(category).await?;
        let dir = self.category_dir(category);
        let now = Self::now_secs();

        let mut catalog = HashMap::new();
        let mut live = Vec::new();
        let mut expired = 0usize;
        for entry in entries {
            let age_days = now.saturating_sub(entry.stored_at_secs) / SECONDS_PER_DAY;
            if entry.expiry_days > 0 && age_days >= u64::from(entry.expiry_days) {
                let _ = fs::remove_file(dir.join(&entry.file_name)).await;
                expired += 1;
                continue;
            }
            catalog.insert(entry.asset_id.clone(), dir.join(&entry.file_name));
            live.push(entry);
        }

        if expired > 0 {
            self.write_index(category, &live).await?;
            debug!("pruned {} expired {} assets", expired, category);
        }

        Ok(catalog)
    }

    async fn download_and_store(
        &self,
        category: &str,
        asset_id: &str,
        source_url: &str,
        expiry_days: u32,
    ) -> Result<PathBuf> {
        let resp = self.client.get(source_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(
                "asset fetch failed status={} url={}",
                status.as_u16(),
                source_url
            );
            return Err(anyhow!("asset fetch failed: HTTP {}", status.as_u16()));
        }
        let body: Bytes = resp.bytes().await?;

        let dir = self.category_dir(category);
        fs::create_dir_all(&dir).await?;
        let file_name = Self::file_name_for(asset_id, source_url);
        let path = dir.join(&file_name);
        fs::write(&path, &body).await?;

        let mut entries = self.read_index(category).await.unwrap_or_default();
        entries.retain(|e| e.asset_id != asset_id);
        entries.push(IndexEntry {
            asset_id: asset_id.to_string(),
            file_name,
            stored_at_secs: Self::now_secs(),
            expiry_days,
        });
        self.write_index(category, &entries).await?;

        debug!(
            "stored {} asset {} ({} bytes)",
            category,
            asset_id,
            body.len()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_keeps_extension() {
        assert_eq!(
            DiskAssetStore::file_name_for("icon-1", "http://cdn.example/a/icon-1.png"),
            "icon-1.png"
        );
        assert_eq!(
            DiskAssetStore::file_name_for("icon-1", "http://cdn.example/a/icon-1.webp?size=2x"),
            "icon-1.webp"
        );
    }

    #[test]
    fn test_file_name_sanitizes_id_and_defaults_extension() {
        assert_eq!(
            DiskAssetStore::file_name_for("badge/mod:1", "http://cdn.example/blob"),
            "badge_mod_1.bin"
        );
    }
}
