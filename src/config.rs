use serde::Deserialize;

/// Age in seconds after which cached channel/identity badges should be revalidated.
pub const BADGE_STALE_SECONDS: u64 = 60;

/// Age in seconds after which cached third-party badges should be revalidated.
pub const THIRD_PARTY_STALE_SECONDS: u64 = 300;

/// Age in seconds after which cached paint cosmetics should be revalidated.
pub const COSMETIC_STALE_SECONDS: u64 = 900;

/// Default number of concurrent download workers per asset category.
pub const DEFAULT_DOWNLOAD_WORKERS: u32 = 5;

/// Default number of attempts for one remote metadata lookup.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default base delay in milliseconds between retry attempts.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 250;

/// User-facing cache settings, read once per process from the settings provider.
///
/// A deployment that changes these at runtime needs a restart for the new
/// values to take effect.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Whether asset caching is enabled at all.
    pub enabled: bool,
    /// Days a stored asset stays valid before the store may prune it.
    pub expiry_days: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            expiry_days: 7,
        }
    }
}

/// Top-level configuration for the decoration cache engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of concurrent downloads per asset category.
    pub download_workers: u32,
    /// Maximum attempts for one remote metadata lookup.
    pub retry_attempts: u32,
    /// Base delay in milliseconds between retry attempts.
    pub retry_base_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_workers: DEFAULT_DOWNLOAD_WORKERS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}
