// Profile aggregation — fans out to the badge, cosmetic, and third-party
// sub-caches and merges whatever resolved into one best-effort view.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::cache::MetadataCache;
use super::retry::RetryPolicy;
use crate::config::BADGE_STALE_SECONDS;
use crate::provider::traits::{
    Badge, BadgeProvider, Cosmetic, CosmeticsProvider, ThirdPartyBadge, ThirdPartyBadgeProvider,
};

/// Key for a subject's decorations, optionally scoped to a channel context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileKey {
    pub subject_id: String,
    pub context_id: Option<String>,
}

impl ProfileKey {
    pub fn new(subject_id: &str, context_id: Option<&str>) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            context_id: context_id.map(str::to_string),
        }
    }
}

/// Merged decoration view for one subject. Rebuilt wholesale on every
/// successful build or background refresh; individual fields are empty when
/// their sub-fetch failed.
#[derive(Debug, Clone)]
pub struct ProfileAggregate {
    pub subject_id: String,
    pub context_id: Option<String>,
    pub badges: Vec<Badge>,
    pub cosmetics: Vec<Cosmetic>,
    pub third_party_badges: Vec<ThirdPartyBadge>,
    pub last_updated: Instant,
}

/// Composes three independent metadata caches (badges keyed by subject and
/// context, cosmetics and third-party badges keyed by subject) plus an
/// aggregate cache that reuses the same coalescing primitive, so concurrent
/// `get_profile` calls for one subject share a single build.
#[derive(Clone)]
pub struct ProfileAggregator {
    badges: MetadataCache<ProfileKey, Vec<Badge>>,
    cosmetics: MetadataCache<String, Vec<Cosmetic>>,
    third_party: MetadataCache<String, Vec<ThirdPartyBadge>>,
    aggregates: MetadataCache<ProfileKey, ProfileAggregate>,
    badge_provider: Arc<dyn BadgeProvider>,
    cosmetics_provider: Arc<dyn CosmeticsProvider>,
    third_party_provider: Arc<dyn ThirdPartyBadgeProvider>,
    retry: RetryPolicy,
}

impl ProfileAggregator {
    pub fn new(
        badge_provider: Arc<dyn BadgeProvider>,
        cosmetics_provider: Arc<dyn CosmeticsProvider>,
        third_party_provider: Arc<dyn ThirdPartyBadgeProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            badges: MetadataCache::new(),
            cosmetics: MetadataCache::new(),
            third_party: MetadataCache::new(),
            aggregates: MetadataCache::new(),
            badge_provider,
            cosmetics_provider,
            third_party_provider,
            retry,
        }
    }

    /// Synchronous aggregate read. Never computes.
    pub fn peek_profile(&self, subject_id: &str, context_id: Option<&str>) -> Option<ProfileAggregate> {
        self.aggregates.peek(&ProfileKey::new(subject_id, context_id))
    }

    /// Return the cached aggregate for the subject, building it if absent.
    ///
    /// The build fans out to the three sub-caches in parallel with
    /// settle-all semantics: a failed sub-fetch degrades to an empty field,
    /// it never fails the aggregate.
    pub async fn get_profile(&self, subject_id: &str, context_id: Option<&str>) -> ProfileAggregate {
        let key = ProfileKey::new(subject_id, context_id);
        let this = self.clone();
        let build_key = key.clone();
        let result = self
            .aggregates
            .get_or_fetch(key.clone(), move || async move {
                Ok(this.build(build_key, false).await)
            })
            .await;

        match result {
            Ok(aggregate) => aggregate,
            Err(err) => {
                // Only reachable when the build task itself died; serve an
                // empty view rather than surfacing an error for decorations.
                warn!("aggregate build for {} failed: {}", key.subject_id, err);
                ProfileAggregate {
                    subject_id: key.subject_id,
                    context_id: key.context_id,
                    badges: Vec::new(),
                    cosmetics: Vec::new(),
                    third_party_badges: Vec::new(),
                    last_updated: Instant::now(),
                }
            }
        }
    }

    /// Re-fetch all three sub-resources and republish the aggregate without
    /// the caller waiting for completion. Overlapping foreground builds are
    /// safe: sub-fetches coalesce per key and the aggregate map is
    /// last-write-wins.
    pub fn refresh_in_background(&self, subject_id: &str, context_id: Option<&str>) {
        let key = ProfileKey::new(subject_id, context_id);
        let this = self.clone();
        tokio::spawn(async move {
            let aggregate = this.build(key.clone(), true).await;
            this.aggregates.store(key.clone(), aggregate);
            debug!("background refresh for {} published", key.subject_id);
        });
    }

    /// Whether the aggregate is old enough that callers should trigger
    /// `refresh_in_background`. Uses the tightest per-resource bound
    /// (identity badges) so no field is served staler than its own budget.
    pub fn is_stale(&self, aggregate: &ProfileAggregate) -> bool {
        aggregate.last_updated.elapsed() >= Duration::from_secs(BADGE_STALE_SECONDS)
    }

    /// Drop the cached records for one subject. In-flight fetches settle
    /// normally and may repopulate.
    pub fn invalidate_subject(&self, subject_id: &str, context_id: Option<&str>) {
        let key = ProfileKey::new(subject_id, context_id);
        self.aggregates.invalidate(&key);
        self.badges.invalidate(&key);
        self.cosmetics.invalidate(&key.subject_id);
        self.third_party.invalidate(&key.subject_id);
    }

    /// Drop every cached record (the channel-switch path).
    pub fn invalidate_all(&self) {
        self.aggregates.invalidate_all();
        self.badges.invalidate_all();
        self.cosmetics.invalidate_all();
        self.third_party.invalidate_all();
    }

    async fn build(&self, key: ProfileKey, refresh: bool) -> ProfileAggregate {
        let (badges, cosmetics, third_party_badges) = tokio::join!(
            self.fetch_badges(key.clone(), refresh),
            self.fetch_cosmetics(key.subject_id.clone(), refresh),
            self.fetch_third_party(key.subject_id.clone(), refresh),
        );

        ProfileAggregate {
            subject_id: key.subject_id,
            context_id: key.context_id,
            badges,
            cosmetics,
            third_party_badges,
            last_updated: Instant::now(),
        }
    }

    async fn fetch_badges(&self, key: ProfileKey, refresh: bool) -> Vec<Badge> {
        let provider = Arc::clone(&self.badge_provider);
        let retry = self.retry;
        let subject = key.subject_id.clone();
        let context = key.context_id.clone();
        let fetcher = move || async move {
            retry
                .run(|| provider.fetch_badges(&subject, context.as_deref()))
                .await
        };

        let result = if refresh {
            self.badges.refresh(key.clone(), fetcher).await
        } else {
            self.badges.get_or_fetch(key.clone(), fetcher).await
        };

        match result {
            Ok(badges) => badges,
            Err(err) => {
                warn!("badge lookup for {} failed: {}", key.subject_id, err);
                Vec::new()
            }
        }
    }

    async fn fetch_cosmetics(&self, subject_id: String, refresh: bool) -> Vec<Cosmetic> {
        let provider = Arc::clone(&self.cosmetics_provider);
        let retry = self.retry;
        let subject = subject_id.clone();
        let fetcher = move || async move {
            retry.run(|| provider.fetch_cosmetics(&subject)).await
        };

        let result = if refresh {
            self.cosmetics.refresh(subject_id.clone(), fetcher).await
        } else {
            self.cosmetics.get_or_fetch(subject_id.clone(), fetcher).await
        };

        match result {
            Ok(cosmetics) => cosmetics,
            Err(err) => {
                warn!("cosmetics lookup for {} failed: {}", subject_id, err);
                Vec::new()
            }
        }
    }

    async fn fetch_third_party(&self, subject_id: String, refresh: bool) -> Vec<ThirdPartyBadge> {
        let provider = Arc::clone(&self.third_party_provider);
        let retry = self.retry;
        let subject = subject_id.clone();
        let fetcher = move || async move {
            retry
                .run(|| provider.fetch_third_party_badges(&subject))
                .await
        };

        let result = if refresh {
            self.third_party.refresh(subject_id.clone(), fetcher).await
        } else {
            self.third_party.get_or_fetch(subject_id.clone(), fetcher).await
        };

        match result {
            Ok(badges) => badges,
            Err(err) => {
                warn!("third-party badge lookup for {} failed: {}", subject_id, err);
                Vec::new()
            }
        }
    }
}
