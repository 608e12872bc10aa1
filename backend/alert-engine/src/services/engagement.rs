//! Engagement profile builder
//!
//! Derives a per-user relevance profile (top categories, sponsors and tags
//! with scores, plus an overall engagement level) from raw interaction
//! history. Profiles are cached with a long TTL and rebuilt on miss; the
//! rebuild is idempotent, so concurrent rebuilds for one user are harmless.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{EngagementLevel, EngagementRecord, ScoredItem, UserEngagementProfile};
use crate::stores::EngagementHistorySource;
use alert_cache::{CacheKey, CacheOperations};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Entries kept per dimension in a profile
const TOP_ITEMS: usize = 5;

/// Interaction counts separating engagement levels
const HIGH_ENGAGEMENT_COUNT: usize = 30;
const MEDIUM_ENGAGEMENT_COUNT: usize = 10;

pub struct EngagementProfileService<C: CacheOperations> {
    cache: Arc<C>,
    history: Arc<dyn EngagementHistorySource>,
    config: EngineConfig,
}

impl<C: CacheOperations> EngagementProfileService<C> {
    pub fn new(
        cache: Arc<C>,
        history: Arc<dyn EngagementHistorySource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            cache,
            history,
            config,
        }
    }

    /// Get the user's profile, rebuilding on cache miss.
    ///
    /// Never fails: cache errors degrade to a rebuild, and history errors
    /// degrade to a neutral profile so filtering can proceed.
    pub async fn get_profile(&self, user_id: Uuid) -> UserEngagementProfile {
        let key = CacheKey::engagement_profile(user_id);

        match self.cache.get::<UserEngagementProfile>(&key).await {
            Ok(Some(profile)) => return profile,
            Ok(None) => {}
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Profile cache read failed, rebuilding");
            }
        }

        let profile = self.build_profile(user_id).await;

        if let Err(e) = self
            .cache
            .set(&key, &profile, self.config.profile_ttl_secs)
            .await
        {
            warn!(user_id = %user_id, error = %e, "Failed to cache engagement profile");
        }

        profile
    }

    /// Drop the cached profile so the next read rebuilds it
    pub async fn invalidate(&self, user_id: Uuid) -> Result<()> {
        let key = CacheKey::engagement_profile(user_id);
        self.cache.del(&key).await?;
        debug!(user_id = %user_id, "Invalidated engagement profile");
        Ok(())
    }

    async fn build_profile(&self, user_id: Uuid) -> UserEngagementProfile {
        let records = match self
            .history
            .get_recent_engagement(user_id, self.config.engagement_history_limit)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Engagement history unavailable, using neutral profile");
                return UserEngagementProfile::neutral(user_id);
            }
        };

        let profile = Self::aggregate(user_id, &records);
        debug!(
            user_id = %user_id,
            records = records.len(),
            level = ?profile.engagement_level,
            "Rebuilt engagement profile"
        );
        profile
    }

    fn aggregate(user_id: Uuid, records: &[EngagementRecord]) -> UserEngagementProfile {
        let mut categories: HashMap<String, f64> = HashMap::new();
        let mut sponsors: HashMap<String, f64> = HashMap::new();
        let mut tags: HashMap<String, f64> = HashMap::new();

        for record in records {
            if let Some(category) = &record.category {
                *categories.entry(category.to_lowercase()).or_insert(0.0) += record.score;
            }
            if let Some(sponsor) = &record.sponsor {
                *sponsors.entry(sponsor.to_lowercase()).or_insert(0.0) += record.score;
            }
            for tag in &record.tags {
                *tags.entry(tag.to_lowercase()).or_insert(0.0) += record.score;
            }
        }

        let engagement_level = if records.len() >= HIGH_ENGAGEMENT_COUNT {
            EngagementLevel::High
        } else if records.len() >= MEDIUM_ENGAGEMENT_COUNT {
            EngagementLevel::Medium
        } else {
            EngagementLevel::Low
        };

        UserEngagementProfile {
            user_id,
            top_categories: top_items(categories),
            top_sponsors: top_items(sponsors),
            top_tags: top_items(tags),
            engagement_level,
            built_at: Utc::now(),
        }
    }
}

fn top_items(scores: HashMap<String, f64>) -> Vec<ScoredItem> {
    let mut items: Vec<ScoredItem> = scores
        .into_iter()
        .map(|(name, score)| ScoredItem { name, score })
        .collect();
    items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    items.truncate(TOP_ITEMS);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryEngagementSource;
    use alert_cache::MemoryCache;

    fn record(category: &str, score: f64) -> EngagementRecord {
        EngagementRecord {
            entity_id: Uuid::new_v4(),
            score,
            last_engaged: Utc::now(),
            category: Some(category.to_string()),
            sponsor: None,
            tags: vec!["reform".to_string()],
        }
    }

    fn service(
        history: Arc<MemoryEngagementSource>,
    ) -> EngagementProfileService<MemoryCache> {
        EngagementProfileService::new(
            Arc::new(MemoryCache::new()),
            history,
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_profile_aggregates_scores() {
        let history = Arc::new(MemoryEngagementSource::new());
        let user_id = Uuid::new_v4();
        history.add_record(user_id, record("healthcare", 20.0)).await;
        history.add_record(user_id, record("healthcare", 25.0)).await;
        history.add_record(user_id, record("education", 5.0)).await;

        let profile = service(history).get_profile(user_id).await;
        assert_eq!(profile.category_score("healthcare"), Some(45.0));
        assert_eq!(profile.category_score("education"), Some(5.0));
        assert_eq!(profile.top_categories[0].name, "healthcare");
        assert_eq!(profile.tag_score("reform"), Some(50.0));
    }

    #[tokio::test]
    async fn test_engagement_level_thresholds() {
        let history = Arc::new(MemoryEngagementSource::new());
        let user_id = Uuid::new_v4();
        for _ in 0..12 {
            history.add_record(user_id, record("healthcare", 1.0)).await;
        }

        let profile = service(history).get_profile(user_id).await;
        assert_eq!(profile.engagement_level, EngagementLevel::Medium);
    }

    #[tokio::test]
    async fn test_empty_history_is_neutral() {
        let history = Arc::new(MemoryEngagementSource::new());
        let profile = service(history).get_profile(Uuid::new_v4()).await;
        assert_eq!(profile.engagement_level, EngagementLevel::Low);
        assert!(profile.top_categories.is_empty());
    }

    #[tokio::test]
    async fn test_profile_is_cached_and_invalidated() {
        let history = Arc::new(MemoryEngagementSource::new());
        let user_id = Uuid::new_v4();
        history.add_record(user_id, record("healthcare", 10.0)).await;

        let service = service(history.clone());
        let first = service.get_profile(user_id).await;

        // New history does not appear until invalidation
        history.add_record(user_id, record("healthcare", 30.0)).await;
        let cached = service.get_profile(user_id).await;
        assert_eq!(cached.category_score("healthcare"), first.category_score("healthcare"));

        service.invalidate(user_id).await.unwrap();
        let rebuilt = service.get_profile(user_id).await;
        assert_eq!(rebuilt.category_score("healthcare"), Some(40.0));
    }
}
