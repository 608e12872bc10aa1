use serde::{Deserialize, Serialize};

/// Engine configuration, read from the environment with sensible defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// TTL for cached engagement profiles in seconds (default: 24h)
    pub profile_ttl_secs: u64,
    /// TTL for cached delivery statistics in seconds (default: 1h)
    pub stats_ttl_secs: u64,
    /// Per-user delivery log cap; oldest entries are evicted first
    pub max_logs_per_user: usize,
    /// Timeout for an individual channel dispatch in seconds
    pub channel_timeout_secs: u64,
    /// Engagement history rows fetched when rebuilding a profile
    pub engagement_history_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile_ttl_secs: alert_cache::ttl::ENGAGEMENT_PROFILE,
            stats_ttl_secs: alert_cache::ttl::DELIVERY_STATS,
            max_logs_per_user: 1000,
            channel_timeout_secs: 10,
            engagement_history_limit: 100,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = Self::default();
        Ok(EngineConfig {
            profile_ttl_secs: std::env::var("ALERT_PROFILE_TTL_SECS")
                .unwrap_or_else(|_| defaults.profile_ttl_secs.to_string())
                .parse()?,
            stats_ttl_secs: std::env::var("ALERT_STATS_TTL_SECS")
                .unwrap_or_else(|_| defaults.stats_ttl_secs.to_string())
                .parse()?,
            max_logs_per_user: std::env::var("ALERT_MAX_LOGS_PER_USER")
                .unwrap_or_else(|_| defaults.max_logs_per_user.to_string())
                .parse()?,
            channel_timeout_secs: std::env::var("ALERT_CHANNEL_TIMEOUT_SECS")
                .unwrap_or_else(|_| defaults.channel_timeout_secs.to_string())
                .parse()?,
            engagement_history_limit: std::env::var("ALERT_ENGAGEMENT_HISTORY_LIMIT")
                .unwrap_or_else(|_| defaults.engagement_history_limit.to_string())
                .parse()?,
        })
    }
}
