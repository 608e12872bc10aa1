//! Cache key schema for the alert engine
//!
//! All engine components must build keys through these generators.
//! Key format: v{VERSION}:{entity}:{identifier}[:sub_key]

use uuid::Uuid;

/// Cache schema version - increment when changing key formats
pub const CACHE_VERSION: u32 = 1;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Engagement profile for a user
    /// Format: v1:engagement:{user_id}
    pub fn engagement_profile(user_id: Uuid) -> String {
        format!("v{}:engagement:{}", CACHE_VERSION, user_id)
    }

    /// Delivery statistics summary for a user
    /// Format: v1:delivery_stats:{user_id}
    pub fn delivery_stats(user_id: Uuid) -> String {
        format!("v{}:delivery_stats:{}", CACHE_VERSION, user_id)
    }

    /// Extract entity type from key
    pub fn entity_type(key: &str) -> Option<&str> {
        // Format: v{N}:{entity}:...
        let parts: Vec<&str> = key.split(':').collect();
        if parts.len() >= 2 {
            Some(parts[1])
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engagement_profile_key() {
        let user_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let key = CacheKey::engagement_profile(user_id);
        assert_eq!(key, "v1:engagement:550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_delivery_stats_key() {
        let user_id = Uuid::new_v4();
        let key = CacheKey::delivery_stats(user_id);
        assert!(key.starts_with("v1:delivery_stats:"));
        assert!(key.contains(&user_id.to_string()));
    }

    #[test]
    fn test_entity_type() {
        assert_eq!(CacheKey::entity_type("v1:engagement:123"), Some("engagement"));
        assert_eq!(
            CacheKey::entity_type("v1:delivery_stats:123"),
            Some("delivery_stats")
        );
        assert_eq!(CacheKey::entity_type("invalid"), None);
    }
}
