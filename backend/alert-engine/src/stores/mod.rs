//! Collaborator contracts consumed by the engine
//!
//! The engine is invoked in-process and owns no wire protocol. Preference
//! storage, engagement history, channel transports and the delivery log are
//! external collaborators reached through these traits.

pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::models::{
    AlertDeliveryLog, AlertPreference, ChannelDeliveryResult, ChannelType, DeliveryLogPage,
    DeliveryLogQuery, DeliveryStats, EngagementRecord, NotificationContent,
};
use uuid::Uuid;

pub use memory::{
    MemoryDeliveryLogStore, MemoryEngagementSource, MemoryInterestSource, MemoryPreferenceStore,
    RecordingTransport,
};
pub use postgres::{PgDeliveryLogStore, PgPreferenceStore};

/// Persistent storage of a user's alert preferences.
///
/// Concurrent mutations to one user's preference set must be serialized by
/// the implementation (atomic read-modify-write per user record).
#[async_trait::async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_preferences(&self, user_id: Uuid) -> Result<Vec<AlertPreference>>;

    async fn save_preference(&self, user_id: Uuid, preference: &AlertPreference) -> Result<()>;

    /// Replace an existing preference; NotFound when the id is absent
    async fn update_preference(&self, user_id: Uuid, preference: &AlertPreference) -> Result<()>;

    /// Remove a preference from the user's collection; NotFound when absent
    async fn delete_preference(&self, user_id: Uuid, preference_id: Uuid) -> Result<()>;
}

/// Source of raw engagement history, used only to rebuild profiles
#[async_trait::async_trait]
pub trait EngagementHistorySource: Send + Sync {
    async fn get_recent_engagement(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<EngagementRecord>>;
}

/// Declared-interest lookup for the interest-based relevance check
#[async_trait::async_trait]
pub trait InterestSource: Send + Sync {
    async fn get_user_interests(&self, user_id: Uuid) -> Result<Vec<String>>;

    async fn get_entity_category(&self, entity_id: Uuid) -> Result<Option<String>>;
}

/// One transport per channel type. A transport call is independently
/// dispatchable and must not block on other channels; failures are reported
/// inside the result, never by panicking.
#[async_trait::async_trait]
pub trait ChannelTransport: Send + Sync {
    fn channel(&self) -> ChannelType;

    async fn send(
        &self,
        user_id: Uuid,
        content: &NotificationContent,
    ) -> ChannelDeliveryResult;
}

/// Append/query access to the immutable delivery audit log.
///
/// Implementations cap each user's collection at a fixed maximum and evict
/// oldest entries first.
#[async_trait::async_trait]
pub trait DeliveryLogStore: Send + Sync {
    async fn append(&self, log: &AlertDeliveryLog) -> Result<()>;

    async fn query(&self, user_id: Uuid, query: &DeliveryLogQuery) -> Result<DeliveryLogPage>;

    async fn stats(&self, user_id: Uuid) -> Result<DeliveryStats>;
}
