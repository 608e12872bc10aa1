//! In-memory collaborator implementations, used by tests and by deployments
//! that wire the engine without external infrastructure.

use super::{
    ChannelTransport, DeliveryLogStore, EngagementHistorySource, InterestSource, PreferenceStore,
};
use crate::error::{AlertError, Result};
use crate::models::{
    AlertDeliveryLog, AlertPreference, ChannelDeliveryResult, ChannelType, DeliveryLogPage,
    DeliveryLogQuery, DeliveryStats, EngagementRecord, NotificationContent,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Page size cap enforced by log queries
pub const MAX_PAGE_LIMIT: u32 = 100;

/// In-memory preference store. The write lock serializes mutations to a
/// user's preference collection, satisfying the read-modify-write contract.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    preferences: RwLock<HashMap<Uuid, Vec<AlertPreference>>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get_preferences(&self, user_id: Uuid) -> Result<Vec<AlertPreference>> {
        let preferences = self.preferences.read().await;
        Ok(preferences.get(&user_id).cloned().unwrap_or_default())
    }

    async fn save_preference(&self, user_id: Uuid, preference: &AlertPreference) -> Result<()> {
        let mut preferences = self.preferences.write().await;
        preferences
            .entry(user_id)
            .or_default()
            .push(preference.clone());
        Ok(())
    }

    async fn update_preference(&self, user_id: Uuid, preference: &AlertPreference) -> Result<()> {
        let mut preferences = self.preferences.write().await;
        let collection = preferences
            .get_mut(&user_id)
            .ok_or_else(|| AlertError::NotFound(format!("no preferences for user {}", user_id)))?;

        match collection.iter_mut().find(|p| p.id == preference.id) {
            Some(existing) => {
                *existing = preference.clone();
                Ok(())
            }
            None => Err(AlertError::NotFound(format!(
                "preference {} not found",
                preference.id
            ))),
        }
    }

    async fn delete_preference(&self, user_id: Uuid, preference_id: Uuid) -> Result<()> {
        let mut preferences = self.preferences.write().await;
        let collection = preferences
            .get_mut(&user_id)
            .ok_or_else(|| AlertError::NotFound(format!("no preferences for user {}", user_id)))?;

        let before = collection.len();
        collection.retain(|p| p.id != preference_id);
        if collection.len() == before {
            return Err(AlertError::NotFound(format!(
                "preference {} not found",
                preference_id
            )));
        }
        Ok(())
    }
}

/// In-memory engagement history
#[derive(Default)]
pub struct MemoryEngagementSource {
    records: RwLock<HashMap<Uuid, Vec<EngagementRecord>>>,
}

impl MemoryEngagementSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_record(&self, user_id: Uuid, record: EngagementRecord) {
        let mut records = self.records.write().await;
        records.entry(user_id).or_default().push(record);
    }
}

#[async_trait::async_trait]
impl EngagementHistorySource for MemoryEngagementSource {
    async fn get_recent_engagement(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<EngagementRecord>> {
        let records = self.records.read().await;
        let mut rows = records.get(&user_id).cloned().unwrap_or_default();
        rows.sort_by(|a, b| b.last_engaged.cmp(&a.last_engaged));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

/// In-memory declared-interest lookup
#[derive(Default)]
pub struct MemoryInterestSource {
    interests: RwLock<HashMap<Uuid, Vec<String>>>,
    entity_categories: RwLock<HashMap<Uuid, String>>,
}

impl MemoryInterestSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_interests(&self, user_id: Uuid, interests: Vec<String>) {
        self.interests.write().await.insert(user_id, interests);
    }

    pub async fn set_entity_category(&self, entity_id: Uuid, category: String) {
        self.entity_categories
            .write()
            .await
            .insert(entity_id, category);
    }
}

#[async_trait::async_trait]
impl InterestSource for MemoryInterestSource {
    async fn get_user_interests(&self, user_id: Uuid) -> Result<Vec<String>> {
        Ok(self
            .interests
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_entity_category(&self, entity_id: Uuid) -> Result<Option<String>> {
        Ok(self.entity_categories.read().await.get(&entity_id).cloned())
    }
}

/// In-memory delivery log store with a per-user cap (oldest evicted first)
pub struct MemoryDeliveryLogStore {
    logs: RwLock<HashMap<Uuid, Vec<AlertDeliveryLog>>>,
    max_per_user: usize,
}

impl MemoryDeliveryLogStore {
    pub fn new(max_per_user: usize) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            max_per_user,
        }
    }

    fn matches(log: &AlertDeliveryLog, query: &DeliveryLogQuery) -> bool {
        if let Some(alert_type) = query.alert_type {
            if log.alert_type != alert_type {
                return false;
            }
        }
        if let Some(status) = query.status {
            if log.status != status {
                return false;
            }
        }
        if let Some(from) = query.from {
            if log.created_at < from {
                return false;
            }
        }
        if let Some(to) = query.to {
            if log.created_at > to {
                return false;
            }
        }
        true
    }
}

#[async_trait::async_trait]
impl DeliveryLogStore for MemoryDeliveryLogStore {
    async fn append(&self, log: &AlertDeliveryLog) -> Result<()> {
        let mut logs = self.logs.write().await;
        let collection = logs.entry(log.user_id).or_default();
        collection.push(log.clone());

        if collection.len() > self.max_per_user {
            let excess = collection.len() - self.max_per_user;
            collection.drain(0..excess);
        }
        Ok(())
    }

    async fn query(&self, user_id: Uuid, query: &DeliveryLogQuery) -> Result<DeliveryLogPage> {
        let logs = self.logs.read().await;
        let mut matching: Vec<AlertDeliveryLog> = logs
            .get(&user_id)
            .map(|collection| {
                collection
                    .iter()
                    .filter(|log| Self::matches(log, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Newest first
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let limit = query.limit.clamp(1, MAX_PAGE_LIMIT);
        let page = query.page.max(1);
        let page_count = total.div_ceil(limit as u64) as u32;

        let start = ((page - 1) * limit) as usize;
        let entries = if start >= matching.len() {
            Vec::new()
        } else {
            matching[start..(start + limit as usize).min(matching.len())].to_vec()
        };

        Ok(DeliveryLogPage {
            logs: entries,
            total,
            page,
            page_count,
        })
    }

    async fn stats(&self, user_id: Uuid) -> Result<DeliveryStats> {
        let logs = self.logs.read().await;
        let mut stats = DeliveryStats::default();

        if let Some(collection) = logs.get(&user_id) {
            stats.total = collection.len() as u64;
            for log in collection {
                *stats
                    .by_status
                    .entry(log.status.as_str().to_string())
                    .or_insert(0) += 1;
                for channel in &log.channels {
                    *stats
                        .by_channel
                        .entry(channel.as_str().to_string())
                        .or_insert(0) += 1;
                }
            }
        }
        Ok(stats)
    }
}

/// Transport that records every send; configurable to fail, for tests and
/// for wiring channels that are not yet backed by a real provider
pub struct RecordingTransport {
    channel: ChannelType,
    fail_with: Option<String>,
    sent: Arc<Mutex<Vec<(Uuid, NotificationContent)>>>,
}

impl RecordingTransport {
    pub fn new(channel: ChannelType) -> Self {
        Self {
            channel,
            fail_with: None,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(channel: ChannelType, error: impl Into<String>) -> Self {
        Self {
            channel,
            fail_with: Some(error.into()),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn sent_messages(&self) -> Vec<(Uuid, NotificationContent)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl ChannelTransport for RecordingTransport {
    fn channel(&self) -> ChannelType {
        self.channel
    }

    async fn send(&self, user_id: Uuid, content: &NotificationContent) -> ChannelDeliveryResult {
        if let Some(error) = &self.fail_with {
            return ChannelDeliveryResult {
                success: false,
                channel: self.channel,
                message_id: None,
                error: Some(error.clone()),
            };
        }

        self.sent.lock().await.push((user_id, content.clone()));
        ChannelDeliveryResult {
            success: true,
            channel: self.channel,
            message_id: Some(Uuid::new_v4().to_string()),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertType, DeliveryMetadata, DeliveryStatus};
    use chrono::Utc;

    fn make_log(user_id: Uuid, status: DeliveryStatus) -> AlertDeliveryLog {
        AlertDeliveryLog {
            id: Uuid::new_v4(),
            user_id,
            preference_id: None,
            alert_type: AlertType::BillStatusChange,
            channels: vec![ChannelType::InApp],
            status,
            attempts: 1,
            failure_reason: None,
            metadata: DeliveryMetadata::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_preference_store_delete_not_found() {
        let store = MemoryPreferenceStore::new();
        let result = store.delete_preference(Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(AlertError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_log_store_cap_evicts_oldest() {
        let store = MemoryDeliveryLogStore::new(3);
        let user_id = Uuid::new_v4();

        let mut first_id = None;
        for i in 0..4 {
            let log = make_log(user_id, DeliveryStatus::Sent);
            if i == 0 {
                first_id = Some(log.id);
            }
            store.append(&log).await.unwrap();
        }

        let page = store
            .query(user_id, &DeliveryLogQuery { page: 1, limit: 10, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert!(page.logs.iter().all(|l| Some(l.id) != first_id));
    }

    #[tokio::test]
    async fn test_log_store_query_filters_and_pagination() {
        let store = MemoryDeliveryLogStore::new(100);
        let user_id = Uuid::new_v4();

        for _ in 0..5 {
            store.append(&make_log(user_id, DeliveryStatus::Sent)).await.unwrap();
        }
        for _ in 0..2 {
            store
                .append(&make_log(user_id, DeliveryStatus::Filtered))
                .await
                .unwrap();
        }

        let page = store
            .query(
                user_id,
                &DeliveryLogQuery {
                    status: Some(DeliveryStatus::Sent),
                    page: 1,
                    limit: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.logs.len(), 2);
        assert_eq!(page.page_count, 3);
    }

    #[tokio::test]
    async fn test_log_store_limit_is_capped() {
        let store = MemoryDeliveryLogStore::new(100);
        let user_id = Uuid::new_v4();
        store.append(&make_log(user_id, DeliveryStatus::Sent)).await.unwrap();

        let page = store
            .query(user_id, &DeliveryLogQuery { page: 1, limit: 5000, ..Default::default() })
            .await
            .unwrap();
        // One entry, one page, regardless of the oversized limit
        assert_eq!(page.page_count, 1);
    }

    #[tokio::test]
    async fn test_recording_transport_failure() {
        let transport = RecordingTransport::failing(ChannelType::Email, "smtp unavailable");
        let result = transport
            .send(
                Uuid::new_v4(),
                &NotificationContent {
                    title: "t".to_string(),
                    message: "m".to_string(),
                    metadata: None,
                },
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("smtp unavailable"));
        assert_eq!(transport.sent_count().await, 0);
    }
}
