//! Delivery orchestrator
//!
//! Drives one delivery attempt through its states: evaluating, then either
//! filtered or delivering, then delivered / partially failed / failed.
//! Channel dispatches are a best-effort scatter/gather: every recommended
//! channel is attempted concurrently, one failure never cancels siblings,
//! and the send counts as a whole success when at least one channel got
//! through. Every outcome is recorded in the delivery log.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::metrics;
use crate::models::{
    AlertData, AlertDeliveryLog, AlertPriority, AlertTemplate, BulkRecipientResult, BulkResult,
    ChannelDeliveryResult, ChannelType, DeliveryLogPage, DeliveryLogQuery, DeliveryMetadata,
    DeliveryResult, DeliveryStats, DeliveryStatus, FilterCriteria, NotificationContent,
};
use crate::services::filter::FilterEngine;
use crate::services::preferences::PreferenceService;
use crate::services::rules;
use alert_cache::{CacheKey, CacheOperations};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-attempt delivery state, for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryState {
    Evaluating,
    Filtered,
    Delivering,
    Delivered,
    PartiallyFailed,
    Failed,
}

pub struct DeliveryOrchestrator<C: CacheOperations> {
    preferences: Arc<PreferenceService>,
    filter: Arc<FilterEngine<C>>,
    transports: HashMap<ChannelType, Arc<dyn crate::stores::ChannelTransport>>,
    logs: Arc<dyn crate::stores::DeliveryLogStore>,
    cache: Arc<C>,
    config: EngineConfig,
}

impl<C: CacheOperations + 'static> DeliveryOrchestrator<C> {
    pub fn new(
        preferences: Arc<PreferenceService>,
        filter: Arc<FilterEngine<C>>,
        logs: Arc<dyn crate::stores::DeliveryLogStore>,
        cache: Arc<C>,
        config: EngineConfig,
    ) -> Self {
        Self {
            preferences,
            filter,
            transports: HashMap::new(),
            logs,
            cache,
            config,
        }
    }

    /// Register a transport under the channel it reports
    pub fn with_transport(mut self, transport: Arc<dyn crate::stores::ChannelTransport>) -> Self {
        self.transports.insert(transport.channel(), transport);
        self
    }

    /// Deliver one alert to one user, returning the audit log entries
    /// written for this attempt.
    pub async fn deliver(
        &self,
        user_id: Uuid,
        data: &AlertData,
        original_priority: AlertPriority,
    ) -> Result<Vec<AlertDeliveryLog>> {
        let (logs, _) = self.deliver_inner(user_id, data, original_priority).await?;
        Ok(logs)
    }

    /// Deliver and return the caller-facing aggregate result
    pub async fn deliver_result(
        &self,
        user_id: Uuid,
        data: &AlertData,
        original_priority: AlertPriority,
    ) -> Result<DeliveryResult> {
        let (_, result) = self.deliver_inner(user_id, data, original_priority).await?;
        Ok(result)
    }

    async fn deliver_inner(
        &self,
        user_id: Uuid,
        data: &AlertData,
        original_priority: AlertPriority,
    ) -> Result<(Vec<AlertDeliveryLog>, DeliveryResult)> {
        let alert_type = data.alert_type();
        debug!(
            user_id = %user_id,
            alert_type = %alert_type.as_str(),
            state = ?DeliveryState::Evaluating,
            "Starting delivery"
        );

        let all_preferences = self.preferences.get_preferences(user_id).await;
        let matching: Vec<_> = all_preferences
            .iter()
            .filter(|p| rules::matches_conditions(data, alert_type, p))
            .cloned()
            .collect();
        let preference_id = matching.first().map(|p| p.id);

        if matching.is_empty() {
            let reasons = vec!["No active preference matches this alert".to_string()];
            let log = self
                .record(
                    user_id,
                    None,
                    data,
                    DeliveryStatus::Filtered,
                    Vec::new(),
                    original_priority,
                    original_priority,
                    None,
                    Some(reasons.join("; ")),
                )
                .await?;
            metrics::DELIVERIES.with_label_values(&["filtered"]).inc();
            return Ok((
                vec![log],
                DeliveryResult {
                    sent: false,
                    channels: Vec::new(),
                    filtered_out: true,
                    filter_reasons: reasons,
                    notification_id: None,
                },
            ));
        }

        let resolved = PreferenceService::resolve(user_id, &matching);
        let criteria = FilterCriteria {
            user_id,
            bill_id: data.bill_id(),
            category: data.category().map(str::to_string),
            tags: Vec::new(),
            sponsor: data
                .sponsor_name()
                .or_else(|| data.sponsor_id())
                .map(str::to_string),
            priority: original_priority,
            notification_type: alert_type,
            subtype: None,
            title: Some(data.title()),
            message: Some(data.body()),
            preferences: resolved,
        };

        let verdict = self.filter.evaluate(&criteria).await;

        if !verdict.should_notify {
            debug!(
                user_id = %user_id,
                state = ?DeliveryState::Filtered,
                reasons = ?verdict.reasons,
                "Delivery filtered"
            );
            let log = self
                .record(
                    user_id,
                    preference_id,
                    data,
                    DeliveryStatus::Filtered,
                    Vec::new(),
                    original_priority,
                    verdict.suggested_priority,
                    Some(verdict.confidence),
                    Some(verdict.reasons.join("; ")),
                )
                .await?;
            metrics::DELIVERIES.with_label_values(&["filtered"]).inc();
            return Ok((
                vec![log],
                DeliveryResult {
                    sent: false,
                    channels: Vec::new(),
                    filtered_out: true,
                    filter_reasons: verdict.reasons,
                    notification_id: None,
                },
            ));
        }

        if verdict.should_batch {
            let log = self
                .record(
                    user_id,
                    preference_id,
                    data,
                    DeliveryStatus::Pending,
                    verdict.recommended_channels.clone(),
                    original_priority,
                    verdict.suggested_priority,
                    Some(verdict.confidence),
                    Some("Queued for batched delivery".to_string()),
                )
                .await?;
            metrics::DELIVERIES.with_label_values(&["pending"]).inc();
            return Ok((
                vec![log],
                DeliveryResult {
                    sent: false,
                    channels: Vec::new(),
                    filtered_out: false,
                    filter_reasons: verdict.reasons,
                    notification_id: None,
                },
            ));
        }

        // Channel-level quiet hours prune the recommendation (urgent bypasses)
        let now = Utc::now();
        let muted: Vec<ChannelType> = matching
            .iter()
            .flat_map(|p| p.enabled_channels())
            .filter(|c| rules::is_in_quiet_hours(c, now))
            .map(|c| c.channel_type)
            .collect();
        let attempt: Vec<ChannelType> = verdict
            .recommended_channels
            .iter()
            .copied()
            .filter(|c| {
                verdict.suggested_priority == AlertPriority::Urgent || !muted.contains(c)
            })
            .collect();

        debug!(
            user_id = %user_id,
            state = ?DeliveryState::Delivering,
            channels = ?attempt,
            "Dispatching channels"
        );

        let outcomes = self.dispatch(user_id, data, &attempt).await;

        let succeeded: Vec<ChannelType> = outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.channel)
            .collect();
        for outcome in outcomes.iter().filter(|o| !o.success) {
            metrics::CHANNEL_FAILURES
                .with_label_values(&[outcome.channel.as_str()])
                .inc();
            warn!(
                user_id = %user_id,
                channel = %outcome.channel.as_str(),
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Channel delivery failed"
            );
        }

        let (state, status) = if succeeded.len() == outcomes.len() && !outcomes.is_empty() {
            (DeliveryState::Delivered, DeliveryStatus::Delivered)
        } else if !succeeded.is_empty() {
            (DeliveryState::PartiallyFailed, DeliveryStatus::Sent)
        } else {
            (DeliveryState::Failed, DeliveryStatus::Failed)
        };

        let failure_reason = if succeeded.len() == outcomes.len() {
            None
        } else {
            Some(
                outcomes
                    .iter()
                    .filter(|o| !o.success)
                    .map(|o| {
                        format!(
                            "{}: {}",
                            o.channel.as_str(),
                            o.error.as_deref().unwrap_or("unknown error")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        };

        let notification_id = outcomes
            .iter()
            .find(|o| o.success && o.channel == ChannelType::InApp)
            .and_then(|o| o.message_id.clone());

        let log = self
            .record(
                user_id,
                preference_id,
                data,
                status,
                attempt.clone(),
                original_priority,
                verdict.suggested_priority,
                Some(verdict.confidence),
                failure_reason,
            )
            .await?;
        metrics::DELIVERIES
            .with_label_values(&[status.as_str()])
            .inc();
        info!(
            user_id = %user_id,
            alert_type = %alert_type.as_str(),
            state = ?state,
            succeeded = succeeded.len(),
            attempted = outcomes.len(),
            "Delivery finished"
        );

        Ok((
            vec![log],
            DeliveryResult {
                sent: !succeeded.is_empty(),
                channels: succeeded,
                filtered_out: false,
                filter_reasons: verdict.reasons,
                notification_id,
            },
        ))
    }

    /// Best-effort concurrent fan-out: one task per channel, each bounded
    /// by the configured timeout; a timeout or panic is that channel's
    /// failure, never an overall abort.
    async fn dispatch(
        &self,
        user_id: Uuid,
        data: &AlertData,
        channels: &[ChannelType],
    ) -> Vec<ChannelDeliveryResult> {
        let content = Arc::new(NotificationContent::from_alert(data));
        let timeout = Duration::from_secs(self.config.channel_timeout_secs);

        let mut outcomes = Vec::with_capacity(channels.len());
        let mut handles: Vec<(ChannelType, JoinHandle<ChannelDeliveryResult>)> = Vec::new();

        for channel in channels {
            let channel = *channel;
            match self.transports.get(&channel) {
                Some(transport) => {
                    let transport = transport.clone();
                    let content = content.clone();
                    handles.push((
                        channel,
                        tokio::spawn(async move {
                            match tokio::time::timeout(timeout, transport.send(user_id, &content))
                                .await
                            {
                                Ok(result) => result,
                                Err(_) => ChannelDeliveryResult {
                                    success: false,
                                    channel,
                                    message_id: None,
                                    error: Some("channel send timed out".to_string()),
                                },
                            }
                        }),
                    ));
                }
                None => outcomes.push(ChannelDeliveryResult {
                    success: false,
                    channel,
                    message_id: None,
                    error: Some("transport not configured".to_string()),
                }),
            }
        }

        let settled = futures::future::join_all(handles.into_iter().map(
            |(channel, handle)| async move {
                match handle.await {
                    Ok(result) => result,
                    Err(e) => ChannelDeliveryResult {
                        success: false,
                        channel,
                        message_id: None,
                        error: Some(format!("delivery task failed: {}", e)),
                    },
                }
            },
        ))
        .await;
        outcomes.extend(settled);
        outcomes
    }

    /// Bulk delivery: each recipient runs the full per-user flow in its own
    /// task; one recipient's failure never blocks the others. Results come
    /// back in input order.
    pub async fn send_bulk(
        self: Arc<Self>,
        user_ids: &[Uuid],
        template: &AlertTemplate,
    ) -> BulkResult {
        let mut handles = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            let orchestrator = self.clone();
            let data = template.data.clone();
            let priority = template.priority;
            let user_id = *user_id;
            handles.push((
                user_id,
                tokio::spawn(async move {
                    orchestrator.deliver_result(user_id, &data, priority).await
                }),
            ));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (user_id, handle) in handles {
            let entry = match handle.await {
                Ok(Ok(result)) => BulkRecipientResult {
                    user_id,
                    sent: result.sent,
                    filtered_out: result.filtered_out,
                    error: None,
                },
                Ok(Err(e)) => BulkRecipientResult {
                    user_id,
                    sent: false,
                    filtered_out: false,
                    error: Some(e.to_string()),
                },
                Err(e) => BulkRecipientResult {
                    user_id,
                    sent: false,
                    filtered_out: false,
                    error: Some(format!("delivery task failed: {}", e)),
                },
            };
            results.push(entry);
        }

        let succeeded = results.iter().filter(|r| r.sent).count();
        let failed = results.iter().filter(|r| r.error.is_some()).count();
        BulkResult {
            total: results.len(),
            succeeded,
            failed,
            results,
        }
    }

    /// A user's delivery log, filtered and paginated
    pub async fn delivery_logs(
        &self,
        user_id: Uuid,
        query: &DeliveryLogQuery,
    ) -> Result<DeliveryLogPage> {
        self.logs.query(user_id, query).await
    }

    /// Aggregated delivery statistics, cached with a short TTL
    pub async fn delivery_stats(&self, user_id: Uuid) -> Result<DeliveryStats> {
        let key = CacheKey::delivery_stats(user_id);
        match self.cache.get::<DeliveryStats>(&key).await {
            Ok(Some(stats)) => return Ok(stats),
            Ok(None) => {}
            Err(e) => warn!(user_id = %user_id, error = %e, "Stats cache read failed"),
        }

        let stats = self.logs.stats(user_id).await?;
        if let Err(e) = self
            .cache
            .set(&key, &stats, self.config.stats_ttl_secs)
            .await
        {
            warn!(user_id = %user_id, error = %e, "Failed to cache delivery stats");
        }
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        user_id: Uuid,
        preference_id: Option<Uuid>,
        data: &AlertData,
        status: DeliveryStatus,
        channels: Vec<ChannelType>,
        original_priority: AlertPriority,
        adjusted_priority: AlertPriority,
        confidence: Option<f64>,
        failure_reason: Option<String>,
    ) -> Result<AlertDeliveryLog> {
        let now = Utc::now();
        let log = AlertDeliveryLog {
            id: Uuid::new_v4(),
            user_id,
            preference_id,
            alert_type: data.alert_type(),
            channels,
            status,
            attempts: 1,
            failure_reason: failure_reason.clone(),
            metadata: DeliveryMetadata {
                original_priority: Some(original_priority),
                adjusted_priority: Some(adjusted_priority),
                filter_reason: failure_reason,
                confidence,
                related_ids: data.bill_id().into_iter().collect(),
            },
            created_at: now,
            updated_at: now,
        };
        self.logs.append(&log).await?;
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::engagement::EngagementProfileService;
    use crate::stores::{
        MemoryDeliveryLogStore, MemoryEngagementSource, MemoryInterestSource,
        MemoryPreferenceStore, RecordingTransport,
    };
    use alert_cache::MemoryCache;

    fn orchestrator_with(
        transports: Vec<Arc<RecordingTransport>>,
    ) -> Arc<DeliveryOrchestrator<MemoryCache>> {
        let cache = Arc::new(MemoryCache::new());
        let config = EngineConfig::default();
        let profiles = Arc::new(EngagementProfileService::new(
            cache.clone(),
            Arc::new(MemoryEngagementSource::new()),
            config.clone(),
        ));
        let filter = Arc::new(FilterEngine::new(
            profiles,
            Arc::new(MemoryInterestSource::new()),
        ));
        let preferences = Arc::new(PreferenceService::new(Arc::new(
            MemoryPreferenceStore::new(),
        )));
        let logs = Arc::new(MemoryDeliveryLogStore::new(config.max_logs_per_user));

        let mut orchestrator =
            DeliveryOrchestrator::new(preferences, filter, logs, cache, config);
        for transport in transports {
            orchestrator = orchestrator.with_transport(transport);
        }
        Arc::new(orchestrator)
    }

    fn status_alert() -> AlertData {
        AlertData::BillStatusChange {
            bill_id: Uuid::new_v4(),
            bill_title: "Healthcare Reform Act".to_string(),
            category: None,
            status: "passed".to_string(),
            summary: Some("Passed committee vote".to_string()),
        }
    }

    #[tokio::test]
    async fn test_successful_delivery_is_logged_delivered() {
        let in_app = Arc::new(RecordingTransport::new(ChannelType::InApp));
        let email = Arc::new(RecordingTransport::new(ChannelType::Email));
        let orchestrator = orchestrator_with(vec![in_app.clone(), email]);
        let user_id = Uuid::new_v4();

        let logs = orchestrator
            .deliver(user_id, &status_alert(), AlertPriority::High)
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryStatus::Delivered);
        assert_eq!(logs[0].attempts, 1);
        assert_eq!(
            logs[0].metadata.original_priority,
            Some(AlertPriority::High)
        );
        assert_eq!(in_app.sent_count().await, 1);
    }

    #[tokio::test]
    async fn test_partial_failure_still_counts_as_sent() {
        let in_app = Arc::new(RecordingTransport::new(ChannelType::InApp));
        let email = Arc::new(RecordingTransport::failing(
            ChannelType::Email,
            "smtp unavailable",
        ));
        let orchestrator = orchestrator_with(vec![in_app, email]);
        let user_id = Uuid::new_v4();

        let result = orchestrator
            .deliver_result(user_id, &status_alert(), AlertPriority::High)
            .await
            .unwrap();
        assert!(result.sent);
        assert_eq!(result.channels, vec![ChannelType::InApp]);
        assert!(result.notification_id.is_some());

        let page = orchestrator
            .delivery_logs(
                user_id,
                &DeliveryLogQuery {
                    limit: 10,
                    page: 1,
                    ..DeliveryLogQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.logs[0].status, DeliveryStatus::Sent);
        assert!(page.logs[0]
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("smtp unavailable"));
    }

    #[tokio::test]
    async fn test_all_channels_failing_is_logged_failed() {
        let in_app = Arc::new(RecordingTransport::failing(ChannelType::InApp, "down"));
        let email = Arc::new(RecordingTransport::failing(ChannelType::Email, "down"));
        let orchestrator = orchestrator_with(vec![in_app, email]);
        let user_id = Uuid::new_v4();

        let result = orchestrator
            .deliver_result(user_id, &status_alert(), AlertPriority::High)
            .await
            .unwrap();
        assert!(!result.sent);
        assert!(result.channels.is_empty());
        assert!(!result.filtered_out);
    }

    #[tokio::test]
    async fn test_missing_transport_is_a_channel_failure() {
        // Only in-app is wired; email is recommended at high priority but
        // has no transport
        let in_app = Arc::new(RecordingTransport::new(ChannelType::InApp));
        let orchestrator = orchestrator_with(vec![in_app]);
        let user_id = Uuid::new_v4();

        let result = orchestrator
            .deliver_result(user_id, &status_alert(), AlertPriority::High)
            .await
            .unwrap();
        assert!(result.sent);
        assert_eq!(result.channels, vec![ChannelType::InApp]);

        let page = orchestrator
            .delivery_logs(
                user_id,
                &DeliveryLogQuery {
                    limit: 10,
                    page: 1,
                    ..DeliveryLogQuery::default()
                },
            )
            .await
            .unwrap();
        assert!(page.logs[0]
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("transport not configured"));
    }

    #[tokio::test]
    async fn test_send_bulk_reports_in_input_order() {
        let in_app = Arc::new(RecordingTransport::new(ChannelType::InApp));
        let email = Arc::new(RecordingTransport::new(ChannelType::Email));
        let orchestrator = orchestrator_with(vec![in_app, email]);

        let users = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let template = AlertTemplate {
            data: status_alert(),
            priority: AlertPriority::High,
        };

        let result = orchestrator.clone().send_bulk(&users, &template).await;
        assert_eq!(result.total, 3);
        assert_eq!(result.succeeded, 3);
        assert_eq!(result.failed, 0);
        let returned: Vec<Uuid> = result.results.iter().map(|r| r.user_id).collect();
        assert_eq!(returned, users);
    }

    #[tokio::test]
    async fn test_delivery_stats_cached() {
        let in_app = Arc::new(RecordingTransport::new(ChannelType::InApp));
        let email = Arc::new(RecordingTransport::new(ChannelType::Email));
        let orchestrator = orchestrator_with(vec![in_app, email]);
        let user_id = Uuid::new_v4();

        orchestrator
            .deliver(user_id, &status_alert(), AlertPriority::High)
            .await
            .unwrap();
        let first = orchestrator.delivery_stats(user_id).await.unwrap();
        assert_eq!(first.total, 1);

        // Second delivery is invisible until the cached entry expires
        orchestrator
            .deliver(user_id, &status_alert(), AlertPriority::High)
            .await
            .unwrap();
        let cached = orchestrator.delivery_stats(user_id).await.unwrap();
        assert_eq!(cached.total, 1);
    }
}
