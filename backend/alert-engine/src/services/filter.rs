//! Filter combiner
//!
//! Runs the mandatory checks, then the relevance battery, and folds the
//! verdicts into a single send/suppress decision with an aggregate
//! confidence, priority adjustment, channel recommendation and batching
//! hint. Evaluation fails open: an internal error allows the notification
//! at low confidence rather than silently dropping it.

use crate::error::Result;
use crate::metrics;
use crate::models::{
    AlertPriority, ChannelFlags, ChannelType, FilterCriteria, FilterResult, FrequencyType,
};
use crate::services::checks::{self, CheckOutcome};
use crate::services::engagement::EngagementProfileService;
use crate::stores::InterestSource;
use alert_cache::CacheOperations;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Confidence reported when evaluation fails open
const FAIL_OPEN_CONFIDENCE: f64 = 0.3;

/// Aggregate confidence when no check contributed a signal
const DEFAULT_CONFIDENCE: f64 = 0.5;

pub struct FilterEngine<C: CacheOperations> {
    profiles: Arc<EngagementProfileService<C>>,
    interests: Arc<dyn InterestSource>,
}

impl<C: CacheOperations> FilterEngine<C> {
    pub fn new(
        profiles: Arc<EngagementProfileService<C>>,
        interests: Arc<dyn InterestSource>,
    ) -> Self {
        Self {
            profiles,
            interests,
        }
    }

    /// Evaluate a notification against the user's resolved preferences.
    ///
    /// Never fails: internal errors degrade to an allow at low confidence
    /// so a broken signal source cannot silence a user's alerts.
    pub async fn evaluate(&self, criteria: &FilterCriteria) -> FilterResult {
        match self.evaluate_at(criteria, Utc::now()).await {
            Ok(result) => {
                let outcome = if result.should_notify { "allowed" } else { "blocked" };
                metrics::FILTER_EVALUATIONS.with_label_values(&[outcome]).inc();
                result
            }
            Err(e) => {
                warn!(
                    user_id = %criteria.user_id,
                    error = %e,
                    "Filter evaluation failed, allowing notification"
                );
                metrics::FILTER_EVALUATIONS.with_label_values(&["error"]).inc();
                FilterResult {
                    should_notify: true,
                    confidence: FAIL_OPEN_CONFIDENCE,
                    reasons: vec!["Filtering error, allowing notification".to_string()],
                    suggested_priority: criteria.priority,
                    recommended_channels: criteria.preferences.channels.enabled(),
                    should_batch: false,
                }
            }
        }
    }

    async fn evaluate_at(
        &self,
        criteria: &FilterCriteria,
        now: DateTime<Utc>,
    ) -> Result<FilterResult> {
        let prefs = &criteria.preferences;

        // Mandatory checks block unconditionally; their reasons name the
        // exclusion so urgent bypass logic below never applies to them.
        let mandatory = [
            checks::check_type_enabled(criteria),
            checks::check_quiet_hours(criteria, now),
        ];
        if let Some(blocked) = mandatory.iter().find(|o| !o.should_notify) {
            debug!(
                user_id = %criteria.user_id,
                reason = %blocked.reasons[0],
                "Notification blocked by mandatory check"
            );
            return Ok(Self::blocked(criteria, blocked.confidence, blocked.reasons.clone()));
        }

        // With smart filtering off the mandatory checks are the whole policy
        if !prefs.smart_filtering.enabled {
            return Ok(FilterResult {
                should_notify: true,
                confidence: 1.0,
                reasons: Vec::new(),
                suggested_priority: criteria.priority,
                recommended_channels: prefs.channels.enabled(),
                should_batch: should_batch(prefs.frequency, criteria.priority),
            });
        }

        let (profile, interest) = tokio::join!(
            self.profiles.get_profile(criteria.user_id),
            checks::check_interest_relevance(criteria, self.interests.as_ref()),
        );
        let interest = interest?;

        let mut outcomes: Vec<CheckOutcome> = mandatory.into_iter().collect();
        outcomes.push(checks::check_priority_threshold(criteria));
        outcomes.push(checks::check_category_relevance(criteria, &profile));
        outcomes.push(checks::check_sponsor_relevance(criteria, &profile));
        outcomes.push(checks::check_tag_relevance(criteria, &profile));
        outcomes.push(checks::check_keyword_relevance(criteria));
        if let Some(outcome) = interest {
            outcomes.push(outcome);
        }

        let urgent = criteria.priority == AlertPriority::Urgent;
        let mut reasons: Vec<String> = Vec::new();

        if let Some(blocked) = outcomes.iter().find(|o| !o.should_notify) {
            if urgent && !outcomes.iter().any(|o| !o.should_notify && o.is_strict_exclusion()) {
                reasons.push("Urgent priority override".to_string());
            } else {
                debug!(
                    user_id = %criteria.user_id,
                    reason = %blocked.reasons[0],
                    "Notification blocked by relevance check"
                );
                return Ok(Self::blocked(criteria, blocked.confidence, blocked.reasons.clone()));
            }
        }

        let passing: Vec<&CheckOutcome> = outcomes.iter().filter(|o| o.should_notify).collect();
        let confidence = if passing.is_empty() {
            DEFAULT_CONFIDENCE
        } else {
            passing.iter().map(|o| o.confidence).sum::<f64>() / passing.len() as f64
        };

        for outcome in &passing {
            for reason in &outcome.reasons {
                if !reasons.contains(reason) {
                    reasons.push(reason.clone());
                }
            }
        }

        if !urgent && confidence < prefs.smart_filtering.minimum_confidence {
            return Ok(Self::blocked(
                criteria,
                confidence,
                vec![format!(
                    "Aggregate confidence {:.2} below minimum {:.2}",
                    confidence, prefs.smart_filtering.minimum_confidence
                )],
            ));
        }

        let suggested_priority = match criteria.priority {
            AlertPriority::Normal if confidence > 0.8 => AlertPriority::High,
            AlertPriority::Normal if confidence < 0.4 => AlertPriority::Low,
            original => original,
        };

        Ok(FilterResult {
            should_notify: true,
            confidence,
            reasons,
            suggested_priority,
            recommended_channels: recommend_channels(
                confidence,
                suggested_priority,
                &prefs.channels,
            ),
            should_batch: should_batch(prefs.frequency, criteria.priority),
        })
    }

    fn blocked(criteria: &FilterCriteria, confidence: f64, reasons: Vec<String>) -> FilterResult {
        FilterResult {
            should_notify: false,
            confidence,
            reasons,
            suggested_priority: criteria.priority,
            recommended_channels: Vec::new(),
            should_batch: false,
        }
    }
}

/// Recommend channels by confidence and priority, restricted to what the
/// user enabled. Always falls back to the first enabled channel so an
/// allowed notification is never left without a route.
pub fn recommend_channels(
    confidence: f64,
    priority: AlertPriority,
    flags: &ChannelFlags,
) -> Vec<ChannelType> {
    let elevated = matches!(priority, AlertPriority::High | AlertPriority::Urgent);
    let mut channels = Vec::new();

    if flags.in_app {
        channels.push(ChannelType::InApp);
    }
    if flags.push && (confidence > 0.6 || elevated) {
        channels.push(ChannelType::Push);
    }
    if flags.email && (confidence > 0.75 || elevated) {
        channels.push(ChannelType::Email);
    }
    if flags.sms && priority == AlertPriority::Urgent {
        channels.push(ChannelType::Sms);
    }
    if flags.webhook && (confidence > 0.6 || elevated) {
        channels.push(ChannelType::Webhook);
    }

    if channels.is_empty() {
        if let Some(first) = flags.enabled().into_iter().next() {
            channels.push(first);
        }
    }
    channels
}

/// Batched delivery applies to allowed notifications below urgent priority
pub fn should_batch(frequency: FrequencyType, priority: AlertPriority) -> bool {
    frequency == FrequencyType::Batched && priority != AlertPriority::Urgent
}
