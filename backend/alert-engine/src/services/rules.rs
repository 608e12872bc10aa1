//! Preference matching and channel selection rules
//!
//! Pure functions applied after the filter combiner: matching an alert
//! against a preference's per-type conditions, selecting channels by
//! priority tier, applying channel-level quiet hours, and merging
//! per-preference filter results into one decision.

use crate::models::{
    AlertChannel, AlertData, AlertPreference, AlertPriority, AlertType, ChannelType, FilterResult,
    FrequencyType,
};
use chrono::{DateTime, Utc};

/// Whether an alert matches a preference: the type must be configured and
/// enabled, and every non-empty condition group must match (groups are
/// AND-ed; values within a group are OR-ed).
pub fn matches_conditions(
    data: &AlertData,
    alert_type: AlertType,
    preference: &AlertPreference,
) -> bool {
    if !preference.active {
        return false;
    }
    let config = match preference.type_config(alert_type) {
        Some(config) if config.enabled => config,
        _ => return false,
    };
    let conditions = match &config.conditions {
        Some(c) if !c.is_empty() => c,
        _ => return true,
    };

    if !conditions.categories.is_empty() {
        let matched = data
            .category()
            .map(|c| conditions.categories.iter().any(|f| f.eq_ignore_ascii_case(c)))
            .unwrap_or(false);
        if !matched {
            return false;
        }
    }

    if !conditions.statuses.is_empty() {
        let matched = data
            .status()
            .map(|s| conditions.statuses.iter().any(|f| f.eq_ignore_ascii_case(s)))
            .unwrap_or(false);
        if !matched {
            return false;
        }
    }

    if !conditions.sponsor_ids.is_empty() {
        let matched = [data.sponsor_id(), data.sponsor_name()]
            .into_iter()
            .flatten()
            .any(|s| conditions.sponsor_ids.iter().any(|f| f.eq_ignore_ascii_case(s)));
        if !matched {
            return false;
        }
    }

    if !conditions.keywords.is_empty() {
        let text = data.text().to_lowercase();
        let matched = conditions
            .keywords
            .iter()
            .any(|k| text.contains(&k.to_lowercase()));
        if !matched {
            return false;
        }
    }

    if let Some(min) = conditions.min_engagement {
        let count = data.engagement_count().unwrap_or(0);
        if count < min {
            return false;
        }
    }

    true
}

/// Select a preference's channels by alert priority and channel tier.
pub fn channels_for_priority(
    priority: AlertPriority,
    channels: &[AlertChannel],
) -> Vec<ChannelType> {
    channels
        .iter()
        .filter(|c| c.enabled)
        .filter(|c| match priority {
            AlertPriority::Urgent => true,
            AlertPriority::High => c.tier != crate::models::ChannelTier::Low,
            AlertPriority::Normal => c.tier == crate::models::ChannelTier::Normal,
            // TODO(product): low-priority alerts currently go to every
            // enabled channel; confirm whether they should be in-app only
            AlertPriority::Low => true,
        })
        .map(|c| c.channel_type)
        .collect()
}

/// Whether a channel is inside its own quiet-hours window
pub fn is_in_quiet_hours(channel: &AlertChannel, now: DateTime<Utc>) -> bool {
    channel
        .quiet_hours
        .as_ref()
        .map(|w| w.contains(now))
        .unwrap_or(false)
}

/// Drop channels that are inside their quiet-hours window. Urgent alerts
/// bypass channel-level quiet hours entirely.
pub fn filter_channels_by_quiet_hours<'a>(
    channels: Vec<&'a AlertChannel>,
    priority: AlertPriority,
    now: DateTime<Utc>,
) -> Vec<&'a AlertChannel> {
    if priority == AlertPriority::Urgent {
        return channels;
    }
    channels
        .into_iter()
        .filter(|c| !is_in_quiet_hours(c, now))
        .collect()
}

/// Whether delivery through this preference should be batched
pub fn should_batch(preference: &AlertPreference, priority: AlertPriority) -> bool {
    preference.frequency.frequency == FrequencyType::Batched
        && priority != AlertPriority::Urgent
}

/// Map an aggregate confidence onto a priority, never lowering urgent
pub fn adjust_priority(original: AlertPriority, confidence: f64) -> AlertPriority {
    if original == AlertPriority::Urgent {
        return AlertPriority::Urgent;
    }
    if confidence >= 0.8 {
        AlertPriority::High
    } else if confidence >= 0.6 {
        AlertPriority::Normal
    } else if confidence >= 0.3 {
        AlertPriority::Low
    } else {
        original
    }
}

/// Merge per-preference filter results into one decision.
///
/// The first blocking result wins verbatim; otherwise confidences are
/// averaged, reasons concatenated and the priority recomputed from the
/// merged confidence.
pub fn merge_filter_results(
    original_priority: AlertPriority,
    results: &[FilterResult],
) -> FilterResult {
    if results.is_empty() {
        return FilterResult {
            should_notify: true,
            confidence: 0.5,
            reasons: Vec::new(),
            suggested_priority: original_priority,
            recommended_channels: Vec::new(),
            should_batch: false,
        };
    }

    if let Some(blocked) = results.iter().find(|r| !r.should_notify) {
        return blocked.clone();
    }

    let confidence =
        results.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64;

    let mut reasons = Vec::new();
    let mut channels = Vec::new();
    for result in results {
        for reason in &result.reasons {
            if !reasons.contains(reason) {
                reasons.push(reason.clone());
            }
        }
        for channel in &result.recommended_channels {
            if !channels.contains(channel) {
                channels.push(*channel);
            }
        }
    }

    FilterResult {
        should_notify: true,
        confidence,
        reasons,
        suggested_priority: adjust_priority(original_priority, confidence),
        recommended_channels: channels,
        should_batch: results.iter().all(|r| r.should_batch),
    }
}
