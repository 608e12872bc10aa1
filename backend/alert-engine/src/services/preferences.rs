//! Preference management
//!
//! CRUD over a user's alert preferences plus resolution of the full
//! preference set into the flat view consumed by the filter combiner.
//! Users without stored preferences get a permissive default synthesized
//! and persisted on first read.

use crate::error::{AlertError, Result};
use crate::models::{
    AlertChannel, AlertPreference, AlertPriority, AlertType, ChannelConfig, ChannelFlags,
    ChannelTier, FrequencyConfig, FrequencyType, ResolvedPreferences, SmartFilteringConfig,
    UpdatePreferencePayload,
};
use crate::stores::PreferenceStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct PreferenceService {
    store: Arc<dyn PreferenceStore>,
}

impl PreferenceService {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// Get the user's preferences, synthesizing a default on first read.
    ///
    /// Store errors degrade to an unpersisted default so filtering can
    /// proceed with permissive settings rather than failing the alert.
    pub async fn get_preferences(&self, user_id: Uuid) -> Vec<AlertPreference> {
        match self.store.get_preferences(user_id).await {
            Ok(preferences) if !preferences.is_empty() => preferences,
            Ok(_) => {
                let default = Self::default_preference(user_id);
                if let Err(e) = self.store.save_preference(user_id, &default).await {
                    warn!(user_id = %user_id, error = %e, "Failed to persist default preference");
                } else {
                    info!(user_id = %user_id, "Synthesized default preference");
                }
                vec![default]
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Preference store unavailable, using defaults");
                vec![Self::default_preference(user_id)]
            }
        }
    }

    pub async fn create_preference(
        &self,
        user_id: Uuid,
        mut preference: AlertPreference,
    ) -> Result<AlertPreference> {
        preference.user_id = user_id;
        preference.validate().map_err(AlertError::Validation)?;
        self.store.save_preference(user_id, &preference).await?;
        info!(user_id = %user_id, preference_id = %preference.id, "Created preference");
        Ok(preference)
    }

    /// Apply a partial update to an existing preference and revalidate
    pub async fn update_preference(
        &self,
        user_id: Uuid,
        preference_id: Uuid,
        payload: UpdatePreferencePayload,
    ) -> Result<AlertPreference> {
        let preferences = self.store.get_preferences(user_id).await?;
        let mut preference = preferences
            .into_iter()
            .find(|p| p.id == preference_id)
            .ok_or_else(|| {
                AlertError::NotFound(format!("preference {} not found", preference_id))
            })?;

        if let Some(name) = payload.name {
            preference.name = name;
        }
        if let Some(active) = payload.active {
            preference.active = active;
        }
        if let Some(alert_types) = payload.alert_types {
            preference.alert_types = alert_types;
        }
        if let Some(channels) = payload.channels {
            preference.channels = channels;
        }
        if let Some(frequency) = payload.frequency {
            preference.frequency = frequency;
        }
        if let Some(smart_filtering) = payload.smart_filtering {
            preference.smart_filtering = smart_filtering;
        }
        if let Some(quiet_hours) = payload.quiet_hours {
            preference.quiet_hours = Some(quiet_hours);
        }
        preference.updated_at = Utc::now();

        preference.validate().map_err(AlertError::Validation)?;
        self.store.update_preference(user_id, &preference).await?;
        Ok(preference)
    }

    pub async fn delete_preference(&self, user_id: Uuid, preference_id: Uuid) -> Result<()> {
        self.store.delete_preference(user_id, preference_id).await?;
        info!(user_id = %user_id, preference_id = %preference_id, "Deleted preference");
        Ok(())
    }

    /// Permissive default preference: every alert type enabled at the
    /// lowest delivery floor, in-app and email channels, immediate delivery.
    pub fn default_preference(user_id: Uuid) -> AlertPreference {
        let now = Utc::now();
        let alert_types = [
            AlertType::BillStatusChange,
            AlertType::NewComment,
            AlertType::Amendment,
            AlertType::VoteScheduled,
            AlertType::SponsorUpdate,
            AlertType::EngagementMilestone,
        ]
        .into_iter()
        .map(|alert_type| crate::models::AlertTypeConfig {
            alert_type,
            enabled: true,
            priority: AlertPriority::Low,
            conditions: None,
        })
        .collect();

        AlertPreference {
            id: Uuid::new_v4(),
            user_id,
            name: "Default alerts".to_string(),
            active: true,
            alert_types,
            channels: vec![
                AlertChannel {
                    channel_type: crate::models::ChannelType::InApp,
                    enabled: true,
                    config: ChannelConfig::default(),
                    tier: ChannelTier::Normal,
                    quiet_hours: None,
                },
                AlertChannel {
                    channel_type: crate::models::ChannelType::Email,
                    enabled: true,
                    config: ChannelConfig::default(),
                    tier: ChannelTier::Normal,
                    quiet_hours: None,
                },
            ],
            frequency: FrequencyConfig::immediate(),
            smart_filtering: SmartFilteringConfig::default(),
            quiet_hours: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Flatten a user's preference set into the view the filter consumes.
    ///
    /// Toggles and channels are unioned across active preferences (any
    /// active preference enabling a type or channel enables it), the
    /// delivery floor is the lowest configured floor, and smart filtering
    /// settings come from the first active preference.
    pub fn resolve(user_id: Uuid, preferences: &[AlertPreference]) -> ResolvedPreferences {
        let active: Vec<&AlertPreference> =
            preferences.iter().filter(|p| p.active).collect();
        if active.is_empty() {
            let mut resolved = ResolvedPreferences::default_for_user(user_id);
            resolved.enabled = false;
            return resolved;
        }

        let mut resolved = ResolvedPreferences::default_for_user(user_id);
        resolved.bill_updates_enabled = false;
        resolved.comments_enabled = false;
        resolved.amendments_enabled = false;
        resolved.votes_enabled = false;
        resolved.sponsors_enabled = false;
        resolved.milestones_enabled = false;
        resolved.channels = ChannelFlags {
            in_app: false,
            push: false,
            email: false,
            sms: false,
            webhook: false,
        };

        let mut min_floor: Option<AlertPriority> = None;

        for preference in &active {
            for config in preference.alert_types.iter().filter(|t| t.enabled) {
                match config.alert_type.tracking_category() {
                    Some(crate::models::TrackingCategory::BillUpdates) => {
                        resolved.bill_updates_enabled = true;
                    }
                    Some(crate::models::TrackingCategory::Comments) => {
                        resolved.comments_enabled = true;
                    }
                    Some(crate::models::TrackingCategory::Amendments) => {
                        resolved.amendments_enabled = true;
                    }
                    Some(crate::models::TrackingCategory::Votes) => {
                        resolved.votes_enabled = true;
                    }
                    Some(crate::models::TrackingCategory::Sponsors) => {
                        resolved.sponsors_enabled = true;
                    }
                    Some(crate::models::TrackingCategory::Milestones) => {
                        resolved.milestones_enabled = true;
                    }
                    None => {}
                }

                min_floor = Some(match min_floor {
                    Some(current) if current <= config.priority => current,
                    _ => config.priority,
                });

                if let Some(conditions) = &config.conditions {
                    for category in &conditions.categories {
                        if !resolved.category_filters.contains(category) {
                            resolved.category_filters.push(category.clone());
                        }
                    }
                    for keyword in &conditions.keywords {
                        if !resolved.keyword_filters.contains(keyword) {
                            resolved.keyword_filters.push(keyword.clone());
                        }
                    }
                    for sponsor in &conditions.sponsor_ids {
                        if !resolved.sponsor_filters.contains(sponsor) {
                            resolved.sponsor_filters.push(sponsor.clone());
                        }
                    }
                }
            }

            for channel in preference.enabled_channels() {
                match channel.channel_type {
                    crate::models::ChannelType::InApp => resolved.channels.in_app = true,
                    crate::models::ChannelType::Push => resolved.channels.push = true,
                    crate::models::ChannelType::Email => resolved.channels.email = true,
                    crate::models::ChannelType::Sms => resolved.channels.sms = true,
                    crate::models::ChannelType::Webhook => resolved.channels.webhook = true,
                }
            }

            if resolved.quiet_hours.is_none() {
                resolved.quiet_hours = preference.quiet_hours.clone();
            }
        }

        resolved.min_priority = min_floor;
        resolved.smart_filtering = active[0].smart_filtering.clone();
        resolved.frequency = if active
            .iter()
            .any(|p| p.frequency.frequency == FrequencyType::Immediate)
        {
            FrequencyType::Immediate
        } else {
            FrequencyType::Batched
        };

        resolved
    }
}
