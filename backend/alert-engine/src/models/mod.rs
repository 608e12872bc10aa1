use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Alert type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Bill moved to a new stage
    BillStatusChange,
    /// New comment on a tracked bill
    NewComment,
    /// Amendment filed against a tracked bill
    Amendment,
    /// Floor or committee vote scheduled
    VoteScheduled,
    /// Update from a tracked sponsor
    SponsorUpdate,
    /// Engagement milestone reached on a tracked bill
    EngagementMilestone,
    /// System notification
    System,
    /// Account verification notification
    Verification,
    /// Periodic digest
    Digest,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::BillStatusChange => "bill_status_change",
            AlertType::NewComment => "new_comment",
            AlertType::Amendment => "amendment",
            AlertType::VoteScheduled => "vote_scheduled",
            AlertType::SponsorUpdate => "sponsor_update",
            AlertType::EngagementMilestone => "engagement_milestone",
            AlertType::System => "system",
            AlertType::Verification => "verification",
            AlertType::Digest => "digest",
        }
    }

    pub fn parse(s: &str) -> AlertType {
        match s.to_lowercase().as_str() {
            "bill_status_change" => AlertType::BillStatusChange,
            "new_comment" => AlertType::NewComment,
            "amendment" => AlertType::Amendment,
            "vote_scheduled" => AlertType::VoteScheduled,
            "sponsor_update" => AlertType::SponsorUpdate,
            "engagement_milestone" => AlertType::EngagementMilestone,
            "verification" => AlertType::Verification,
            "digest" => AlertType::Digest,
            _ => AlertType::System,
        }
    }

    /// Tracking category this type maps to for per-type enablement.
    /// System, verification and digest alerts have no category and are
    /// implicitly enabled.
    pub fn tracking_category(&self) -> Option<TrackingCategory> {
        match self {
            AlertType::BillStatusChange => Some(TrackingCategory::BillUpdates),
            AlertType::NewComment => Some(TrackingCategory::Comments),
            AlertType::Amendment => Some(TrackingCategory::Amendments),
            AlertType::VoteScheduled => Some(TrackingCategory::Votes),
            AlertType::SponsorUpdate => Some(TrackingCategory::Sponsors),
            AlertType::EngagementMilestone => Some(TrackingCategory::Milestones),
            AlertType::System | AlertType::Verification | AlertType::Digest => None,
        }
    }
}

/// Tracking category used for per-type enablement toggles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrackingCategory {
    BillUpdates,
    Comments,
    Amendments,
    Votes,
    Sponsors,
    Milestones,
}

impl TrackingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingCategory::BillUpdates => "bill_updates",
            TrackingCategory::Comments => "comments",
            TrackingCategory::Amendments => "amendments",
            TrackingCategory::Votes => "votes",
            TrackingCategory::Sponsors => "sponsors",
            TrackingCategory::Milestones => "milestones",
        }
    }
}

/// Alert priority level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    /// Low priority (batch-friendly)
    Low,
    /// Normal priority (standard delivery)
    Normal,
    /// High priority (prompt delivery)
    High,
    /// Urgent priority (bypasses relevance filtering and batching)
    Urgent,
}

impl AlertPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertPriority::Low => "low",
            AlertPriority::Normal => "normal",
            AlertPriority::High => "high",
            AlertPriority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> AlertPriority {
        match s.to_lowercase().as_str() {
            "low" => AlertPriority::Low,
            "high" => AlertPriority::High,
            "urgent" => AlertPriority::Urgent,
            _ => AlertPriority::Normal,
        }
    }

    /// Numeric rank: low=1 .. urgent=4
    pub fn rank(&self) -> u8 {
        match self {
            AlertPriority::Low => 1,
            AlertPriority::Normal => 2,
            AlertPriority::High => 3,
            AlertPriority::Urgent => 4,
        }
    }
}

/// Delivery channel type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    InApp,
    Email,
    Push,
    Sms,
    Webhook,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::InApp => "in_app",
            ChannelType::Email => "email",
            ChannelType::Push => "push",
            ChannelType::Sms => "sms",
            ChannelType::Webhook => "webhook",
        }
    }

    pub fn parse(s: &str) -> ChannelType {
        match s.to_lowercase().as_str() {
            "email" => ChannelType::Email,
            "push" => ChannelType::Push,
            "sms" => ChannelType::Sms,
            "webhook" => ChannelType::Webhook,
            _ => ChannelType::InApp,
        }
    }
}

/// Priority tier assigned to a configured channel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelTier {
    Low,
    Normal,
    High,
}

/// Delivery status for an alert delivery log entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Filtered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Filtered => "filtered",
        }
    }

    pub fn parse(s: &str) -> DeliveryStatus {
        match s.to_lowercase().as_str() {
            "sent" => DeliveryStatus::Sent,
            "delivered" => DeliveryStatus::Delivered,
            "failed" => DeliveryStatus::Failed,
            "filtered" => DeliveryStatus::Filtered,
            _ => DeliveryStatus::Pending,
        }
    }
}

/// Overall engagement level derived from interaction history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
}

/// Delivery frequency mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyType {
    Immediate,
    Batched,
}

/// Batching interval for batched frequency
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatchInterval {
    Hourly,
    Daily,
    Weekly,
}

/// Delivery frequency configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrequencyConfig {
    pub frequency: FrequencyType,

    /// Required when frequency is batched
    pub batch_interval: Option<BatchInterval>,

    /// Time of day ("HH:MM") for daily/weekly batches
    pub batch_time: Option<String>,

    /// Day of week (0 = Monday) for weekly batches
    pub batch_day: Option<u8>,
}

impl FrequencyConfig {
    pub fn immediate() -> Self {
        Self {
            frequency: FrequencyType::Immediate,
            batch_interval: None,
            batch_time: None,
            batch_day: None,
        }
    }
}

/// Quiet hours window (time-of-day, possibly spanning midnight)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuietHours {
    /// Window start, "HH:MM"
    pub start: String,
    /// Window end, "HH:MM"
    pub end: String,
    /// Offset from UTC in minutes for the user's timezone
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl QuietHours {
    /// Parse "HH:MM" into minutes of day
    pub fn parse_minutes(s: &str) -> Option<u32> {
        let (h, m) = s.split_once(':')?;
        let h: u32 = h.parse().ok()?;
        let m: u32 = m.parse().ok()?;
        if h > 23 || m > 59 {
            return None;
        }
        Some(h * 60 + m)
    }

    /// Local minutes-of-day for an instant, applying the configured offset
    pub fn local_minutes(&self, now: DateTime<Utc>) -> u32 {
        let utc_minutes = (now.hour() * 60 + now.minute()) as i32;
        (utc_minutes + self.utc_offset_minutes).rem_euclid(1440) as u32
    }

    /// Whether the instant falls inside the window. A start greater than the
    /// end means the window spans midnight and covers the union of
    /// [start, 24:00) and [00:00, end).
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let (start, end) = match (Self::parse_minutes(&self.start), Self::parse_minutes(&self.end))
        {
            (Some(s), Some(e)) => (s, e),
            // Unparseable window never suppresses
            _ => return false,
        };
        let minutes = self.local_minutes(now);

        if start <= end {
            minutes >= start && minutes < end
        } else {
            minutes >= start || minutes < end
        }
    }
}

/// Channel-specific delivery configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    /// Email address or phone number
    pub address: Option<String>,
    /// Push token
    pub token: Option<String>,
    /// Webhook URL
    pub url: Option<String>,
    /// Whether the destination has been verified
    #[serde(default)]
    pub verified: bool,
}

/// A configured delivery channel inside a preference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertChannel {
    pub channel_type: ChannelType,
    pub enabled: bool,
    #[serde(default)]
    pub config: ChannelConfig,
    pub tier: ChannelTier,
    /// Channel-level quiet hours, evaluated at channel selection time
    pub quiet_hours: Option<QuietHours>,
}

/// Optional predicate set attached to an alert type.
/// A condition set with no predicates always matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlertConditions {
    /// Category allowlist
    #[serde(default)]
    pub categories: Vec<String>,
    /// Status allowlist
    #[serde(default)]
    pub statuses: Vec<String>,
    /// Sponsor allowlist (ids or exact names)
    #[serde(default)]
    pub sponsor_ids: Vec<String>,
    /// Keyword list, substring-matched case-insensitively
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Minimum engagement count on the subject entity
    pub min_engagement: Option<u32>,
}

impl AlertConditions {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
            && self.statuses.is_empty()
            && self.sponsor_ids.is_empty()
            && self.keywords.is_empty()
            && self.min_engagement.is_none()
    }
}

/// Per-type configuration inside a preference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertTypeConfig {
    pub alert_type: AlertType,
    pub enabled: bool,
    /// Delivery floor: alerts below this priority are dropped for this type
    pub priority: AlertPriority,
    pub conditions: Option<AlertConditions>,
}

/// Smart filtering configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmartFilteringConfig {
    pub enabled: bool,

    /// Relevance signal weights, must sum to <= 1.0
    pub interest_weight: f64,
    pub engagement_weight: f64,
    pub trending_weight: f64,

    #[serde(default)]
    pub duplicate_detection: bool,
    #[serde(default)]
    pub spam_detection: bool,

    /// Aggregate confidence below this blocks (urgent bypasses)
    pub minimum_confidence: f64,

    /// Enables the interest-based relevance check
    #[serde(default)]
    pub interest_filtering: bool,
}

impl Default for SmartFilteringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interest_weight: 0.4,
            engagement_weight: 0.4,
            trending_weight: 0.2,
            duplicate_detection: true,
            spam_detection: true,
            minimum_confidence: 0.3,
            interest_filtering: false,
        }
    }
}

/// A named, user-owned alert preference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertPreference {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub active: bool,
    pub alert_types: Vec<AlertTypeConfig>,
    pub channels: Vec<AlertChannel>,
    pub frequency: FrequencyConfig,
    pub smart_filtering: SmartFilteringConfig,
    /// Preference-level quiet hours, evaluated before any relevance check
    pub quiet_hours: Option<QuietHours>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertPreference {
    /// Validate preference invariants. Returns the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("preference name must not be empty".to_string());
        }
        if self.alert_types.is_empty() {
            return Err("at least one alert type must be configured".to_string());
        }
        if self.channels.is_empty() {
            return Err("at least one channel must be configured".to_string());
        }

        let sf = &self.smart_filtering;
        let weight_sum = sf.interest_weight + sf.engagement_weight + sf.trending_weight;
        if weight_sum > 1.0 + f64::EPSILON {
            return Err(format!(
                "smart filtering weights must sum to <= 1.0 (got {:.2})",
                weight_sum
            ));
        }
        if !(0.0..=1.0).contains(&sf.minimum_confidence) {
            return Err("minimum confidence must be within [0, 1]".to_string());
        }

        if self.frequency.frequency == FrequencyType::Batched {
            match self.frequency.batch_interval {
                None => return Err("batched frequency requires a batch interval".to_string()),
                Some(BatchInterval::Daily) | Some(BatchInterval::Weekly)
                    if self.frequency.batch_time.is_none() =>
                {
                    return Err("daily/weekly batching requires a batch time".to_string());
                }
                _ => {}
            }
        }

        for window in self
            .quiet_hours
            .iter()
            .chain(self.channels.iter().filter_map(|c| c.quiet_hours.as_ref()))
        {
            if QuietHours::parse_minutes(&window.start).is_none()
                || QuietHours::parse_minutes(&window.end).is_none()
            {
                return Err(format!(
                    "invalid quiet hours window {}-{}",
                    window.start, window.end
                ));
            }
        }

        Ok(())
    }

    /// Enabled channels in configured order
    pub fn enabled_channels(&self) -> Vec<&AlertChannel> {
        self.channels.iter().filter(|c| c.enabled).collect()
    }

    /// Config entry for an alert type, if any
    pub fn type_config(&self, alert_type: AlertType) -> Option<&AlertTypeConfig> {
        self.alert_types.iter().find(|t| t.alert_type == alert_type)
    }
}

/// Partial update payload for a preference
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePreferencePayload {
    pub name: Option<String>,
    pub active: Option<bool>,
    pub alert_types: Option<Vec<AlertTypeConfig>>,
    pub channels: Option<Vec<AlertChannel>>,
    pub frequency: Option<FrequencyConfig>,
    pub smart_filtering: Option<SmartFilteringConfig>,
    pub quiet_hours: Option<QuietHours>,
}

/// Per-user channel enablement flags used by the channel recommender
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelFlags {
    pub in_app: bool,
    pub push: bool,
    pub email: bool,
    pub sms: bool,
    pub webhook: bool,
}

impl ChannelFlags {
    pub fn is_enabled(&self, channel: ChannelType) -> bool {
        match channel {
            ChannelType::InApp => self.in_app,
            ChannelType::Push => self.push,
            ChannelType::Email => self.email,
            ChannelType::Sms => self.sms,
            ChannelType::Webhook => self.webhook,
        }
    }

    /// Enabled channels in recommender precedence order
    pub fn enabled(&self) -> Vec<ChannelType> {
        let mut out = Vec::new();
        if self.in_app {
            out.push(ChannelType::InApp);
        }
        if self.push {
            out.push(ChannelType::Push);
        }
        if self.email {
            out.push(ChannelType::Email);
        }
        if self.sms {
            out.push(ChannelType::Sms);
        }
        if self.webhook {
            out.push(ChannelType::Webhook);
        }
        out
    }
}

/// Caller-resolved merge of a user's preferences, consumed by the
/// check battery and the channel recommender
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedPreferences {
    pub user_id: Uuid,

    /// Master switch
    pub enabled: bool,

    /// Per-tracking-category toggles
    pub bill_updates_enabled: bool,
    pub comments_enabled: bool,
    pub amendments_enabled: bool,
    pub votes_enabled: bool,
    pub sponsors_enabled: bool,
    pub milestones_enabled: bool,

    /// Preference-level quiet hours
    pub quiet_hours: Option<QuietHours>,

    /// Delivery floor across matching type configs
    pub min_priority: Option<AlertPriority>,

    /// Explicit filter lists; empty means "no explicit filter configured"
    pub category_filters: Vec<String>,
    pub keyword_filters: Vec<String>,
    pub sponsor_filters: Vec<String>,
    pub tag_filters: Vec<String>,

    pub channels: ChannelFlags,
    pub smart_filtering: SmartFilteringConfig,
    pub frequency: FrequencyType,
}

impl ResolvedPreferences {
    /// Permissive default: everything on, in-app + email, immediate delivery
    pub fn default_for_user(user_id: Uuid) -> Self {
        Self {
            user_id,
            enabled: true,
            bill_updates_enabled: true,
            comments_enabled: true,
            amendments_enabled: true,
            votes_enabled: true,
            sponsors_enabled: true,
            milestones_enabled: true,
            quiet_hours: None,
            min_priority: None,
            category_filters: Vec::new(),
            keyword_filters: Vec::new(),
            sponsor_filters: Vec::new(),
            tag_filters: Vec::new(),
            channels: ChannelFlags {
                in_app: true,
                push: false,
                email: true,
                sms: false,
                webhook: false,
            },
            smart_filtering: SmartFilteringConfig::default(),
            frequency: FrequencyType::Immediate,
        }
    }

    pub fn category_enabled(&self, category: TrackingCategory) -> bool {
        match category {
            TrackingCategory::BillUpdates => self.bill_updates_enabled,
            TrackingCategory::Comments => self.comments_enabled,
            TrackingCategory::Amendments => self.amendments_enabled,
            TrackingCategory::Votes => self.votes_enabled,
            TrackingCategory::Sponsors => self.sponsors_enabled,
            TrackingCategory::Milestones => self.milestones_enabled,
        }
    }
}

/// Input to a single filter evaluation. Constructed per call, never persisted.
#[derive(Debug, Clone)]
pub struct FilterCriteria {
    pub user_id: Uuid,
    pub bill_id: Option<Uuid>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub sponsor: Option<String>,
    pub priority: AlertPriority,
    pub notification_type: AlertType,
    pub subtype: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub preferences: ResolvedPreferences,
}

impl FilterCriteria {
    /// Concatenated searchable text (title + message)
    pub fn content_text(&self) -> String {
        let mut text = String::new();
        if let Some(title) = &self.title {
            text.push_str(title);
        }
        if let Some(message) = &self.message {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(message);
        }
        text
    }
}

/// Output of the filter combiner, returned synchronously to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    pub should_notify: bool,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Never empty when blocked
    pub reasons: Vec<String>,
    pub suggested_priority: AlertPriority,
    pub recommended_channels: Vec<ChannelType>,
    pub should_batch: bool,
}

/// An item scored by the engagement profile builder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredItem {
    pub name: String,
    pub score: f64,
}

/// Per-user derived relevance summary. Cached with a long TTL and rebuilt
/// from raw engagement history; staleness of minutes to a day is acceptable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEngagementProfile {
    pub user_id: Uuid,
    pub top_categories: Vec<ScoredItem>,
    pub top_sponsors: Vec<ScoredItem>,
    pub top_tags: Vec<ScoredItem>,
    pub engagement_level: EngagementLevel,
    pub built_at: DateTime<Utc>,
}

impl UserEngagementProfile {
    /// Neutral profile used when history is unavailable
    pub fn neutral(user_id: Uuid) -> Self {
        Self {
            user_id,
            top_categories: Vec::new(),
            top_sponsors: Vec::new(),
            top_tags: Vec::new(),
            engagement_level: EngagementLevel::Low,
            built_at: Utc::now(),
        }
    }

    pub fn category_score(&self, name: &str) -> Option<f64> {
        score_for(&self.top_categories, name)
    }

    pub fn sponsor_score(&self, name: &str) -> Option<f64> {
        score_for(&self.top_sponsors, name)
    }

    pub fn tag_score(&self, name: &str) -> Option<f64> {
        score_for(&self.top_tags, name)
    }
}

fn score_for(items: &[ScoredItem], name: &str) -> Option<f64> {
    items
        .iter()
        .find(|item| item.name.eq_ignore_ascii_case(name))
        .map(|item| item.score)
}

/// A raw engagement history record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub entity_id: Uuid,
    pub score: f64,
    pub last_engaged: DateTime<Utc>,
    pub category: Option<String>,
    pub sponsor: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Metadata carried on every delivery log entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryMetadata {
    pub original_priority: Option<AlertPriority>,
    pub adjusted_priority: Option<AlertPriority>,
    pub filter_reason: Option<String>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub related_ids: Vec<Uuid>,
}

/// Immutable audit record of a delivery attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDeliveryLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub preference_id: Option<Uuid>,
    pub alert_type: AlertType,
    /// Channels attempted
    pub channels: Vec<ChannelType>,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub failure_reason: Option<String>,
    pub metadata: DeliveryMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Typed alert payload, tagged by alert type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertData {
    BillStatusChange {
        bill_id: Uuid,
        bill_title: String,
        category: Option<String>,
        status: String,
        summary: Option<String>,
    },
    NewComment {
        bill_id: Uuid,
        bill_title: String,
        category: Option<String>,
        author: String,
        comment_text: String,
        engagement_count: Option<u32>,
    },
    Amendment {
        bill_id: Uuid,
        bill_title: String,
        category: Option<String>,
        description: String,
    },
    VoteScheduled {
        bill_id: Uuid,
        bill_title: String,
        category: Option<String>,
        scheduled_for: DateTime<Utc>,
    },
    SponsorUpdate {
        sponsor_id: String,
        sponsor_name: String,
        bill_id: Option<Uuid>,
        category: Option<String>,
        update: String,
    },
    EngagementMilestone {
        bill_id: Uuid,
        bill_title: String,
        category: Option<String>,
        engagement_count: u32,
        milestone: String,
    },
    System { title: String, message: String },
    Verification { title: String, message: String },
    Digest { title: String, message: String },
}

impl AlertData {
    pub fn alert_type(&self) -> AlertType {
        match self {
            AlertData::BillStatusChange { .. } => AlertType::BillStatusChange,
            AlertData::NewComment { .. } => AlertType::NewComment,
            AlertData::Amendment { .. } => AlertType::Amendment,
            AlertData::VoteScheduled { .. } => AlertType::VoteScheduled,
            AlertData::SponsorUpdate { .. } => AlertType::SponsorUpdate,
            AlertData::EngagementMilestone { .. } => AlertType::EngagementMilestone,
            AlertData::System { .. } => AlertType::System,
            AlertData::Verification { .. } => AlertType::Verification,
            AlertData::Digest { .. } => AlertType::Digest,
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            AlertData::BillStatusChange { category, .. }
            | AlertData::NewComment { category, .. }
            | AlertData::Amendment { category, .. }
            | AlertData::VoteScheduled { category, .. }
            | AlertData::SponsorUpdate { category, .. }
            | AlertData::EngagementMilestone { category, .. } => category.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<&str> {
        match self {
            AlertData::BillStatusChange { status, .. } => Some(status),
            _ => None,
        }
    }

    pub fn sponsor_id(&self) -> Option<&str> {
        match self {
            AlertData::SponsorUpdate { sponsor_id, .. } => Some(sponsor_id),
            _ => None,
        }
    }

    pub fn sponsor_name(&self) -> Option<&str> {
        match self {
            AlertData::SponsorUpdate { sponsor_name, .. } => Some(sponsor_name),
            _ => None,
        }
    }

    pub fn bill_id(&self) -> Option<Uuid> {
        match self {
            AlertData::BillStatusChange { bill_id, .. }
            | AlertData::NewComment { bill_id, .. }
            | AlertData::Amendment { bill_id, .. }
            | AlertData::VoteScheduled { bill_id, .. }
            | AlertData::EngagementMilestone { bill_id, .. } => Some(*bill_id),
            AlertData::SponsorUpdate { bill_id, .. } => *bill_id,
            _ => None,
        }
    }

    pub fn engagement_count(&self) -> Option<u32> {
        match self {
            AlertData::NewComment {
                engagement_count, ..
            } => *engagement_count,
            AlertData::EngagementMilestone {
                engagement_count, ..
            } => Some(*engagement_count),
            _ => None,
        }
    }

    /// Notification title for rendering
    pub fn title(&self) -> String {
        match self {
            AlertData::BillStatusChange {
                bill_title, status, ..
            } => format!("{}: {}", bill_title, status),
            AlertData::NewComment { bill_title, .. } => {
                format!("New comment on {}", bill_title)
            }
            AlertData::Amendment { bill_title, .. } => {
                format!("Amendment filed: {}", bill_title)
            }
            AlertData::VoteScheduled { bill_title, .. } => {
                format!("Vote scheduled: {}", bill_title)
            }
            AlertData::SponsorUpdate { sponsor_name, .. } => {
                format!("Update from {}", sponsor_name)
            }
            AlertData::EngagementMilestone {
                bill_title,
                milestone,
                ..
            } => format!("{} reached {}", bill_title, milestone),
            AlertData::System { title, .. }
            | AlertData::Verification { title, .. }
            | AlertData::Digest { title, .. } => title.clone(),
        }
    }

    /// Notification body for rendering
    pub fn body(&self) -> String {
        match self {
            AlertData::BillStatusChange { summary, .. } => {
                summary.clone().unwrap_or_default()
            }
            AlertData::NewComment {
                author,
                comment_text,
                ..
            } => format!("{}: {}", author, comment_text),
            AlertData::Amendment { description, .. } => description.clone(),
            AlertData::VoteScheduled { scheduled_for, .. } => {
                format!("Scheduled for {}", scheduled_for.to_rfc3339())
            }
            AlertData::SponsorUpdate { update, .. } => update.clone(),
            AlertData::EngagementMilestone {
                engagement_count, ..
            } => format!("{} engagements", engagement_count),
            AlertData::System { message, .. }
            | AlertData::Verification { message, .. }
            | AlertData::Digest { message, .. } => message.clone(),
        }
    }

    /// Searchable text for keyword condition matching
    pub fn text(&self) -> String {
        format!("{} {}", self.title(), self.body())
    }
}

/// Content handed to a channel transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

impl NotificationContent {
    pub fn from_alert(data: &AlertData) -> Self {
        Self {
            title: data.title(),
            message: data.body(),
            metadata: serde_json::to_value(data).ok(),
        }
    }
}

/// Per-channel transport outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDeliveryResult {
    pub success: bool,
    pub channel: ChannelType,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// Caller-facing result of a single delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// True when at least one channel succeeded
    pub sent: bool,
    /// Channels that actually succeeded
    pub channels: Vec<ChannelType>,
    pub filtered_out: bool,
    pub filter_reasons: Vec<String>,
    /// In-app notification id when that channel delivered
    pub notification_id: Option<String>,
}

/// Template for a bulk send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertTemplate {
    pub data: AlertData,
    pub priority: AlertPriority,
}

/// Per-recipient entry in a bulk result, in input order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRecipientResult {
    pub user_id: Uuid,
    pub sent: bool,
    pub filtered_out: bool,
    pub error: Option<String>,
}

/// Aggregate result of a bulk send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BulkRecipientResult>,
}

/// Query over a user's delivery log
#[derive(Debug, Clone, Default)]
pub struct DeliveryLogQuery {
    pub alert_type: Option<AlertType>,
    pub status: Option<DeliveryStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// 1-based page number
    pub page: u32,
    /// Page size, capped at 100
    pub limit: u32,
}

/// One page of delivery log entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLogPage {
    pub logs: Vec<AlertDeliveryLog>,
    pub total: u64,
    pub page: u32,
    pub page_count: u32,
}

/// Aggregated delivery statistics for a user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub total: u64,
    pub by_status: HashMap<String, u64>,
    pub by_channel: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_preference() -> AlertPreference {
        AlertPreference {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Tracked bills".to_string(),
            active: true,
            alert_types: vec![AlertTypeConfig {
                alert_type: AlertType::BillStatusChange,
                enabled: true,
                priority: AlertPriority::Low,
                conditions: None,
            }],
            channels: vec![AlertChannel {
                channel_type: ChannelType::InApp,
                enabled: true,
                config: ChannelConfig::default(),
                tier: ChannelTier::Normal,
                quiet_hours: None,
            }],
            frequency: FrequencyConfig::immediate(),
            smart_filtering: SmartFilteringConfig::default(),
            quiet_hours: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_priority_rank_ordering() {
        assert_eq!(AlertPriority::Low.rank(), 1);
        assert_eq!(AlertPriority::Urgent.rank(), 4);
        assert!(AlertPriority::Urgent > AlertPriority::High);
        assert!(AlertPriority::Normal > AlertPriority::Low);
    }

    #[test]
    fn test_alert_type_parse_roundtrip() {
        for alert_type in [
            AlertType::BillStatusChange,
            AlertType::NewComment,
            AlertType::Amendment,
            AlertType::VoteScheduled,
            AlertType::SponsorUpdate,
            AlertType::EngagementMilestone,
            AlertType::System,
            AlertType::Verification,
            AlertType::Digest,
        ] {
            assert_eq!(AlertType::parse(alert_type.as_str()), alert_type);
        }
        assert_eq!(AlertType::parse("unknown"), AlertType::System);
    }

    #[test]
    fn test_tracking_category_mapping() {
        assert_eq!(
            AlertType::BillStatusChange.tracking_category(),
            Some(TrackingCategory::BillUpdates)
        );
        assert_eq!(AlertType::System.tracking_category(), None);
        assert_eq!(AlertType::Digest.tracking_category(), None);
    }

    #[test]
    fn test_quiet_hours_same_day_window() {
        let window = QuietHours {
            start: "09:00".to_string(),
            end: "17:00".to_string(),
            utc_offset_minutes: 0,
        };
        let at_noon = Utc::now().date_naive().and_hms_opt(12, 0, 0).unwrap().and_utc();
        let at_23 = Utc::now().date_naive().and_hms_opt(23, 0, 0).unwrap().and_utc();

        assert!(window.contains(at_noon));
        assert!(!window.contains(at_23));
    }

    #[test]
    fn test_quiet_hours_midnight_spanning_window() {
        let window = QuietHours {
            start: "22:00".to_string(),
            end: "08:00".to_string(),
            utc_offset_minutes: 0,
        };
        let at_23 = Utc::now().date_naive().and_hms_opt(23, 0, 0).unwrap().and_utc();
        let at_3 = Utc::now().date_naive().and_hms_opt(3, 0, 0).unwrap().and_utc();
        let at_noon = Utc::now().date_naive().and_hms_opt(12, 0, 0).unwrap().and_utc();

        assert!(window.contains(at_23));
        assert!(window.contains(at_3));
        assert!(!window.contains(at_noon));
    }

    #[test]
    fn test_quiet_hours_offset() {
        // 23:00 UTC is 01:00 local at +120 minutes
        let window = QuietHours {
            start: "00:00".to_string(),
            end: "02:00".to_string(),
            utc_offset_minutes: 120,
        };
        let at_23 = Utc::now().date_naive().and_hms_opt(23, 0, 0).unwrap().and_utc();
        assert!(window.contains(at_23));
    }

    #[test]
    fn test_preference_validation_ok() {
        assert!(minimal_preference().validate().is_ok());
    }

    #[test]
    fn test_preference_validation_requires_types_and_channels() {
        let mut pref = minimal_preference();
        pref.alert_types.clear();
        assert!(pref.validate().is_err());

        let mut pref = minimal_preference();
        pref.channels.clear();
        assert!(pref.validate().is_err());
    }

    #[test]
    fn test_preference_validation_weight_sum() {
        let mut pref = minimal_preference();
        pref.smart_filtering.interest_weight = 0.6;
        pref.smart_filtering.engagement_weight = 0.6;
        assert!(pref.validate().is_err());
    }

    #[test]
    fn test_preference_validation_batch_interval() {
        let mut pref = minimal_preference();
        pref.frequency = FrequencyConfig {
            frequency: FrequencyType::Batched,
            batch_interval: None,
            batch_time: None,
            batch_day: None,
        };
        assert!(pref.validate().is_err());

        pref.frequency.batch_interval = Some(BatchInterval::Daily);
        assert!(pref.validate().is_err());

        pref.frequency.batch_time = Some("08:00".to_string());
        assert!(pref.validate().is_ok());
    }

    #[test]
    fn test_conditions_is_empty() {
        assert!(AlertConditions::default().is_empty());
        let conditions = AlertConditions {
            categories: vec!["healthcare".to_string()],
            ..Default::default()
        };
        assert!(!conditions.is_empty());
    }

    #[test]
    fn test_alert_data_accessors() {
        let data = AlertData::BillStatusChange {
            bill_id: Uuid::new_v4(),
            bill_title: "HB 101".to_string(),
            category: Some("healthcare".to_string()),
            status: "passed_committee".to_string(),
            summary: Some("Moved out of committee".to_string()),
        };
        assert_eq!(data.alert_type(), AlertType::BillStatusChange);
        assert_eq!(data.category(), Some("healthcare"));
        assert_eq!(data.status(), Some("passed_committee"));
        assert!(data.text().contains("HB 101"));
    }

    #[test]
    fn test_channel_flags_enabled_order() {
        let flags = ChannelFlags {
            in_app: true,
            push: false,
            email: true,
            sms: true,
            webhook: false,
        };
        assert_eq!(
            flags.enabled(),
            vec![ChannelType::InApp, ChannelType::Email, ChannelType::Sms]
        );
    }

    #[test]
    fn test_filter_criteria_content_text() {
        let criteria = FilterCriteria {
            user_id: Uuid::new_v4(),
            bill_id: None,
            category: None,
            tags: Vec::new(),
            sponsor: None,
            priority: AlertPriority::Normal,
            notification_type: AlertType::BillStatusChange,
            subtype: None,
            title: Some("Healthcare bill".to_string()),
            message: Some("advanced to floor vote".to_string()),
            preferences: ResolvedPreferences::default_for_user(Uuid::new_v4()),
        };
        assert_eq!(criteria.content_text(), "Healthcare bill advanced to floor vote");
    }
}
