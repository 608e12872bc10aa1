//! Relevance check battery
//!
//! Each check is a pure function of the criteria (plus the engagement
//! profile where relevant) returning a pass/fail verdict with a confidence
//! and explanation. Mandatory checks (type-enabled, quiet-hours) are
//! evaluated first by the combiner and are never bypassed; the remaining
//! checks are relevance signals that urgent priority may override.

use crate::error::{AlertError, Result};
use crate::models::{FilterCriteria, UserEngagementProfile};
use crate::stores::InterestSource;
use chrono::{DateTime, Utc};

/// Engagement score below which a category is considered irrelevant
const CATEGORY_CUTOFF: f64 = 15.0;
/// Score at which category confidence saturates at 1.0
const CATEGORY_SATURATION: f64 = 50.0;

const SPONSOR_CUTOFF: f64 = 20.0;
const SPONSOR_SATURATION: f64 = 60.0;

const TAG_CUTOFF: f64 = 25.0;
const TAG_SATURATION: f64 = 40.0;

/// Confidence for a pass with no signal on the dimension
const NEUTRAL_CONFIDENCE: f64 = 0.5;
const TAG_NEUTRAL_CONFIDENCE: f64 = 0.4;

/// Verdict of a single relevance check
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub should_notify: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

impl CheckOutcome {
    pub fn pass(confidence: f64) -> Self {
        Self {
            should_notify: true,
            confidence,
            reasons: Vec::new(),
        }
    }

    pub fn pass_with(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            should_notify: true,
            confidence,
            reasons: vec![reason.into()],
        }
    }

    pub fn fail(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            should_notify: false,
            confidence,
            reasons: vec![reason.into()],
        }
    }

    /// Whether the failure expresses a user/product exclusion rather than a
    /// relevance signal. Such failures are never bypassed by urgent priority.
    pub fn is_strict_exclusion(&self) -> bool {
        self.reasons
            .iter()
            .any(|r| r.contains("disabled") || r.contains("quiet hours"))
    }
}

/// Type-enabled check: maps the notification type to its tracking category
/// and fails closed when that category is disabled. Types without a tracking
/// category (system, verification, digest) are implicitly enabled.
pub fn check_type_enabled(criteria: &FilterCriteria) -> CheckOutcome {
    let prefs = &criteria.preferences;

    if !prefs.enabled {
        return CheckOutcome::fail(0.9, "All notifications are disabled");
    }

    match criteria.notification_type.tracking_category() {
        Some(category) if !prefs.category_enabled(category) => CheckOutcome::fail(
            0.9,
            format!("{} notifications are disabled", category.as_str()),
        ),
        _ => CheckOutcome::pass(1.0),
    }
}

/// Quiet-hours check against the preference-level window. Channel-level
/// quiet hours are applied later at channel selection.
pub fn check_quiet_hours(criteria: &FilterCriteria, now: DateTime<Utc>) -> CheckOutcome {
    match &criteria.preferences.quiet_hours {
        Some(window) if window.contains(now) => CheckOutcome::fail(
            0.9,
            format!("Within quiet hours ({}-{})", window.start, window.end),
        ),
        _ => CheckOutcome::pass(1.0),
    }
}

/// Priority-threshold check: the alert's numeric rank must meet the
/// configured delivery floor.
pub fn check_priority_threshold(criteria: &FilterCriteria) -> CheckOutcome {
    match criteria.preferences.min_priority {
        Some(threshold) if criteria.priority.rank() < threshold.rank() => CheckOutcome::fail(
            0.8,
            format!(
                "Priority {} below configured threshold {}",
                criteria.priority.as_str(),
                threshold.as_str()
            ),
        ),
        Some(_) => CheckOutcome::pass(0.7),
        None => CheckOutcome::pass(NEUTRAL_CONFIDENCE),
    }
}

/// Category relevance: an explicit filter list takes precedence; otherwise
/// fall back to the engagement profile's scored categories.
pub fn check_category_relevance(
    criteria: &FilterCriteria,
    profile: &UserEngagementProfile,
) -> CheckOutcome {
    let category = match criteria.category.as_deref() {
        Some(c) => c,
        None => return CheckOutcome::pass(NEUTRAL_CONFIDENCE),
    };

    let filters = &criteria.preferences.category_filters;
    if !filters.is_empty() {
        return if filters.iter().any(|f| f.eq_ignore_ascii_case(category)) {
            CheckOutcome::pass_with(0.9, format!("Category {} matches user filter list", category))
        } else {
            CheckOutcome::fail(
                0.8,
                format!("Category {} blocked by user filter list", category),
            )
        };
    }

    match profile.category_score(category) {
        Some(score) if score >= CATEGORY_CUTOFF => CheckOutcome::pass_with(
            (score / CATEGORY_SATURATION).min(1.0),
            format!("High engagement with {} content", category),
        ),
        Some(_) => CheckOutcome::fail(
            0.6,
            format!("Low engagement with {} content", category),
        ),
        None => CheckOutcome::pass(NEUTRAL_CONFIDENCE),
    }
}

/// Sponsor relevance, same precedence as the category check
pub fn check_sponsor_relevance(
    criteria: &FilterCriteria,
    profile: &UserEngagementProfile,
) -> CheckOutcome {
    let sponsor = match criteria.sponsor.as_deref() {
        Some(s) => s,
        None => return CheckOutcome::pass(NEUTRAL_CONFIDENCE),
    };

    let filters = &criteria.preferences.sponsor_filters;
    if !filters.is_empty() {
        return if filters.iter().any(|f| f.eq_ignore_ascii_case(sponsor)) {
            CheckOutcome::pass_with(0.9, format!("Sponsor {} matches user filter list", sponsor))
        } else {
            CheckOutcome::fail(
                0.8,
                format!("Sponsor {} blocked by user filter list", sponsor),
            )
        };
    }

    match profile.sponsor_score(sponsor) {
        Some(score) if score >= SPONSOR_CUTOFF => CheckOutcome::pass_with(
            (score / SPONSOR_SATURATION).min(1.0),
            format!("High engagement with {}", sponsor),
        ),
        Some(_) => CheckOutcome::fail(0.6, format!("Low engagement with {}", sponsor)),
        None => CheckOutcome::pass(NEUTRAL_CONFIDENCE),
    }
}

/// Tag relevance: best-scoring tag wins; explicit tag filters take precedence
pub fn check_tag_relevance(
    criteria: &FilterCriteria,
    profile: &UserEngagementProfile,
) -> CheckOutcome {
    if criteria.tags.is_empty() {
        return CheckOutcome::pass(TAG_NEUTRAL_CONFIDENCE);
    }

    let filters = &criteria.preferences.tag_filters;
    if !filters.is_empty() {
        let matched = criteria
            .tags
            .iter()
            .find(|tag| filters.iter().any(|f| f.eq_ignore_ascii_case(tag)));
        return match matched {
            Some(tag) => {
                CheckOutcome::pass_with(0.85, format!("Tag {} matches user filter list", tag))
            }
            None => CheckOutcome::fail(0.8, "Tags blocked by user filter list"),
        };
    }

    let best = criteria
        .tags
        .iter()
        .filter_map(|tag| profile.tag_score(tag).map(|score| (tag, score)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    match best {
        Some((tag, score)) if score >= TAG_CUTOFF => CheckOutcome::pass_with(
            (score / TAG_SATURATION).min(1.0),
            format!("High engagement with topic {}", tag),
        ),
        Some(_) => CheckOutcome::fail(0.6, "Low engagement with these topics"),
        None => CheckOutcome::pass(TAG_NEUTRAL_CONFIDENCE),
    }
}

/// Keyword relevance: case-insensitive substring match of configured
/// keywords against title + message. Absent filters pass neutrally.
pub fn check_keyword_relevance(criteria: &FilterCriteria) -> CheckOutcome {
    let keywords = &criteria.preferences.keyword_filters;
    if keywords.is_empty() {
        return CheckOutcome::pass(NEUTRAL_CONFIDENCE);
    }

    let text = criteria.content_text().to_lowercase();
    if text.is_empty() {
        return CheckOutcome::pass(NEUTRAL_CONFIDENCE);
    }

    match keywords
        .iter()
        .find(|keyword| text.contains(&keyword.to_lowercase()))
    {
        Some(keyword) => {
            CheckOutcome::pass_with(0.85, format!("Content matches keyword \"{}\"", keyword))
        }
        None => CheckOutcome::fail(0.7, "No configured keywords matched"),
    }
}

/// Interest-based relevance: only active when interest filtering is enabled
/// and a related entity is present. An exact category/interest match is a
/// high-confidence pass; a definite mismatch is a hard fail (urgent may
/// still bypass it, since the reason names neither "disabled" nor
/// "quiet hours").
pub async fn check_interest_relevance(
    criteria: &FilterCriteria,
    interests: &dyn InterestSource,
) -> Result<Option<CheckOutcome>> {
    if !criteria.preferences.smart_filtering.interest_filtering {
        return Ok(None);
    }
    let entity_id = match criteria.bill_id {
        Some(id) => id,
        None => return Ok(None),
    };

    let declared = interests
        .get_user_interests(criteria.user_id)
        .await
        .map_err(|e| AlertError::FilterEvaluation(e.to_string()))?;
    if declared.is_empty() {
        return Ok(Some(CheckOutcome::pass(NEUTRAL_CONFIDENCE)));
    }

    let entity_category = interests
        .get_entity_category(entity_id)
        .await
        .map_err(|e| AlertError::FilterEvaluation(e.to_string()))?;
    let category = match entity_category {
        Some(c) => c,
        None => return Ok(Some(CheckOutcome::pass(NEUTRAL_CONFIDENCE))),
    };

    if declared.iter().any(|i| i.eq_ignore_ascii_case(&category)) {
        Ok(Some(CheckOutcome::pass_with(
            0.9,
            format!("Matches declared interest {}", category),
        )))
    } else {
        Ok(Some(CheckOutcome::fail(
            0.8,
            "Does not match declared interests",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AlertPriority, AlertType, QuietHours, ResolvedPreferences, ScoredItem,
        UserEngagementProfile,
    };
    use uuid::Uuid;

    fn criteria(prefs: ResolvedPreferences) -> FilterCriteria {
        FilterCriteria {
            user_id: prefs.user_id,
            bill_id: None,
            category: None,
            tags: Vec::new(),
            sponsor: None,
            priority: AlertPriority::Normal,
            notification_type: AlertType::BillStatusChange,
            subtype: None,
            title: None,
            message: None,
            preferences: prefs,
        }
    }

    fn profile_with_category(name: &str, score: f64) -> UserEngagementProfile {
        let mut profile = UserEngagementProfile::neutral(Uuid::new_v4());
        profile.top_categories = vec![ScoredItem {
            name: name.to_string(),
            score,
        }];
        profile
    }

    #[test]
    fn test_type_enabled_fails_closed() {
        let mut prefs = ResolvedPreferences::default_for_user(Uuid::new_v4());
        prefs.bill_updates_enabled = false;
        let outcome = check_type_enabled(&criteria(prefs));
        assert!(!outcome.should_notify);
        assert!(outcome.is_strict_exclusion());
    }

    #[test]
    fn test_type_enabled_system_implicitly_enabled() {
        let mut prefs = ResolvedPreferences::default_for_user(Uuid::new_v4());
        prefs.bill_updates_enabled = false;
        prefs.comments_enabled = false;
        let mut c = criteria(prefs);
        c.notification_type = AlertType::System;
        assert!(check_type_enabled(&c).should_notify);
    }

    #[test]
    fn test_quiet_hours_fail_reason_names_quiet_hours() {
        let mut prefs = ResolvedPreferences::default_for_user(Uuid::new_v4());
        prefs.quiet_hours = Some(QuietHours {
            start: "00:00".to_string(),
            end: "23:59".to_string(),
            utc_offset_minutes: 0,
        });
        let outcome = check_quiet_hours(&criteria(prefs), Utc::now());
        assert!(!outcome.should_notify);
        assert!(outcome.is_strict_exclusion());
    }

    #[test]
    fn test_priority_threshold() {
        let mut prefs = ResolvedPreferences::default_for_user(Uuid::new_v4());
        prefs.min_priority = Some(AlertPriority::High);
        let mut c = criteria(prefs);
        c.priority = AlertPriority::Low;
        assert!(!check_priority_threshold(&c).should_notify);

        c.priority = AlertPriority::Urgent;
        assert!(check_priority_threshold(&c).should_notify);
    }

    #[test]
    fn test_category_filter_list_precedence() {
        let mut prefs = ResolvedPreferences::default_for_user(Uuid::new_v4());
        prefs.category_filters = vec!["education".to_string()];
        let mut c = criteria(prefs);
        c.category = Some("healthcare".to_string());

        // Profile says healthcare is highly relevant, but the explicit list wins
        let profile = profile_with_category("healthcare", 45.0);
        let outcome = check_category_relevance(&c, &profile);
        assert!(!outcome.should_notify);
        assert!(outcome.reasons[0].contains("blocked by user filter list"));
        assert!(!outcome.is_strict_exclusion());
    }

    #[test]
    fn test_category_profile_fallback_scaling() {
        let mut c = criteria(ResolvedPreferences::default_for_user(Uuid::new_v4()));
        c.category = Some("healthcare".to_string());

        let outcome = check_category_relevance(&c, &profile_with_category("healthcare", 45.0));
        assert!(outcome.should_notify);
        assert!((outcome.confidence - 0.9).abs() < 1e-9);

        // Saturates at 1.0
        let outcome = check_category_relevance(&c, &profile_with_category("healthcare", 80.0));
        assert!((outcome.confidence - 1.0).abs() < 1e-9);

        // Below cutoff fails
        let outcome = check_category_relevance(&c, &profile_with_category("healthcare", 5.0));
        assert!(!outcome.should_notify);
    }

    #[test]
    fn test_category_no_data_is_neutral() {
        let mut c = criteria(ResolvedPreferences::default_for_user(Uuid::new_v4()));
        c.category = Some("transport".to_string());
        let outcome =
            check_category_relevance(&c, &UserEngagementProfile::neutral(Uuid::new_v4()));
        assert!(outcome.should_notify);
        assert!((outcome.confidence - NEUTRAL_CONFIDENCE).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_match_and_miss() {
        let mut prefs = ResolvedPreferences::default_for_user(Uuid::new_v4());
        prefs.keyword_filters = vec!["Medicaid".to_string()];
        let mut c = criteria(prefs);
        c.title = Some("Medicaid expansion bill advances".to_string());

        assert!(check_keyword_relevance(&c).should_notify);

        c.title = Some("Unrelated transportation bill".to_string());
        let outcome = check_keyword_relevance(&c);
        assert!(!outcome.should_notify);
        assert_eq!(outcome.reasons[0], "No configured keywords matched");
    }

    #[test]
    fn test_keyword_absent_filters_neutral_pass() {
        let mut c = criteria(ResolvedPreferences::default_for_user(Uuid::new_v4()));
        c.title = Some("Anything".to_string());
        let outcome = check_keyword_relevance(&c);
        assert!(outcome.should_notify);
        assert!((outcome.confidence - NEUTRAL_CONFIDENCE).abs() < 1e-9);
    }

    #[test]
    fn test_tag_relevance_profile_fallback() {
        let mut c = criteria(ResolvedPreferences::default_for_user(Uuid::new_v4()));
        c.tags = vec!["reform".to_string()];

        let mut profile = UserEngagementProfile::neutral(Uuid::new_v4());
        profile.top_tags = vec![ScoredItem {
            name: "reform".to_string(),
            score: 30.0,
        }];
        let outcome = check_tag_relevance(&c, &profile);
        assert!(outcome.should_notify);
        assert!((outcome.confidence - 0.75).abs() < 1e-9);

        profile.top_tags[0].score = 10.0;
        assert!(!check_tag_relevance(&c, &profile).should_notify);
    }

    #[tokio::test]
    async fn test_interest_check_inactive_without_flag() {
        let interests = crate::stores::MemoryInterestSource::new();
        let mut c = criteria(ResolvedPreferences::default_for_user(Uuid::new_v4()));
        c.bill_id = Some(Uuid::new_v4());
        let outcome = check_interest_relevance(&c, &interests).await.unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_interest_check_hard_fail_on_mismatch() {
        let interests = crate::stores::MemoryInterestSource::new();
        let user_id = Uuid::new_v4();
        let bill_id = Uuid::new_v4();
        interests
            .set_interests(user_id, vec!["education".to_string()])
            .await;
        interests
            .set_entity_category(bill_id, "healthcare".to_string())
            .await;

        let mut prefs = ResolvedPreferences::default_for_user(user_id);
        prefs.smart_filtering.interest_filtering = true;
        let mut c = criteria(prefs);
        c.bill_id = Some(bill_id);

        let outcome = check_interest_relevance(&c, &interests).await.unwrap().unwrap();
        assert!(!outcome.should_notify);
        assert!(!outcome.is_strict_exclusion());
    }

    #[tokio::test]
    async fn test_interest_check_match_passes() {
        let interests = crate::stores::MemoryInterestSource::new();
        let user_id = Uuid::new_v4();
        let bill_id = Uuid::new_v4();
        interests
            .set_interests(user_id, vec!["healthcare".to_string()])
            .await;
        interests
            .set_entity_category(bill_id, "Healthcare".to_string())
            .await;

        let mut prefs = ResolvedPreferences::default_for_user(user_id);
        prefs.smart_filtering.interest_filtering = true;
        let mut c = criteria(prefs);
        c.bill_id = Some(bill_id);

        let outcome = check_interest_relevance(&c, &interests).await.unwrap().unwrap();
        assert!(outcome.should_notify);
        assert!((outcome.confidence - 0.9).abs() < 1e-9);
    }
}
