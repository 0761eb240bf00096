//! Audit entries, query filters and report shapes
//!
//! Entries are created once and never mutated. The log itself lives in
//! `nestguard-audit`; these are the shared types callers build and read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::age::Direction;
use crate::verdict::RiskLevel;

/// Kind of event recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    InputValidated,
    OutputValidated,
    ContentBlocked,
    ContentSanitized,
    ExceptionApplied,
    ParentalReviewRequested,
    ParentalDecision,
    ReviewExpired,
    AgeGroupChanged,
    ValidationError,
}

impl AuditEventType {
    /// Events produced by a validation call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InputValidated
                | Self::OutputValidated
                | Self::ContentBlocked
                | Self::ContentSanitized
                | Self::ExceptionApplied
                | Self::ValidationError
        )
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InputValidated => "input_validated",
            Self::OutputValidated => "output_validated",
            Self::ContentBlocked => "content_blocked",
            Self::ContentSanitized => "content_sanitized",
            Self::ExceptionApplied => "exception_applied",
            Self::ParentalReviewRequested => "parental_review_requested",
            Self::ParentalDecision => "parental_decision",
            Self::ReviewExpired => "review_expired",
            Self::AgeGroupChanged => "age_group_changed",
            Self::ValidationError => "validation_error",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AuditEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
            .map_err(|_| format!("Unknown audit event type: {}", s))
    }
}

/// One recorded decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAuditEntry {
    pub id: String,
    /// Issue order; per user, entries are kept sorted by this
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub event_type: AuditEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    pub original_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_content: Option<String>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub blocked_reasons: Vec<String>,
    pub parental_review_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_set_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_id: Option<String>,
}

impl SafetyAuditEntry {
    /// New entry with a fresh id; sequence 0 means "assign on log"
    pub fn new(
        user_id: impl Into<String>,
        event_type: AuditEventType,
        original_content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sequence: 0,
            timestamp: Utc::now(),
            user_id: user_id.into(),
            event_type,
            direction: None,
            original_content: original_content.into(),
            processed_content: None,
            risk_level: RiskLevel::Low,
            blocked_reasons: Vec::new(),
            parental_review_required: false,
            rule_set_version: None,
            review_request_id: None,
            exception_id: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_processed(mut self, processed: impl Into<String>) -> Self {
        self.processed_content = Some(processed.into());
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    pub fn with_reasons(mut self, reasons: Vec<String>) -> Self {
        self.blocked_reasons = reasons;
        self
    }

    pub fn with_review(mut self, request_id: Option<String>) -> Self {
        self.parental_review_required = request_id.is_some();
        self.review_request_id = request_id;
        self
    }

    pub fn with_rule_set_version(mut self, version: u64) -> Self {
        self.rule_set_version = Some(version);
        self
    }

    pub fn with_exception(mut self, exception_id: impl Into<String>) -> Self {
        self.exception_id = Some(exception_id.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Half-open time window `[start, end)`; open ends are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts < e)
    }
}

/// Filters for audit queries; empty fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_types: Vec<AuditEventType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_risk: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parental_review_required: Option<bool>,
    /// Keep only the most recent N matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_event_types(mut self, types: impl IntoIterator<Item = AuditEventType>) -> Self {
        self.event_types = types.into_iter().collect();
        self
    }

    pub fn with_min_risk(mut self, risk: RiskLevel) -> Self {
        self.min_risk = Some(risk);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &SafetyAuditEntry) -> bool {
        if let Some(ref user) = self.user_id {
            if &entry.user_id != user {
                return false;
            }
        }
        if !self.event_types.is_empty() && !self.event_types.contains(&entry.event_type) {
            return false;
        }
        if let Some(min) = self.min_risk {
            if entry.risk_level < min {
                return false;
            }
        }
        if let Some(review) = self.parental_review_required {
            if entry.parental_review_required != review {
                return false;
            }
        }
        true
    }
}

/// Aggregate view over a window of audit entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub time_range: TimeRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub total_events: usize,
    pub validations: usize,
    pub allowed: usize,
    pub blocked: usize,
    pub sanitized: usize,
    pub exceptions_applied: usize,
    pub review_requests: usize,
    pub parental_decisions: usize,
    pub reviews_expired: usize,
    pub errors: usize,
    pub unique_users: usize,
    /// blocked / validations, 0 when there were no validations
    pub block_rate: f64,
    pub by_event_type: BTreeMap<String, usize>,
    pub by_risk_level: BTreeMap<String, usize>,
    /// Most frequent blocked reasons, descending
    pub top_blocked_reasons: Vec<(String, usize)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_event_type_round_trip_str() {
        let t: AuditEventType = "validation_error".parse().unwrap();
        assert_eq!(t, AuditEventType::ValidationError);
        assert_eq!(t.to_string(), "validation_error");
        assert!("nope".parse::<AuditEventType>().is_err());
    }

    #[test]
    fn test_time_range_half_open() {
        let now = Utc::now();
        let range = TimeRange::between(now, now + Duration::minutes(5));
        assert!(range.contains(now));
        assert!(!range.contains(now + Duration::minutes(5)));
        assert!(!range.contains(now - Duration::seconds(1)));
        assert!(TimeRange::all().contains(now));
    }

    #[test]
    fn test_filter_matches() {
        let entry = SafetyAuditEntry::new("kid-1", AuditEventType::ContentBlocked, "bad")
            .with_risk(RiskLevel::Medium)
            .with_review(Some("req-1".to_string()));

        assert!(AuditFilter::default().matches(&entry));
        assert!(AuditFilter::for_user("kid-1").matches(&entry));
        assert!(!AuditFilter::for_user("kid-2").matches(&entry));
        assert!(AuditFilter::default()
            .with_min_risk(RiskLevel::Medium)
            .matches(&entry));
        assert!(!AuditFilter::default()
            .with_min_risk(RiskLevel::High)
            .matches(&entry));
        assert!(!AuditFilter::default()
            .with_event_types([AuditEventType::InputValidated])
            .matches(&entry));
        assert!(entry.parental_review_required);
    }
}
