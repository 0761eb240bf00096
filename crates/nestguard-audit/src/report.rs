//! Aggregate reports over audit entries

use chrono::Utc;
use nestguard_core::{AuditEventType, SafetyAuditEntry, SafetyReport, TimeRange};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Number of blocked reasons kept in a report
const TOP_REASONS: usize = 10;

/// Build a report from entries already filtered to the window
pub fn build_report(
    entries: &[SafetyAuditEntry],
    time_range: TimeRange,
    user_id: Option<&str>,
) -> SafetyReport {
    let mut report = SafetyReport {
        time_range,
        user_id: user_id.map(str::to_string),
        generated_at: Utc::now(),
        total_events: entries.len(),
        ..Default::default()
    };

    let mut users = HashSet::new();
    let mut reasons: HashMap<&str, usize> = HashMap::new();

    for entry in entries {
        users.insert(entry.user_id.as_str());
        *report
            .by_event_type
            .entry(entry.event_type.to_string())
            .or_default() += 1;

        if entry.event_type.is_validation() {
            report.validations += 1;
            *report
                .by_risk_level
                .entry(entry.risk_level.to_string())
                .or_default() += 1;
        }

        match entry.event_type {
            AuditEventType::InputValidated | AuditEventType::OutputValidated => {
                report.allowed += 1
            }
            AuditEventType::ContentBlocked => report.blocked += 1,
            AuditEventType::ContentSanitized => report.sanitized += 1,
            AuditEventType::ExceptionApplied => {
                report.exceptions_applied += 1;
                report.allowed += 1;
            }
            AuditEventType::ParentalReviewRequested => report.review_requests += 1,
            AuditEventType::ParentalDecision => report.parental_decisions += 1,
            AuditEventType::ReviewExpired => report.reviews_expired += 1,
            AuditEventType::ValidationError => {
                report.errors += 1;
                report.blocked += 1;
            }
            AuditEventType::AgeGroupChanged => {}
        }

        if matches!(
            entry.event_type,
            AuditEventType::ContentBlocked | AuditEventType::ContentSanitized
        ) {
            for reason in &entry.blocked_reasons {
                *reasons.entry(reason.as_str()).or_default() += 1;
            }
        }
    }

    report.unique_users = users.len();
    report.block_rate = if report.validations == 0 {
        0.0
    } else {
        report.blocked as f64 / report.validations as f64
    };

    let mut top: Vec<(String, usize)> = reasons
        .into_iter()
        .map(|(reason, count)| (reason.to_string(), count))
        .collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(TOP_REASONS);
    report.top_blocked_reasons = top;

    report
}

/// Event counts keyed by type, for compact summaries
pub fn count_by_event(entries: &[SafetyAuditEntry]) -> BTreeMap<AuditEventType, usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.event_type).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestguard_core::RiskLevel;

    #[test]
    fn test_report_counts() {
        let entries = vec![
            SafetyAuditEntry::new("a", AuditEventType::InputValidated, "hi"),
            SafetyAuditEntry::new("a", AuditEventType::ContentBlocked, "bad")
                .with_risk(RiskLevel::High)
                .with_reasons(vec!["harmful_instruction: how to".to_string()]),
            SafetyAuditEntry::new("b", AuditEventType::ContentBlocked, "bad")
                .with_risk(RiskLevel::High)
                .with_reasons(vec!["harmful_instruction: how to".to_string()]),
            SafetyAuditEntry::new("b", AuditEventType::ContentSanitized, "darn")
                .with_risk(RiskLevel::Medium)
                .with_reasons(vec!["profanity: mild".to_string()]),
            SafetyAuditEntry::new("b", AuditEventType::ParentalReviewRequested, "bad"),
        ];

        let report = build_report(&entries, TimeRange::all(), None);
        assert_eq!(report.total_events, 5);
        assert_eq!(report.validations, 4);
        assert_eq!(report.allowed, 1);
        assert_eq!(report.blocked, 2);
        assert_eq!(report.sanitized, 1);
        assert_eq!(report.review_requests, 1);
        assert_eq!(report.unique_users, 2);
        assert!((report.block_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(report.by_risk_level.get("high"), Some(&2));
        assert_eq!(
            report.top_blocked_reasons[0],
            ("harmful_instruction: how to".to_string(), 2)
        );
    }

    #[test]
    fn test_empty_report() {
        let report = build_report(&[], TimeRange::all(), Some("kid"));
        assert_eq!(report.total_events, 0);
        assert_eq!(report.block_rate, 0.0);
        assert_eq!(report.user_id.as_deref(), Some("kid"));
    }

    #[test]
    fn test_count_by_event() {
        let entries = vec![
            SafetyAuditEntry::new("a", AuditEventType::InputValidated, "x"),
            SafetyAuditEntry::new("a", AuditEventType::InputValidated, "y"),
        ];
        let counts = count_by_event(&entries);
        assert_eq!(counts.get(&AuditEventType::InputValidated), Some(&2));
    }
}
