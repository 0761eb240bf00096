//! Rule Store Integration Tests
//!
//! Export/import round trips, atomic rejection of bad documents and
//! snapshot isolation for readers.

use std::sync::Arc;

use nestguard_core::{AgeGroup, GuardError, RuleAction, RuleDraft, Severity};
use nestguard_filter::{
    ConfigurationDocument, ExportFormat, ImportMode, RuleFilter, RuleStore, TestSample,
};

fn store_with_custom_rule() -> (RuleStore, String) {
    let store = RuleStore::with_defaults();
    let id = store
        .create_rule(
            RuleDraft::new("secret", r"keep (?:it|this) secret", RuleAction::Block, Severity::High)
                .with_age_groups([AgeGroup::Child, AgeGroup::Teen]),
        )
        .unwrap()
        .rule
        .id;
    (store, id)
}

// ============================================================================
// Export / Import
// ============================================================================

#[test]
fn test_yaml_round_trip_into_fresh_store() {
    let (store, id) = store_with_custom_rule();
    let yaml = store.export(ExportFormat::Yaml).unwrap();

    let fresh = RuleStore::new();
    let summary = fresh.import(&yaml, ImportMode::Replace).unwrap();
    assert_eq!(summary.rules_added, store.get_rules(&RuleFilter::default()).len());
    assert_eq!(summary.rules_removed, 0);
    assert_eq!(summary.rule_set_version, fresh.version());

    let imported = fresh.get_rule(&id).unwrap();
    assert_eq!(imported.pattern, r"keep (?:it|this) secret");
    assert_eq!(fresh.topics(), store.topics());
    assert_eq!(fresh.policies(), store.policies());
}

#[test]
fn test_json_round_trip() {
    let (store, _) = store_with_custom_rule();
    let json = store.export(ExportFormat::Json).unwrap();
    let doc = ConfigurationDocument::parse(&json).unwrap();
    doc.verify().unwrap();
    assert_eq!(doc.version, store.version());

    let restored = RuleStore::from_document(doc).unwrap();
    assert_eq!(
        restored.get_rules(&RuleFilter::default()).len(),
        store.get_rules(&RuleFilter::default()).len()
    );
}

#[test]
fn test_reimport_unchanged_keeps_versions() {
    let (store, id) = store_with_custom_rule();
    let yaml = store.export(ExportFormat::Yaml).unwrap();

    let summary = store.import(&yaml, ImportMode::Replace).unwrap();
    assert_eq!(summary.rules_added, 0);
    assert_eq!(summary.rules_updated, 0);
    assert_eq!(store.get_rule(&id).unwrap().version, 1);
}

#[test]
fn test_invalid_import_changes_nothing() {
    let (store, id) = store_with_custom_rule();
    let before_version = store.version();
    let before_rules = store.get_rules(&RuleFilter::default());

    let mut doc = store.export_document().unwrap();
    doc.rules.push(nestguard_core::SafetyRule::from_draft(
        "broken",
        RuleDraft::new("broken", "(unclosed", RuleAction::Block, Severity::Low),
    ));
    doc.checksum = Some(doc.compute_checksum().unwrap());

    let err = store.import_document(doc, ImportMode::Replace).unwrap_err();
    assert!(matches!(err, GuardError::Import(_)));
    assert_eq!(store.version(), before_version);
    assert_eq!(store.get_rules(&RuleFilter::default()), before_rules);
    assert!(store.get_rule(&id).is_some());
}

#[test]
fn test_import_rejects_unknown_topic_reference() {
    let store = RuleStore::new();
    let yaml = r#"
apiVersion: nestguard.dev/v1
kind: SafetyConfiguration
policies:
  - age_group: teen
    blocked_topics: [pirates]
    max_complexity: 65
"#;
    let err = store.import(yaml, ImportMode::Merge).unwrap_err();
    assert!(err.to_string().contains("pirates"));
    assert!(!store.policy(AgeGroup::Teen).blocked_topics.contains("pirates"));
}

#[test]
fn test_merge_keeps_existing_and_versions_updates() {
    let (store, id) = store_with_custom_rule();
    let builtin_count = store.get_rules(&RuleFilter::default()).len();

    let mut rule = store.get_rule(&id).unwrap();
    rule.severity = Severity::Critical;
    let extra = nestguard_core::SafetyRule::from_draft(
        "late-night",
        RuleDraft::new("late-night", r"\bmidnight\b", RuleAction::Warn, Severity::Low),
    );
    let doc = ConfigurationDocument::new(0, vec![rule, extra], Vec::new(), Default::default())
        .unwrap();

    let summary = store.import_document(doc, ImportMode::Merge).unwrap();
    assert_eq!(summary.rules_added, 1);
    assert_eq!(summary.rules_updated, 1);
    assert_eq!(summary.rules_removed, 0);
    assert_eq!(store.get_rules(&RuleFilter::default()).len(), builtin_count + 1);

    let updated = store.get_rule(&id).unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.severity, Severity::Critical);
    assert_eq!(store.get_rule_version(&id, 1).unwrap().severity, Severity::High);
}

#[test]
fn test_replace_removes_missing_rules() {
    let (store, id) = store_with_custom_rule();
    let doc = ConfigurationDocument::new(0, Vec::new(), Vec::new(), Default::default()).unwrap();

    let summary = store.import_document(doc, ImportMode::Replace).unwrap();
    assert!(summary.rules_removed > 0);
    assert!(store.get_rules(&RuleFilter::default()).is_empty());
    // History survives removal
    assert!(store.get_rule_version(&id, 1).is_some());
    // Empty catalog in the document keeps the current topics
    assert!(store.topics().contains_key("violence"));
}

// ============================================================================
// Snapshots and Rule Testing
// ============================================================================

#[test]
fn test_snapshot_isolated_from_later_writes() {
    let store = Arc::new(RuleStore::new());
    let before = store.snapshot();

    store
        .create_rule(RuleDraft::new("a", "a", RuleAction::Warn, Severity::Low))
        .unwrap();

    assert!(before.rules().is_empty());
    assert_eq!(store.snapshot().rules().len(), 1);
    assert!(store.snapshot().version() > before.version());
}

#[test]
fn test_concurrent_writers_get_distinct_versions() {
    let store = Arc::new(RuleStore::new());
    let start = store.version();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            std::thread::spawn(move || {
                store
                    .create_rule(RuleDraft::new(
                        format!("rule-{}", i),
                        format!(r"\bword{}\b", i),
                        RuleAction::Warn,
                        Severity::Low,
                    ))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.version(), start + 8);
    assert_eq!(store.get_rules(&RuleFilter::default()).len(), 8);
}

#[test]
fn test_rule_dry_run_through_store() {
    let store = RuleStore::new();
    let draft = RuleDraft::new("secret", r"keep (?:it|this) secret", RuleAction::Block, Severity::High);
    let report = store
        .test_rule(
            &draft,
            &[
                TestSample::matching("please keep this secret"),
                TestSample::non_matching("secrets are fun in games"),
            ],
        )
        .unwrap();
    assert_eq!(report.accuracy, 1.0);
    // Dry runs do not store anything
    assert!(store.get_rules(&RuleFilter::default()).is_empty());
}

#[test]
fn test_disabled_duplicate_yields_no_warning() {
    let store = RuleStore::new();
    store
        .create_rule(RuleDraft::new("secret", "secret", RuleAction::Block, Severity::High))
        .unwrap();

    let change = store
        .create_rule(RuleDraft::new("secret-flag", "secret", RuleAction::Flag, Severity::Low).disabled())
        .unwrap();
    assert!(change.warnings.is_empty());
    assert!(store.conflicts().is_empty());

    // Enabling it brings the conflict back
    let enabled = store
        .update_rule(
            &change.rule.id,
            RuleDraft::new("secret-flag", "secret", RuleAction::Flag, Severity::Low),
        )
        .unwrap();
    assert_eq!(enabled.warnings.len(), 1);
    assert_eq!(store.conflicts().len(), 1);
}
