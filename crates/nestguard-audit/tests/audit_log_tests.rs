//! Audit Log Integration Tests
//!
//! Covers the log together with its persistence sink:
//! - Entries reach the file sink in log order
//! - Sink failures are reported as events without losing the in-memory entry
//! - Concurrent writers keep per-user history ordered

use std::sync::Arc;

use async_trait::async_trait;
use nestguard_audit::{read_entries, AuditLog, AuditSink, FileSink};
use nestguard_core::{
    AuditEventType, AuditFilter, GuardError, GuardResult, NotificationHub, SafetyAuditEntry,
    SafetyEvent, TimeRange,
};

struct FailingSink;

#[async_trait]
impl AuditSink for FailingSink {
    async fn persist(&self, _entry: &SafetyAuditEntry) -> GuardResult<()> {
        Err(GuardError::audit("disk full"))
    }
}

// ============================================================================
// Sink Tests
// ============================================================================

#[tokio::test]
async fn test_file_sink_mirrors_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");

    let sink = FileSink::new(&path).await.unwrap();
    let log = AuditLog::new(100).with_sink(Arc::new(sink));

    log.log(SafetyAuditEntry::new("kid", AuditEventType::InputValidated, "hi"));
    log.log(SafetyAuditEntry::new("kid", AuditEventType::ContentBlocked, "bad"));
    log.flush().await;

    let persisted = read_entries(&path).await.unwrap();
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted[0].event_type, AuditEventType::InputValidated);
    assert_eq!(persisted[1].event_type, AuditEventType::ContentBlocked);

    // A restarted log continues numbering after the persisted entries
    let restored = AuditLog::from_entries(100, persisted);
    assert_eq!(restored.len(), 2);
    assert!(restored.reserve_sequence() > 2);
}

#[tokio::test]
async fn test_failing_sink_emits_event() {
    let hub = NotificationHub::new();
    let mut rx = hub.subscribe();
    let log = AuditLog::new(100)
        .with_events(hub)
        .with_sink(Arc::new(FailingSink));

    let id = log.log(SafetyAuditEntry::new("kid", AuditEventType::InputValidated, "hi"));
    log.flush().await;

    match rx.recv().await.unwrap() {
        SafetyEvent::AuditSinkFailed { entry_id, message } => {
            assert_eq!(entry_id, id);
            assert!(message.contains("disk full"));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // In-memory log is authoritative
    assert_eq!(log.len(), 1);
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_users_keep_order() {
    let log = Arc::new(AuditLog::new(10_000));
    let mut handles = Vec::new();

    for user in 0..8 {
        let log = log.clone();
        handles.push(tokio::spawn(async move {
            let user_id = format!("user-{}", user);
            for i in 0..50 {
                log.log(SafetyAuditEntry::new(
                    user_id.clone(),
                    AuditEventType::InputValidated,
                    format!("message {}", i),
                ));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(log.len(), 400);
    assert_eq!(log.user_count(), 8);

    for user in 0..8 {
        let entries = log.query(&AuditFilter::for_user(format!("user-{}", user)), &TimeRange::all());
        assert_eq!(entries.len(), 50);
        assert!(entries.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert_eq!(entries[0].original_content, "message 0");
        assert_eq!(entries[49].original_content, "message 49");
    }
}

#[tokio::test]
async fn test_report_for_single_user() {
    let log = AuditLog::new(100);
    log.log(SafetyAuditEntry::new("a", AuditEventType::InputValidated, "hi"));
    log.log(SafetyAuditEntry::new("a", AuditEventType::ContentBlocked, "bad"));
    log.log(SafetyAuditEntry::new("b", AuditEventType::ContentBlocked, "bad"));

    let report = log.generate_report(&TimeRange::all(), Some("a"));
    assert_eq!(report.total_events, 2);
    assert_eq!(report.blocked, 1);
    assert_eq!(report.unique_users, 1);

    let overall = log.generate_report(&TimeRange::all(), None);
    assert_eq!(overall.blocked, 2);
    assert_eq!(overall.unique_users, 2);
}
