//! In-memory audit log
//!
//! Entries are sharded per user in a [`DashMap`] so concurrent validations for
//! different users never contend on one lock. Within a user, entries stay
//! sorted by their issue sequence, which makes the per-user history FIFO in
//! call order even when two calls finish out of order.
//!
//! ## Bounds
//!
//! - **Capacity**: when the total exceeds `max_entries`, the globally oldest
//!   entries (lowest sequence) are evicted first, found through a min-heap of
//!   `(sequence, user)` rather than a scan over users.
//! - **Retention**: [`AuditLog::purge`] removes entries older than a cutoff;
//!   the runtime sweeper calls it on a long cycle.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use nestguard_core::{
    AuditFilter, NotificationHub, SafetyAuditEntry, SafetyEvent, SafetyReport, TimeRange,
};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::report::build_report;
use crate::sink::AuditSink;

/// Default capacity
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

enum WriterMessage {
    Entry(Box<SafetyAuditEntry>),
    Flush(oneshot::Sender<()>),
}

/// Append-only, bounded store of safety decisions
pub struct AuditLog {
    /// Entries per user, sorted by sequence
    users: DashMap<String, VecDeque<SafetyAuditEntry>>,
    /// Eviction order over every stored entry; locked before any user shard
    oldest: Mutex<BinaryHeap<Reverse<(u64, String)>>>,
    /// Total entries across all users
    len: AtomicUsize,
    /// Next issue sequence (starts at 1; 0 means unassigned)
    sequence: AtomicU64,
    max_entries: usize,
    /// Background persistence writer, if a sink is attached
    writer: Option<mpsc::UnboundedSender<WriterMessage>>,
    events: NotificationHub,
}

impl AuditLog {
    /// Create a log with the given capacity
    pub fn new(max_entries: usize) -> Self {
        Self {
            users: DashMap::new(),
            oldest: Mutex::new(BinaryHeap::new()),
            len: AtomicUsize::new(0),
            sequence: AtomicU64::new(1),
            max_entries: max_entries.max(1),
            writer: None,
            events: NotificationHub::new(),
        }
    }

    /// Report sink failures through this hub
    pub fn with_events(mut self, events: NotificationHub) -> Self {
        self.events = events;
        self
    }

    /// Attach a persistence sink
    ///
    /// Spawns the writer task, so this must be called inside a tokio runtime.
    /// Logging stays non-blocking: entries are queued and written in order by
    /// the task; failures are reported as [`SafetyEvent::AuditSinkFailed`].
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriterMessage>();
        let events = self.events.clone();

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    WriterMessage::Entry(entry) => {
                        if let Err(e) = sink.persist(&entry).await {
                            warn!(entry_id = %entry.id, "audit sink write failed: {}", e);
                            events.emit(SafetyEvent::AuditSinkFailed {
                                entry_id: entry.id.clone(),
                                message: e.to_string(),
                            });
                        }
                    }
                    WriterMessage::Flush(done) => {
                        if let Err(e) = sink.flush().await {
                            warn!("audit sink flush failed: {}", e);
                        }
                        let _ = done.send(());
                    }
                }
            }
            debug!("audit writer stopped");
        });

        self.writer = Some(tx);
        self
    }

    /// Rebuild a log from previously persisted entries
    pub fn from_entries(max_entries: usize, entries: Vec<SafetyAuditEntry>) -> Self {
        let log = Self::new(max_entries);
        let mut max_seq = 0;
        for entry in entries {
            max_seq = max_seq.max(entry.sequence);
            log.insert(entry);
        }
        log.sequence.store(max_seq + 1, Ordering::SeqCst);
        log
    }

    /// Reserve the next issue sequence
    ///
    /// Callers reserve at the start of a validation call and stamp the
    /// resulting entry with it, so per-user order matches call order.
    pub fn reserve_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Record an entry; never fails and never blocks on I/O
    ///
    /// Returns the entry id.
    pub fn log(&self, mut entry: SafetyAuditEntry) -> String {
        if entry.sequence == 0 {
            entry.sequence = self.reserve_sequence();
        }
        let id = entry.id.clone();

        if let Some(ref writer) = self.writer {
            if writer.send(WriterMessage::Entry(Box::new(entry.clone()))).is_err() {
                self.events.emit(SafetyEvent::AuditSinkFailed {
                    entry_id: id.clone(),
                    message: "audit writer is not running".to_string(),
                });
            }
        }

        self.insert(entry);
        id
    }

    fn insert(&self, entry: SafetyAuditEntry) {
        let record = Reverse((entry.sequence, entry.user_id.clone()));
        {
            let mut deque = self.users.entry(entry.user_id.clone()).or_default();
            // Usually appends; walks back only for out-of-order completions
            let pos = deque
                .iter()
                .rposition(|e| e.sequence <= entry.sequence)
                .map_or(0, |p| p + 1);
            deque.insert(pos, entry);
        }
        self.oldest.lock().push(record);

        let total = self.len.fetch_add(1, Ordering::SeqCst) + 1;
        if total > self.max_entries {
            self.evict_overflow();
        }
    }

    /// Evict globally oldest entries until within capacity
    fn evict_overflow(&self) {
        let mut oldest = self.oldest.lock();
        while self.len.load(Ordering::SeqCst) > self.max_entries {
            let Some(Reverse((sequence, user))) = oldest.pop() else {
                break;
            };

            // Records of purged entries find nothing; live ones sit near the front
            let popped = self.users.get_mut(&user).and_then(|mut deque| {
                deque
                    .binary_search_by_key(&sequence, |e| e.sequence)
                    .ok()
                    .and_then(|pos| deque.remove(pos))
            });
            if popped.is_some() {
                self.len.fetch_sub(1, Ordering::SeqCst);
            }
            self.users.remove_if(&user, |_, deque| deque.is_empty());
        }
    }

    /// Entries matching the filter within the time range, in issue order
    pub fn query(&self, filter: &AuditFilter, range: &TimeRange) -> Vec<SafetyAuditEntry> {
        let collect = |deque: &VecDeque<SafetyAuditEntry>, out: &mut Vec<SafetyAuditEntry>| {
            out.extend(
                deque
                    .iter()
                    .filter(|e| range.contains(e.timestamp) && filter.matches(e))
                    .cloned(),
            );
        };

        let mut entries = Vec::new();
        match filter.user_id {
            Some(ref user) => {
                if let Some(deque) = self.users.get(user) {
                    collect(&deque, &mut entries);
                }
            }
            None => {
                for deque in self.users.iter() {
                    collect(deque.value(), &mut entries);
                }
                entries.sort_by_key(|e| e.sequence);
            }
        }

        if let Some(limit) = filter.limit {
            if entries.len() > limit {
                entries.drain(..entries.len() - limit);
            }
        }
        entries
    }

    /// The user's most recent `n` entries, oldest first
    pub fn recent_for_user(&self, user_id: &str, n: usize) -> Vec<SafetyAuditEntry> {
        match self.users.get(user_id) {
            Some(deque) => {
                let skip = deque.len().saturating_sub(n);
                deque.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Aggregate report over the range, optionally for one user
    pub fn generate_report(&self, range: &TimeRange, user_id: Option<&str>) -> SafetyReport {
        let filter = AuditFilter {
            user_id: user_id.map(str::to_string),
            ..Default::default()
        };
        let entries = self.query(&filter, range);
        build_report(&entries, *range, user_id)
    }

    /// Remove entries older than the cutoff; returns how many were removed
    pub fn purge(&self, older_than: DateTime<Utc>) -> usize {
        let mut purged = 0;
        for mut deque in self.users.iter_mut() {
            let before = deque.len();
            deque.retain(|e| e.timestamp >= older_than);
            purged += before - deque.len();
        }
        self.users.retain(|_, deque| !deque.is_empty());
        self.len.fetch_sub(purged, Ordering::SeqCst);

        if purged > 0 {
            let mut oldest = self.oldest.lock();
            oldest.clear();
            for shard in self.users.iter() {
                oldest.extend(
                    shard
                        .value()
                        .iter()
                        .map(|e| Reverse((e.sequence, shard.key().clone()))),
                );
            }

            debug!(purged, cutoff = %older_than, "purged audit entries");
        }
        purged
    }

    /// Wait until every entry logged so far has reached the sink
    pub async fn flush(&self) {
        if let Some(ref writer) = self.writer {
            let (tx, rx) = oneshot::channel();
            if writer.send(WriterMessage::Flush(tx)).is_ok() {
                let _ = rx.await;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nestguard_core::{AuditEventType, RiskLevel};

    fn entry(user: &str, event: AuditEventType) -> SafetyAuditEntry {
        SafetyAuditEntry::new(user, event, "hello")
    }

    #[test]
    fn test_log_assigns_sequence() {
        let log = AuditLog::new(10);
        log.log(entry("a", AuditEventType::InputValidated));
        log.log(entry("a", AuditEventType::OutputValidated));

        let entries = log.recent_for_user("a", 10);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].sequence < entries[1].sequence);
        assert_eq!(entries[0].event_type, AuditEventType::InputValidated);
    }

    #[test]
    fn test_out_of_order_completion_keeps_issue_order() {
        let log = AuditLog::new(10);
        let first = log.reserve_sequence();
        let second = log.reserve_sequence();

        // Second call finishes first
        log.log(entry("kid", AuditEventType::OutputValidated).with_sequence(second));
        log.log(entry("kid", AuditEventType::InputValidated).with_sequence(first));

        let entries = log.recent_for_user("kid", 10);
        assert_eq!(entries[0].sequence, first);
        assert_eq!(entries[1].sequence, second);
    }

    #[test]
    fn test_capacity_evicts_oldest_globally() {
        let log = AuditLog::new(3);
        log.log(entry("a", AuditEventType::InputValidated));
        log.log(entry("b", AuditEventType::InputValidated));
        log.log(entry("a", AuditEventType::InputValidated));
        log.log(entry("c", AuditEventType::InputValidated));

        assert_eq!(log.len(), 3);
        assert_eq!(log.recent_for_user("a", 10).len(), 1);
        assert_eq!(log.recent_for_user("b", 10).len(), 1);
        assert_eq!(log.recent_for_user("c", 10).len(), 1);
    }

    #[test]
    fn test_eviction_after_purge_and_late_completion() {
        let log = AuditLog::new(3);
        let now = Utc::now();
        let early = log.reserve_sequence();
        log.log(entry("a", AuditEventType::InputValidated).at(now - Duration::days(40)));
        log.log(entry("b", AuditEventType::InputValidated));
        assert_eq!(log.purge(now - Duration::days(30)), 1);

        log.log(entry("c", AuditEventType::InputValidated));
        log.log(entry("d", AuditEventType::InputValidated));
        // Reserved first, finished last: it is the oldest and goes first
        log.log(entry("a", AuditEventType::ContentBlocked).with_sequence(early));

        assert_eq!(log.len(), 3);
        assert!(log.recent_for_user("a", 10).is_empty());
        assert_eq!(log.recent_for_user("b", 10).len(), 1);
        assert_eq!(log.recent_for_user("d", 10).len(), 1);
    }

    #[test]
    fn test_purge_by_age() {
        let log = AuditLog::new(100);
        let now = Utc::now();
        log.log(entry("a", AuditEventType::InputValidated).at(now - Duration::days(40)));
        log.log(entry("a", AuditEventType::InputValidated).at(now - Duration::days(1)));
        log.log(entry("b", AuditEventType::InputValidated).at(now - Duration::days(31)));

        let purged = log.purge(now - Duration::days(30));
        assert_eq!(purged, 2);
        assert_eq!(log.len(), 1);
        assert_eq!(log.user_count(), 1);
    }

    #[test]
    fn test_query_limit_keeps_most_recent() {
        let log = AuditLog::new(100);
        for i in 0..5 {
            log.log(
                entry("a", AuditEventType::ContentBlocked).with_risk(if i % 2 == 0 {
                    RiskLevel::High
                } else {
                    RiskLevel::Low
                }),
            );
        }

        let all = log.query(&AuditFilter::default(), &TimeRange::all());
        let limited = log.query(&AuditFilter::default().with_limit(2), &TimeRange::all());
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].sequence, all[4].sequence);

        let high = log.query(
            &AuditFilter::default().with_min_risk(RiskLevel::High),
            &TimeRange::all(),
        );
        assert_eq!(high.len(), 3);
    }

    #[test]
    fn test_from_entries_continues_sequence() {
        let entries = vec![
            entry("a", AuditEventType::InputValidated).with_sequence(7),
            entry("b", AuditEventType::InputValidated).with_sequence(3),
        ];
        let log = AuditLog::from_entries(100, entries);
        assert_eq!(log.len(), 2);
        assert_eq!(log.reserve_sequence(), 8);
    }
}
