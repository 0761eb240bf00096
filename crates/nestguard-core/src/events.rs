//! Notification events and the listener hub
//!
//! Listeners are called synchronously, in registration order, on the thread
//! that produced the event. A listener that needs to do I/O should hand the
//! event to a channel ([`ChannelListener`]) and return.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::age::AgeGroup;
use crate::review::{ReviewDecision, ReviewPriority};

/// Events emitted by the safety engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SafetyEvent {
    RuleCreated {
        rule_id: String,
        version: u32,
    },
    RuleUpdated {
        rule_id: String,
        version: u32,
    },
    RuleDeleted {
        rule_id: String,
    },
    ConfigurationImported {
        rule_set_version: u64,
        rule_count: usize,
    },
    ReviewRequested {
        request_id: String,
        user_id: String,
        priority: ReviewPriority,
        excerpt: String,
    },
    ReviewDecided {
        request_id: String,
        user_id: String,
        priority: ReviewPriority,
        decision: ReviewDecision,
        excerpt: String,
    },
    ReviewExpired {
        request_id: String,
        user_id: String,
        priority: ReviewPriority,
        decision: ReviewDecision,
        excerpt: String,
    },
    ExceptionCreated {
        exception_id: String,
        user_id: String,
    },
    ExceptionRevoked {
        exception_id: String,
        user_id: String,
    },
    AgeGroupChanged {
        user_id: String,
        from: AgeGroup,
        to: AgeGroup,
    },
    /// Evaluation failed and a fail-safe verdict was returned
    ValidationError {
        user_id: String,
        message: String,
    },
    /// Audit persistence failed; the in-memory log is unaffected
    AuditSinkFailed {
        entry_id: String,
        message: String,
    },
}

impl SafetyEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RuleCreated { .. } => "rule_created",
            Self::RuleUpdated { .. } => "rule_updated",
            Self::RuleDeleted { .. } => "rule_deleted",
            Self::ConfigurationImported { .. } => "configuration_imported",
            Self::ReviewRequested { .. } => "review_requested",
            Self::ReviewDecided { .. } => "parental_decision",
            Self::ReviewExpired { .. } => "review_expired",
            Self::ExceptionCreated { .. } => "exception_created",
            Self::ExceptionRevoked { .. } => "exception_revoked",
            Self::AgeGroupChanged { .. } => "age_group_changed",
            Self::ValidationError { .. } => "validation_error",
            Self::AuditSinkFailed { .. } => "audit_sink_failed",
        }
    }
}

/// Receives engine events (parent dashboard, push channel, ...)
pub trait NotificationListener: Send + Sync {
    fn on_event(&self, event: &SafetyEvent);

    /// A closed listener is dropped from the hub on the next emit
    fn is_closed(&self) -> bool {
        false
    }
}

/// Forwards events into an unbounded channel
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SafetyEvent>,
}

impl ChannelListener {
    /// Create a listener and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SafetyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationListener for ChannelListener {
    fn on_event(&self, event: &SafetyEvent) {
        // Receiver dropped: pruned on the next emit
        let _ = self.tx.send(event.clone());
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Adapts a closure into a listener
pub struct FnListener<F>(pub F);

impl<F> NotificationListener for FnListener<F>
where
    F: Fn(&SafetyEvent) + Send + Sync,
{
    fn on_event(&self, event: &SafetyEvent) {
        (self.0)(event)
    }
}

/// Ordered fan-out of events to registered listeners
#[derive(Default, Clone)]
pub struct NotificationHub {
    listeners: Arc<RwLock<Vec<Arc<dyn NotificationListener>>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn NotificationListener>) {
        self.listeners.write().push(listener);
    }

    /// Register a channel listener and return its receiver
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SafetyEvent> {
        let (listener, rx) = ChannelListener::new();
        self.register(Arc::new(listener));
        rx
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether both handles share one listener list
    pub fn same_hub(&self, other: &NotificationHub) -> bool {
        Arc::ptr_eq(&self.listeners, &other.listeners)
    }

    pub fn emit(&self, event: SafetyEvent) {
        tracing::debug!(event = event.name(), "emitting safety event");
        let listeners = self.listeners.read().clone();
        let mut closed = false;
        for listener in &listeners {
            if listener.is_closed() {
                closed = true;
                continue;
            }
            listener.on_event(&event);
        }
        if closed {
            let mut list = self.listeners.write();
            list.retain(|l| !l.is_closed());
            tracing::debug!(remaining = list.len(), "pruned closed listeners");
        }
    }
}

/// A hub registered on another hub re-emits everything it receives
impl NotificationListener for NotificationHub {
    fn on_event(&self, event: &SafetyEvent) {
        self.emit(event.clone());
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_listeners_called_in_registration_order() {
        let hub = NotificationHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            hub.register(Arc::new(FnListener(move |e: &SafetyEvent| {
                seen.lock().push(format!("{}:{}", tag, e.name()));
            })));
        }

        hub.emit(SafetyEvent::RuleDeleted {
            rule_id: "r1".to_string(),
        });

        assert_eq!(
            *seen.lock(),
            vec!["first:rule_deleted".to_string(), "second:rule_deleted".to_string()]
        );
    }

    #[tokio::test]
    async fn test_channel_listener() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe();

        hub.emit(SafetyEvent::ExceptionCreated {
            exception_id: "e1".to_string(),
            user_id: "kid".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "exception_created");
        assert_eq!(hub.listener_count(), 1);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let hub = NotificationHub::new();
        let rx = hub.subscribe();
        let _kept = hub.subscribe();
        assert_eq!(hub.listener_count(), 2);

        drop(rx);
        hub.emit(SafetyEvent::RuleDeleted {
            rule_id: "r1".to_string(),
        });
        assert_eq!(hub.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_hub_forwards_to_hub() {
        let upstream = NotificationHub::new();
        let downstream = NotificationHub::new();
        let mut rx = downstream.subscribe();
        upstream.register(Arc::new(downstream.clone()));

        assert!(!upstream.same_hub(&downstream));
        assert!(downstream.same_hub(&downstream.clone()));

        upstream.emit(SafetyEvent::RuleDeleted {
            rule_id: "r1".to_string(),
        });
        assert_eq!(rx.recv().await.unwrap().name(), "rule_deleted");
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = SafetyEvent::ReviewRequested {
            request_id: "req-1".to_string(),
            user_id: "kid".to_string(),
            priority: ReviewPriority::Urgent,
            excerpt: "how to...".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "review_requested");
        assert_eq!(json["priority"], "urgent");
    }
}
