//! Exception Store - Parent-granted, bounded overrides
//!
//! An exception lets one user say one exact thing again, a limited number of
//! times, for a limited period. Exceptions are never deleted: expired,
//! exhausted or revoked ones simply stop matching and stay listed for audit.
//!
//! Same-user lookups serialize on a per-user mutex so the usage counter can
//! never pass `max_usage`; different users never share a lock.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use nestguard_core::{
    AgeGroup, ContentType, GuardError, GuardResult, NotificationHub, SafetyEvent, SafetyException,
};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Uses granted when nothing else is specified
pub const DEFAULT_MAX_USAGE: u32 = 5;

/// Lifetime granted when nothing else is specified (one day)
pub const DEFAULT_DURATION_SECS: i64 = 86_400;

/// Everything needed to create an exception
#[derive(Debug, Clone)]
pub struct ExceptionGrant {
    pub user_id: String,
    /// The exact content being allowed
    pub content: String,
    pub reason: String,
    pub approver: String,
    /// None means the exception only ends by usage or revocation
    pub duration: Option<Duration>,
    pub max_usage: u32,
    pub contexts: BTreeSet<ContentType>,
    pub age_group: AgeGroup,
    pub source_request_id: Option<String>,
}

impl ExceptionGrant {
    pub fn new(user_id: impl Into<String>, content: impl Into<String>, age_group: AgeGroup) -> Self {
        Self {
            user_id: user_id.into(),
            content: content.into(),
            reason: String::new(),
            approver: "parent".to_string(),
            duration: Some(Duration::seconds(DEFAULT_DURATION_SECS)),
            max_usage: DEFAULT_MAX_USAGE,
            contexts: ContentType::ALL.into_iter().collect(),
            age_group,
            source_request_id: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_approver(mut self, approver: impl Into<String>) -> Self {
        self.approver = approver.into();
        self
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_max_usage(mut self, max_usage: u32) -> Self {
        self.max_usage = max_usage;
        self
    }

    pub fn with_contexts(mut self, contexts: impl IntoIterator<Item = ContentType>) -> Self {
        self.contexts = contexts.into_iter().collect();
        self
    }

    pub fn from_request(mut self, request_id: impl Into<String>) -> Self {
        self.source_request_id = Some(request_id.into());
        self
    }
}

/// Anchored, case-insensitive pattern for exactly this content
pub fn exact_pattern(content: &str) -> String {
    format!("(?i)^{}$", regex::escape(content.trim()))
}

struct StoredException {
    exception: SafetyException,
    matcher: Regex,
}

type UserExceptions = Arc<Mutex<Vec<StoredException>>>;

/// Per-user exception lists
pub struct ExceptionStore {
    users: DashMap<String, UserExceptions>,
    events: NotificationHub,
}

impl ExceptionStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            events: NotificationHub::new(),
        }
    }

    pub fn with_events(mut self, events: NotificationHub) -> Self {
        self.events = events;
        self
    }

    fn user_list(&self, user_id: &str) -> Option<UserExceptions> {
        self.users.get(user_id).map(|entry| entry.value().clone())
    }

    /// Create an exception and return it
    pub fn grant(&self, grant: ExceptionGrant) -> GuardResult<SafetyException> {
        if grant.content.trim().is_empty() {
            return Err(GuardError::validation("exception content must not be empty"));
        }
        if grant.max_usage == 0 {
            return Err(GuardError::validation("exception max_usage must be at least 1"));
        }
        if grant.contexts.is_empty() {
            return Err(GuardError::validation("exception needs at least one context"));
        }

        let pattern = exact_pattern(&grant.content);
        let matcher = Regex::new(&pattern)
            .map_err(|e| GuardError::validation(format!("exception pattern: {}", e)))?;

        let now = Utc::now();
        let exception = SafetyException {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: grant.user_id.clone(),
            pattern,
            reason: grant.reason,
            approver: grant.approver,
            created_at: now,
            expires_at: grant.duration.map(|d| now + d),
            usage_count: 0,
            max_usage: grant.max_usage,
            contexts: grant.contexts,
            age_group: grant.age_group,
            source_request_id: grant.source_request_id,
            revoked_at: None,
        };

        let list = self
            .users
            .entry(grant.user_id)
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .value()
            .clone();
        list.lock().push(StoredException {
            exception: exception.clone(),
            matcher,
        });

        info!(
            exception_id = %exception.id,
            user_id = %exception.user_id,
            max_usage = exception.max_usage,
            "safety exception granted"
        );
        self.events.emit(SafetyEvent::ExceptionCreated {
            exception_id: exception.id.clone(),
            user_id: exception.user_id.clone(),
        });
        Ok(exception)
    }

    /// Find an active exception for this content and count one use
    ///
    /// Returns the exception as it is after the increment.
    pub fn find_and_consume(
        &self,
        user_id: &str,
        content: &str,
        content_type: ContentType,
        now: DateTime<Utc>,
    ) -> Option<SafetyException> {
        let list = self.user_list(user_id)?;
        let mut list = list.lock();
        let trimmed = content.trim();

        let stored = list.iter_mut().find(|s| {
            s.exception.is_active_at(now)
                && s.exception.applies_to(content_type)
                && s.matcher.is_match(trimmed)
        })?;

        stored.exception.usage_count += 1;
        debug!(
            exception_id = %stored.exception.id,
            user_id,
            remaining = stored.exception.remaining_uses(),
            "safety exception applied"
        );
        Some(stored.exception.clone())
    }

    /// Active exceptions for a user at `now`
    pub fn active_for_user(&self, user_id: &str, now: DateTime<Utc>) -> Vec<SafetyException> {
        self.user_list(user_id)
            .map(|list| {
                let list = list.lock();
                list.iter()
                    .filter(|s| s.exception.is_active_at(now))
                    .map(|s| s.exception.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every exception ever granted to a user, oldest first
    pub fn list_for_user(&self, user_id: &str) -> Vec<SafetyException> {
        self.user_list(user_id)
            .map(|list| {
                let list = list.lock();
                list.iter().map(|s| s.exception.clone()).collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, exception_id: &str) -> Option<SafetyException> {
        let lists: Vec<UserExceptions> = self.users.iter().map(|e| e.value().clone()).collect();
        lists.iter().find_map(|list| {
            let list = list.lock();
            let found = list
                .iter()
                .find(|s| s.exception.id == exception_id)
                .map(|s| s.exception.clone());
            found
        })
    }

    /// Revoke one exception; `None` if unknown or already revoked
    pub fn revoke(&self, exception_id: &str) -> Option<SafetyException> {
        let lists: Vec<UserExceptions> = self.users.iter().map(|e| e.value().clone()).collect();
        let now = Utc::now();

        let revoked = lists.iter().find_map(|list| {
            let mut list = list.lock();
            let stored = list
                .iter_mut()
                .find(|s| s.exception.id == exception_id && s.exception.revoked_at.is_none())?;
            stored.exception.revoked_at = Some(now);
            Some(stored.exception.clone())
        })?;

        self.emit_revoked(std::slice::from_ref(&revoked));
        Some(revoked)
    }

    /// Revoke all of a user's active exceptions
    pub fn revoke_for_user(&self, user_id: &str) -> Vec<SafetyException> {
        self.revoke_matching(user_id, |_| true)
    }

    /// Revoke active exceptions granted under a less restrictive age group
    pub fn revoke_less_restrictive_than(&self, user_id: &str, age_group: AgeGroup) -> Vec<SafetyException> {
        self.revoke_matching(user_id, |e| e.age_group.is_less_restrictive_than(age_group))
    }

    fn revoke_matching<F>(&self, user_id: &str, predicate: F) -> Vec<SafetyException>
    where
        F: Fn(&SafetyException) -> bool,
    {
        let Some(list) = self.user_list(user_id) else {
            return Vec::new();
        };
        let now = Utc::now();

        let revoked: Vec<SafetyException> = {
            let mut list = list.lock();
            list.iter_mut()
                .filter(|s| s.exception.is_active_at(now) && predicate(&s.exception))
                .map(|s| {
                    s.exception.revoked_at = Some(now);
                    s.exception.clone()
                })
                .collect()
        };

        self.emit_revoked(&revoked);
        revoked
    }

    fn emit_revoked(&self, revoked: &[SafetyException]) {
        for exception in revoked {
            info!(
                exception_id = %exception.id,
                user_id = %exception.user_id,
                "safety exception revoked"
            );
            self.events.emit(SafetyEvent::ExceptionRevoked {
                exception_id: exception.id.clone(),
                user_id: exception.user_id.clone(),
            });
        }
    }

    /// Total number of stored exceptions, active or not
    pub fn len(&self) -> usize {
        let lists: Vec<UserExceptions> = self.users.iter().map(|e| e.value().clone()).collect();
        lists.iter().map(|list| list.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ExceptionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExceptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionStore")
            .field("users", &self.users.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ExceptionStore {
        ExceptionStore::new()
    }

    #[test]
    fn test_exact_match_only() {
        let store = store();
        store
            .grant(ExceptionGrant::new("kid", "Tell me about sharks.", AgeGroup::Child))
            .unwrap();

        let now = Utc::now();
        assert!(store
            .find_and_consume("kid", "  tell me about SHARKS.  ", ContentType::VoiceInput, now)
            .is_some());
        assert!(store
            .find_and_consume("kid", "tell me about sharks. and knives", ContentType::VoiceInput, now)
            .is_none());
        // Regex metacharacters in content are literal
        assert!(store
            .find_and_consume("kid", "Tell me about sharksX", ContentType::VoiceInput, now)
            .is_none());
        assert!(store
            .find_and_consume("other", "tell me about sharks.", ContentType::VoiceInput, now)
            .is_none());
    }

    #[test]
    fn test_usage_exhausts() {
        let store = store();
        store
            .grant(ExceptionGrant::new("kid", "dragons fight", AgeGroup::Child).with_max_usage(2))
            .unwrap();

        let now = Utc::now();
        let first = store
            .find_and_consume("kid", "dragons fight", ContentType::VoiceInput, now)
            .unwrap();
        assert_eq!(first.usage_count, 1);
        let second = store
            .find_and_consume("kid", "dragons fight", ContentType::VoiceInput, now)
            .unwrap();
        assert_eq!(second.usage_count, 2);
        assert!(store
            .find_and_consume("kid", "dragons fight", ContentType::VoiceInput, now)
            .is_none());

        // Still listed for audit
        assert_eq!(store.list_for_user("kid").len(), 1);
        assert!(store.active_for_user("kid", now).is_empty());
    }

    #[test]
    fn test_expiry_and_context() {
        let store = store();
        store
            .grant(
                ExceptionGrant::new("kid", "dragons fight", AgeGroup::Child)
                    .with_duration(Some(Duration::minutes(10)))
                    .with_contexts([ContentType::TextOutput]),
            )
            .unwrap();

        let now = Utc::now();
        assert!(store
            .find_and_consume("kid", "dragons fight", ContentType::VoiceInput, now)
            .is_none());
        assert!(store
            .find_and_consume("kid", "dragons fight", ContentType::TextOutput, now + Duration::minutes(11))
            .is_none());
        assert!(store
            .find_and_consume("kid", "dragons fight", ContentType::TextOutput, now)
            .is_some());
    }

    #[test]
    fn test_revocation_emits_events() {
        let events = NotificationHub::new();
        let mut rx = events.subscribe();
        let store = ExceptionStore::new().with_events(events);

        let teen = store
            .grant(ExceptionGrant::new("kid", "one", AgeGroup::Teen))
            .unwrap();
        store
            .grant(ExceptionGrant::new("kid", "two", AgeGroup::Child))
            .unwrap();

        let revoked = store.revoke_less_restrictive_than("kid", AgeGroup::Child);
        assert_eq!(revoked.len(), 1);
        assert_eq!(revoked[0].id, teen.id);
        assert!(store.revoke(&teen.id).is_none());
        assert_eq!(store.revoke_for_user("kid").len(), 1);

        let names: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.name())
            .collect();
        assert_eq!(
            names,
            vec!["exception_created", "exception_created", "exception_revoked", "exception_revoked"]
        );
    }

    #[test]
    fn test_grant_validation() {
        let store = store();
        assert!(store.grant(ExceptionGrant::new("kid", "   ", AgeGroup::Child)).is_err());
        assert!(store
            .grant(ExceptionGrant::new("kid", "x", AgeGroup::Child).with_max_usage(0))
            .is_err());
        assert!(store.is_empty());
    }
}
