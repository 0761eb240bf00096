//! Safety Gateway - Single entry point for every validation
//!
//! A validation call runs, in order:
//! 1. Reserve the audit sequence (per-user audit order = call order)
//! 2. Resolve the age group (unknown users are treated as children)
//! 3. Apply a matching parent-granted exception, bypassing cache and filter
//! 4. Consult the verdict cache, then the filter pipeline on a miss
//! 5. Request parental review for disallowed, supervised content
//! 6. Write the audit entry
//!
//! Evaluation failures, including panics inside the pipeline, never reach the
//! caller: input fails safe to blocked, output to the safe-refusal message.

use chrono::Utc;
use nestguard_audit::{AuditLog, AuditSink, FileSink};
use nestguard_core::{
    AgeGroup, AuditEventType, AuditFilter, ContentType, Direction, FilterSettings, GuardConfig,
    GuardError, GuardResult, GuardSpec, NotificationHub, NotificationListener, RiskLevel,
    SafetyAuditEntry, SafetyEvent, SafetyException, SafetyReport, TimeRange, ValidationVerdict,
    ANONYMOUS_USER,
};
use nestguard_filter::{
    has_negative_signal, CacheKey, CacheStats, ConfigurationDocument, ContentFilterPipeline,
    EvaluationContext, RuleStore, ValidationCache,
};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::approval::{ApprovalWorkflow, DecisionInput};
use crate::directory::{InMemoryUserDirectory, UserDirectory};
use crate::exceptions::ExceptionStore;

/// What the caller should do with a piece of text
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    pub verdict: ValidationVerdict,
    pub direction: Direction,
    /// Text to act on or speak; `None` when input is blocked
    pub text: Option<String>,
    /// Friendly message to give the child instead
    pub refusal_message: Option<String>,
    pub review_request_id: Option<String>,
    pub exception_id: Option<String>,
    /// Verdict came from the cache
    pub cached: bool,
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        self.verdict.allowed
    }

    pub fn is_blocked(&self) -> bool {
        self.text.is_none()
    }
}

/// Point-in-time counters for dashboards and the CLI
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub rule_set_version: u64,
    pub rules: usize,
    pub validations: u64,
    pub blocked: u64,
    pub errors: u64,
    pub exceptions_applied: u64,
    pub cache: CacheStats,
    pub audit_entries: usize,
    pub audit_users: usize,
    pub pending_reviews: usize,
    pub review_requests: usize,
    pub exceptions: usize,
}

#[derive(Debug, Default)]
struct Counters {
    validations: AtomicU64,
    blocked: AtomicU64,
    errors: AtomicU64,
    exceptions_applied: AtomicU64,
}

/// Orchestrates rules, filter, cache, audit and parental approval
pub struct SafetyGateway {
    store: Arc<RuleStore>,
    pipeline: ContentFilterPipeline,
    cache: Arc<ValidationCache>,
    audit: Arc<AuditLog>,
    approval: Arc<ApprovalWorkflow>,
    directory: Arc<dyn UserDirectory>,
    events: NotificationHub,
    counters: Counters,
}

/// Outcome of the cache + pipeline step
enum Evaluation {
    Verdict { verdict: ValidationVerdict, cached: bool },
    Failed { verdict: ValidationVerdict, message: String },
}

impl SafetyGateway {
    pub fn builder(spec: GuardSpec) -> GatewayBuilder {
        GatewayBuilder::new(spec)
    }

    /// Build from a configuration document
    ///
    /// Loads `rulesFile` when set (otherwise the built-in catalog) and attaches
    /// a JSON-lines audit sink when `audit.sink` is set. Must run inside a
    /// tokio runtime when a sink is configured.
    pub async fn from_config(config: &GuardConfig) -> GuardResult<Self> {
        config.validate()?;
        let mut builder = GatewayBuilder::new(config.spec.clone());

        if let Some(ref path) = config.spec.rules_file {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| GuardError::config(format!("Failed to read rules file {}: {}", path, e)))?;
            let doc = ConfigurationDocument::parse(&text)?;
            builder = builder.rule_store(Arc::new(RuleStore::from_document(doc)?));
        }

        if let Some(ref path) = config.spec.audit.sink {
            let sink = FileSink::new(path).await?;
            builder = builder.audit_sink(Arc::new(sink));
        }

        info!(name = config.name(), "building safety gateway from config");
        Ok(builder.build())
    }

    pub fn rule_store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &ContentFilterPipeline {
        &self.pipeline
    }

    pub fn cache(&self) -> &Arc<ValidationCache> {
        &self.cache
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn approval(&self) -> &Arc<ApprovalWorkflow> {
        &self.approval
    }

    pub fn exceptions(&self) -> &Arc<ExceptionStore> {
        self.approval.exceptions()
    }

    pub fn events(&self) -> &NotificationHub {
        &self.events
    }

    fn settings(&self) -> &FilterSettings {
        self.pipeline.settings()
    }

    /// Validate something the child said or typed; may hard-block
    pub fn validate_input(&self, text: &str, user_id: &str) -> GateDecision {
        self.validate(text, user_id, Direction::Input)
    }

    /// Validate something the device would say; always returns usable text
    pub fn validate_output(&self, text: &str, user_id: &str) -> GateDecision {
        self.validate(text, user_id, Direction::Output)
    }

    /// Yes/no check for collaborators that only need a boolean
    ///
    /// Evaluated as device output, audited under [`ANONYMOUS_USER`], never
    /// opens a review request.
    pub fn validate_child_safe(&self, text: &str, age_group: AgeGroup) -> bool {
        let sequence = self.audit.reserve_sequence();
        let direction = Direction::Output;
        let ctx = EvaluationContext::for_direction(age_group, direction);

        let decision = match self.evaluate(text, ANONYMOUS_USER, &ctx, direction) {
            Evaluation::Verdict { verdict, cached } => {
                self.finish(sequence, text, ANONYMOUS_USER, direction, verdict, None, cached)
            }
            Evaluation::Failed { verdict, message } => {
                self.fail_safe(sequence, text, ANONYMOUS_USER, direction, verdict, message)
            }
        };
        decision.verdict.allowed
    }

    fn validate(&self, text: &str, user_id: &str, direction: Direction) -> GateDecision {
        let sequence = self.audit.reserve_sequence();
        let user_id = normalize_user(user_id);
        let age_group = self.resolve_age_group(user_id);
        let content_type = direction.content_type();
        self.counters.validations.fetch_add(1, Ordering::Relaxed);

        if let Some(exception) =
            self.exceptions()
                .find_and_consume(user_id, text, content_type, Utc::now())
        {
            return self.apply_exception(sequence, text, user_id, direction, exception);
        }

        let negative_history = self.has_negative_history(user_id);
        let ctx = EvaluationContext::new(age_group, content_type).with_negative_history(negative_history);

        let (verdict, cached) = match self.evaluate(text, user_id, &ctx, direction) {
            Evaluation::Verdict { verdict, cached } => (verdict, cached),
            Evaluation::Failed { verdict, message } => {
                return self.fail_safe(sequence, text, user_id, direction, verdict, message);
            }
        };

        let review_request_id = if self.needs_review(&verdict, age_group) {
            let request = self.approval.request_review(
                user_id,
                age_group,
                text,
                verdict.violations.clone(),
                verdict.risk_level,
            );
            Some(request.id)
        } else {
            None
        };

        self.finish(sequence, text, user_id, direction, verdict, review_request_id, cached)
    }

    fn resolve_age_group(&self, user_id: &str) -> AgeGroup {
        match self.directory.age_group(user_id) {
            Some(age) => age,
            None => {
                debug!(user_id, "unknown user, using most restrictive age group");
                AgeGroup::most_restrictive()
            }
        }
    }

    fn has_negative_history(&self, user_id: &str) -> bool {
        let recent: Vec<String> = self
            .audit
            .recent_for_user(user_id, self.settings().history_window)
            .into_iter()
            .filter(|e| e.direction == Some(Direction::Input))
            .map(|e| e.original_content)
            .collect();
        has_negative_signal(&recent)
    }

    fn needs_review(&self, verdict: &ValidationVerdict, age_group: AgeGroup) -> bool {
        !verdict.allowed
            && age_group != AgeGroup::Adult
            && self.store.snapshot().policy(age_group).supervision_required
    }

    /// Cache lookup, then the pipeline with panics contained
    fn evaluate(
        &self,
        text: &str,
        user_id: &str,
        ctx: &EvaluationContext,
        direction: Direction,
    ) -> Evaluation {
        let rules = self.store.snapshot();
        let key = CacheKey::new(
            text,
            user_id,
            ctx.age_group,
            direction,
            rules.version(),
            ctx.negative_history,
        );

        if let Some(verdict) = self.cache.get(&key) {
            return Evaluation::Verdict { verdict, cached: true };
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.pipeline.evaluate_with(&rules, text, ctx)
        }));

        let message = match outcome {
            Ok(Ok(verdict)) => {
                self.cache.put(key, verdict.clone());
                return Evaluation::Verdict { verdict, cached: false };
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };

        let mut verdict = ValidationVerdict::fail_safe("content could not be evaluated", rules.version());
        if direction == Direction::Output {
            verdict.sanitized_text = Some(self.settings().safe_refusal.clone());
        }
        Evaluation::Failed { verdict, message }
    }

    fn apply_exception(
        &self,
        sequence: u64,
        text: &str,
        user_id: &str,
        direction: Direction,
        exception: SafetyException,
    ) -> GateDecision {
        self.counters.exceptions_applied.fetch_add(1, Ordering::Relaxed);
        let verdict = ValidationVerdict::clean(self.store.version());

        self.audit.log(
            SafetyAuditEntry::new(user_id, AuditEventType::ExceptionApplied, text)
                .with_sequence(sequence)
                .with_direction(direction)
                .with_rule_set_version(verdict.rule_set_version)
                .with_exception(&exception.id),
        );
        info!(
            user_id,
            exception_id = %exception.id,
            remaining = exception.remaining_uses(),
            "content allowed by safety exception"
        );

        GateDecision {
            verdict,
            direction,
            text: Some(self.output_or_refusal(text.to_string(), direction)),
            refusal_message: None,
            review_request_id: None,
            exception_id: Some(exception.id),
            cached: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        sequence: u64,
        text: &str,
        user_id: &str,
        direction: Direction,
        verdict: ValidationVerdict,
        review_request_id: Option<String>,
        cached: bool,
    ) -> GateDecision {
        let (acted_text, refusal_message) = match direction {
            Direction::Input if verdict.allowed => (Some(text.to_string()), None),
            Direction::Input => (None, Some(self.settings().input_refusal.clone())),
            Direction::Output => {
                let spoken = match verdict.sanitized_text {
                    Some(ref sanitized) => sanitized.clone(),
                    None if verdict.allowed => text.to_string(),
                    None => self.settings().safe_refusal.clone(),
                };
                let spoken = self.output_or_refusal(spoken, direction);
                let refused = spoken == self.settings().safe_refusal;
                (Some(spoken), refused.then(|| self.settings().safe_refusal.clone()))
            }
        };

        // Disallowed output replaced wholesale by the refusal counts as blocked
        let refused = refusal_message.is_some();
        let event_type = match direction {
            Direction::Input if verdict.allowed => AuditEventType::InputValidated,
            Direction::Input => AuditEventType::ContentBlocked,
            Direction::Output if !verdict.allowed && refused => AuditEventType::ContentBlocked,
            Direction::Output if verdict.sanitized_text.is_some() => AuditEventType::ContentSanitized,
            Direction::Output if !verdict.allowed => AuditEventType::ContentBlocked,
            Direction::Output => AuditEventType::OutputValidated,
        };
        if !verdict.allowed {
            self.counters.blocked.fetch_add(1, Ordering::Relaxed);
        }

        let mut entry = SafetyAuditEntry::new(user_id, event_type, text)
            .with_sequence(sequence)
            .with_direction(direction)
            .with_risk(verdict.risk_level)
            .with_reasons(verdict.blocked_reasons())
            .with_rule_set_version(verdict.rule_set_version)
            .with_review(review_request_id.clone());
        if let Some(ref processed) = acted_text {
            if processed != text {
                entry = entry.with_processed(processed.clone());
            }
        }
        self.audit.log(entry);

        debug!(
            user_id,
            direction = %direction,
            allowed = verdict.allowed,
            risk = %verdict.risk_level,
            cached,
            "validation complete"
        );

        GateDecision {
            verdict,
            direction,
            text: acted_text,
            refusal_message,
            review_request_id,
            exception_id: None,
            cached,
        }
    }

    fn fail_safe(
        &self,
        sequence: u64,
        text: &str,
        user_id: &str,
        direction: Direction,
        verdict: ValidationVerdict,
        message: String,
    ) -> GateDecision {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        self.counters.blocked.fetch_add(1, Ordering::Relaxed);
        error!(user_id, direction = %direction, error = %message, "validation failed, failing safe");

        let (acted_text, refusal_message) = match direction {
            Direction::Input => (None, self.settings().input_refusal.clone()),
            Direction::Output => (
                Some(self.settings().safe_refusal.clone()),
                self.settings().safe_refusal.clone(),
            ),
        };

        let mut entry = SafetyAuditEntry::new(user_id, AuditEventType::ValidationError, text)
            .with_sequence(sequence)
            .with_direction(direction)
            .with_risk(RiskLevel::High)
            .with_reasons(vec![message.clone()])
            .with_rule_set_version(verdict.rule_set_version);
        if let Some(ref spoken) = acted_text {
            entry = entry.with_processed(spoken.clone());
        }
        self.audit.log(entry);

        self.events.emit(SafetyEvent::ValidationError {
            user_id: user_id.to_string(),
            message,
        });

        GateDecision {
            verdict,
            direction,
            text: acted_text,
            refusal_message: Some(refusal_message),
            review_request_id: None,
            exception_id: None,
            cached: false,
        }
    }

    /// Output is never empty
    fn output_or_refusal(&self, text: String, direction: Direction) -> String {
        if direction == Direction::Output && text.trim().is_empty() {
            self.settings().safe_refusal.clone()
        } else {
            text
        }
    }

    /// Ask a parent to review content on behalf of a child or teen
    pub fn request_approval(&self, content: &str, user_id: &str) -> GuardResult<String> {
        let user_id = normalize_user(user_id);
        let age_group = self.resolve_age_group(user_id);
        if age_group == AgeGroup::Adult {
            return Err(GuardError::validation(format!(
                "user {} is an adult; parental approval does not apply",
                user_id
            )));
        }

        let ctx = EvaluationContext::new(age_group, ContentType::VoiceInput);
        let (violations, risk) = match self.pipeline.evaluate(content, &ctx) {
            Ok(verdict) => (verdict.violations, verdict.risk_level),
            Err(e) => {
                warn!(user_id, error = %e, "could not evaluate content for approval request");
                (Vec::new(), RiskLevel::High)
            }
        };

        let request = self
            .approval
            .request_review(user_id, age_group, content, violations, risk);
        Ok(request.id)
    }

    /// Record a parent's decision
    pub fn process_decision(&self, request_id: &str, approved: bool, reason: &str) -> GuardResult<()> {
        self.approval.process_decision(request_id, approved, reason)?;
        Ok(())
    }

    pub fn process_decision_with(&self, request_id: &str, input: DecisionInput) -> GuardResult<()> {
        self.approval.process_decision_with(request_id, input)?;
        Ok(())
    }

    pub fn get_audit_log(&self, range: &TimeRange, filter: &AuditFilter) -> Vec<SafetyAuditEntry> {
        self.audit.query(filter, range)
    }

    pub fn generate_report(&self, range: &TimeRange, user_id: Option<&str>) -> SafetyReport {
        self.audit.generate_report(range, user_id)
    }

    /// Change a user's age group
    ///
    /// Moving to a stricter group revokes exceptions granted under a more
    /// permissive one. Returns the revoked exceptions.
    pub fn set_user_age_group(&self, user_id: &str, age_group: AgeGroup) -> Vec<SafetyException> {
        let previous = self
            .directory
            .set_age_group(user_id, age_group)
            .unwrap_or_else(AgeGroup::most_restrictive);

        let revoked = self
            .exceptions()
            .revoke_less_restrictive_than(user_id, age_group);

        if previous != age_group {
            self.audit.log(
                SafetyAuditEntry::new(
                    user_id,
                    AuditEventType::AgeGroupChanged,
                    format!("{} -> {}", previous, age_group),
                )
                .with_reasons(revoked.iter().map(|e| format!("revoked exception {}", e.id)).collect()),
            );
            info!(user_id, from = %previous, to = %age_group, revoked = revoked.len(), "age group changed");
            self.events.emit(SafetyEvent::AgeGroupChanged {
                user_id: user_id.to_string(),
                from: previous,
                to: age_group,
            });
        }
        revoked
    }

    pub fn register_listener(&self, listener: Arc<dyn NotificationListener>) {
        self.events.register(listener);
    }

    pub fn stats(&self) -> GatewayStats {
        let rules = self.store.snapshot();
        GatewayStats {
            rule_set_version: rules.version(),
            rules: rules.rules().len(),
            validations: self.counters.validations.load(Ordering::Relaxed),
            blocked: self.counters.blocked.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            exceptions_applied: self.counters.exceptions_applied.load(Ordering::Relaxed),
            cache: self.cache.stats(),
            audit_entries: self.audit.len(),
            audit_users: self.audit.user_count(),
            pending_reviews: self.approval.pending_count(),
            review_requests: self.approval.len(),
            exceptions: self.exceptions().len(),
        }
    }
}

impl std::fmt::Debug for SafetyGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyGateway")
            .field("store", &self.store)
            .field("approval", &self.approval)
            .field("events", &self.events)
            .finish()
    }
}

fn normalize_user(user_id: &str) -> &str {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        ANONYMOUS_USER
    } else {
        trimmed
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic during evaluation: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic during evaluation: {}", s)
    } else {
        "panic during evaluation".to_string()
    }
}

/// Assembles a [`SafetyGateway`] from settings and injected collaborators
pub struct GatewayBuilder {
    spec: GuardSpec,
    store: Option<Arc<RuleStore>>,
    directory: Option<Arc<dyn UserDirectory>>,
    events: Option<NotificationHub>,
    audit_sink: Option<Arc<dyn AuditSink>>,
}

impl GatewayBuilder {
    pub fn new(spec: GuardSpec) -> Self {
        Self {
            spec,
            store: None,
            directory: None,
            events: None,
            audit_sink: None,
        }
    }

    /// Use this rule store instead of the built-in catalog
    ///
    /// Its change events are delivered to the gateway's listeners.
    pub fn rule_store(mut self, store: Arc<RuleStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn user_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Share an existing hub (listeners registered on it see gateway events)
    pub fn events(mut self, events: NotificationHub) -> Self {
        self.events = Some(events);
        self
    }

    /// Persist audit entries; `build` must then run inside a tokio runtime
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn build(self) -> SafetyGateway {
        // An injected store keeps its own hub; rule events reach the gateway's
        // listeners by adopting that hub or forwarding from it
        let (events, store) = match (self.events, self.store) {
            (Some(events), Some(store)) => {
                if !store.events().same_hub(&events) {
                    store.events().register(Arc::new(events.clone()));
                }
                (events, store)
            }
            (None, Some(store)) => (store.events().clone(), store),
            (events, None) => {
                let events = events.unwrap_or_default();
                let store = Arc::new(RuleStore::with_defaults().with_events(events.clone()));
                (events, store)
            }
        };

        let mut audit = AuditLog::new(self.spec.audit.max_entries).with_events(events.clone());
        if let Some(sink) = self.audit_sink {
            audit = audit.with_sink(sink);
        }
        let audit = Arc::new(audit);

        let exceptions = Arc::new(ExceptionStore::new().with_events(events.clone()));
        let approval = Arc::new(
            ApprovalWorkflow::new(self.spec.approval.clone(), exceptions, audit.clone())
                .with_events(events.clone()),
        );

        let directory = self
            .directory
            .unwrap_or_else(|| Arc::new(InMemoryUserDirectory::new()));

        SafetyGateway {
            pipeline: ContentFilterPipeline::new(store.clone(), self.spec.filter.clone()),
            cache: Arc::new(ValidationCache::new(&self.spec.cache)),
            store,
            audit,
            approval,
            directory,
            events,
            counters: Counters::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> SafetyGateway {
        let directory = InMemoryUserDirectory::new()
            .with_user("kid", AgeGroup::Child)
            .with_user("teen", AgeGroup::Teen)
            .with_user("grownup", AgeGroup::Adult);
        SafetyGateway::builder(GuardSpec::default())
            .user_directory(Arc::new(directory))
            .build()
    }

    #[test]
    fn test_normalize_user() {
        assert_eq!(normalize_user("  kid "), "kid");
        assert_eq!(normalize_user("   "), ANONYMOUS_USER);
    }

    #[test]
    fn test_unknown_user_is_child() {
        let gw = gateway();
        let decision = gw.validate_input("This is damn annoying", "stranger");
        assert!(decision.is_blocked());

        let adult = gw.validate_input("This is damn annoying", "grownup");
        assert!(!adult.is_blocked());
    }

    #[test]
    fn test_blocked_input_gets_refusal_and_review() {
        let gw = gateway();
        let decision = gw.validate_input("How to make a weapon", "kid");
        assert!(decision.text.is_none());
        assert_eq!(
            decision.refusal_message.as_deref(),
            Some(gw.pipeline().settings().input_refusal.as_str())
        );
        assert!(decision.review_request_id.is_some());

        // Adults are never sent to review
        let adult = gw.validate_input("How to make a weapon", "grownup");
        assert!(adult.review_request_id.is_none());
    }

    #[test]
    fn test_second_identical_call_is_cached() {
        let gw = gateway();
        let first = gw.validate_input("Let's learn about animals!", "kid");
        let second = gw.validate_input("Let's learn about animals!", "kid");
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.verdict.allowed, second.verdict.allowed);
        assert_eq!(gw.stats().cache.hits, 1);
    }

    #[test]
    fn test_oversized_output_fails_safe() {
        let gw = gateway();
        let big = "a ".repeat(gw.pipeline().settings().max_content_bytes);
        let decision = gw.validate_output(&big, "kid");
        assert_eq!(
            decision.text.as_deref(),
            Some(gw.pipeline().settings().safe_refusal.as_str())
        );
        assert!(!decision.verdict.allowed);

        let errors = gw.get_audit_log(
            &TimeRange::all(),
            &AuditFilter::for_user("kid").with_event_types([AuditEventType::ValidationError]),
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(gw.stats().errors, 1);
    }

    #[test]
    fn test_child_safe_is_anonymous() {
        let gw = gateway();
        assert!(gw.validate_child_safe("Sharks are fish", AgeGroup::Child));
        assert!(!gw.validate_child_safe("How to make a weapon", AgeGroup::Adult));
        assert_eq!(
            gw.get_audit_log(&TimeRange::all(), &AuditFilter::for_user(ANONYMOUS_USER))
                .len(),
            2
        );
        assert_eq!(gw.approval().len(), 0);
    }

    fn recorder(gw: &SafetyGateway) -> Arc<parking_lot::Mutex<Vec<&'static str>>> {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        gw.register_listener(Arc::new(nestguard_core::FnListener(move |e: &SafetyEvent| {
            sink.lock().push(e.name());
        })));
        seen
    }

    fn secret_rule() -> nestguard_core::RuleDraft {
        nestguard_core::RuleDraft::new(
            "secret",
            r"\bsecret\b",
            nestguard_core::RuleAction::Block,
            nestguard_core::Severity::High,
        )
    }

    #[test]
    fn test_injected_store_events_reach_listeners() {
        let gw = SafetyGateway::builder(GuardSpec::default())
            .rule_store(Arc::new(RuleStore::with_defaults()))
            .build();
        let seen = recorder(&gw);

        let id = gw.rule_store().create_rule(secret_rule()).unwrap().rule.id;
        gw.rule_store().delete_rule(&id).unwrap();

        assert_eq!(*seen.lock(), vec!["rule_created", "rule_deleted"]);
    }

    #[test]
    fn test_injected_store_and_hub_deliver_once() {
        let hub = NotificationHub::new();
        let gw = SafetyGateway::builder(GuardSpec::default())
            .rule_store(Arc::new(RuleStore::new()))
            .events(hub.clone())
            .build();
        let seen = recorder(&gw);

        gw.rule_store().create_rule(secret_rule()).unwrap();
        assert_eq!(*seen.lock(), vec!["rule_created"]);
    }
}
