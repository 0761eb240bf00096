//! Content Filter Pipeline - Multi-stage rule evaluation
//!
//! Stages run in a fixed order and never short-circuit:
//! 1. Profanity (severity re-mapped per age group)
//! 2. Blocked topics
//! 3. Harmful instructions (always high)
//! 4. Language complexity (always low)
//! 5. Conversational escalation
//! 6. Custom policy rules
//!
//! The verdict is a pure function of the content, the rule-set snapshot, the
//! evaluation context and the history bit. Sanitized text is produced for
//! text output only; input is either allowed or blocked.

pub mod context;
pub mod sanitize;
pub mod stages;

use nestguard_core::{
    AgeGroup, ContentType, Direction, FilterSettings, GuardError, GuardResult, RiskLevel,
    Severity, ValidationVerdict, Violation, ViolationKind,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::ruleset::RuleSet;
use crate::store::RuleStore;
use sanitize::replace_spans;
use stages::{Findings, StageInput};

/// Who is being evaluated and in what context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationContext {
    pub age_group: AgeGroup,
    pub content_type: ContentType,
    /// Recent history carries negative emotional markers
    pub negative_history: bool,
}

impl EvaluationContext {
    pub fn new(age_group: AgeGroup, content_type: ContentType) -> Self {
        Self {
            age_group,
            content_type,
            negative_history: false,
        }
    }

    pub fn for_direction(age_group: AgeGroup, direction: Direction) -> Self {
        Self::new(age_group, direction.content_type())
    }

    pub fn with_negative_history(mut self, negative: bool) -> Self {
        self.negative_history = negative;
        self
    }
}

/// Allowed iff no violations, or all low and (not a child, or at most one)
pub fn is_allowed(violations: &[Violation], age: AgeGroup) -> bool {
    if violations.is_empty() {
        return true;
    }
    let all_low = violations.iter().all(|v| v.severity == Severity::Low);
    all_low && (age != AgeGroup::Child || violations.len() <= 1)
}

/// `max(0.1, 1 - 0.2 * count)`
pub fn confidence(violation_count: usize) -> f32 {
    (1.0 - 0.2 * violation_count as f32).max(0.1)
}

/// Runs the stages against the store's current snapshot
pub struct ContentFilterPipeline {
    store: Arc<RuleStore>,
    settings: FilterSettings,
}

impl ContentFilterPipeline {
    pub fn new(store: Arc<RuleStore>, settings: FilterSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    /// Evaluate against the current snapshot
    pub fn evaluate(&self, content: &str, ctx: &EvaluationContext) -> GuardResult<ValidationVerdict> {
        let rules = self.store.snapshot();
        self.evaluate_with(&rules, content, ctx)
    }

    /// Evaluate against a specific snapshot
    ///
    /// Oversized content is an [`GuardError::Evaluation`]; callers turn it into
    /// a fail-safe verdict.
    pub fn evaluate_with(
        &self,
        rules: &RuleSet,
        content: &str,
        ctx: &EvaluationContext,
    ) -> GuardResult<ValidationVerdict> {
        if content.len() > self.settings.max_content_bytes {
            return Err(GuardError::evaluation(format!(
                "content is {} bytes, limit is {}",
                content.len(),
                self.settings.max_content_bytes
            )));
        }

        let started = Instant::now();
        let input = StageInput {
            content,
            age_group: ctx.age_group,
            content_type: ctx.content_type,
            policy: rules.policy(ctx.age_group),
            rules,
        };

        let mut findings = Findings::default();
        stages::profanity(&input, &mut findings);
        stages::topics(&input, &mut findings);
        stages::harmful_instructions(&input, &mut findings);
        stages::complexity(&input, &mut findings);
        stages::conversation(&input, ctx.negative_history, &mut findings);
        stages::policy_rules(&input, &mut findings);

        let allowed = is_allowed(&findings.violations, ctx.age_group);
        let risk_level = RiskLevel::from_violations(&findings.violations);

        let sanitized_text = if ctx.content_type == ContentType::TextOutput {
            self.sanitize(content, &findings, allowed)
        } else {
            None
        };

        let verdict = ValidationVerdict {
            allowed,
            risk_level,
            confidence: confidence(findings.violations.len()),
            violations: findings.violations,
            sanitized_text,
            processing_time_ms: started.elapsed().as_millis() as u64,
            rule_set_version: rules.version(),
            flags: findings.flags,
        };

        debug!(
            age_group = %ctx.age_group,
            content_type = %ctx.content_type,
            allowed = verdict.allowed,
            risk = %verdict.risk_level,
            violations = verdict.violations.len(),
            "content evaluated"
        );
        Ok(verdict)
    }

    /// Output text to speak instead of the original, if it differs
    fn sanitize(&self, content: &str, findings: &Findings, allowed: bool) -> Option<String> {
        let refuse = findings
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::HarmfulInstruction || v.severity.is_severe())
            || (!allowed && findings.unresolvable);

        if refuse {
            Some(self.settings.safe_refusal.clone())
        } else if !findings.spans.is_empty() {
            Some(replace_spans(content, &findings.spans, &self.settings.placeholder))
        } else {
            None
        }
    }
}

impl std::fmt::Debug for ContentFilterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentFilterPipeline")
            .field("store", &self.store)
            .field("max_content_bytes", &self.settings.max_content_bytes)
            .finish()
    }
}
