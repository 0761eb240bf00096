//! Rule validation and conflict detection
//!
//! Validation errors reject a rule. Conflicts are only warnings: the store
//! accepts the rule and reports what looks contradictory.

use nestguard_core::{GuardError, GuardResult, RuleDraft, SafetyRule};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::ruleset::compile_pattern;

/// Group containing an unbounded quantifier, itself repeated without bound
fn nested_quantifier() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\([^()]*(?:[+*]|\{\d+,\})[^()]*\)(?:[+*]|\{\d+,\})")
            .expect("nested quantifier heuristic is a valid regex")
    })
}

/// Whether a pattern has the nested-quantifier shape that backtracks badly
pub fn has_catastrophic_backtracking(pattern: &str) -> bool {
    nested_quantifier().is_match(pattern)
}

/// Reject drafts that cannot be stored
pub fn validate_draft(draft: &RuleDraft) -> GuardResult<()> {
    if draft.name.trim().is_empty() {
        return Err(GuardError::invalid_rule("name must not be empty"));
    }
    if draft.pattern.trim().is_empty() {
        return Err(GuardError::invalid_rule(format!(
            "rule '{}': pattern must not be empty",
            draft.name
        )));
    }
    if draft.age_groups.is_empty() {
        return Err(GuardError::invalid_rule(format!(
            "rule '{}': at least one age group is required",
            draft.name
        )));
    }
    if draft.contexts.is_empty() {
        return Err(GuardError::invalid_rule(format!(
            "rule '{}': at least one context is required",
            draft.name
        )));
    }
    compile_pattern(&draft.pattern).map_err(|e| {
        GuardError::invalid_rule(format!(
            "rule '{}': pattern does not compile: {}",
            draft.name, e
        ))
    })?;
    if has_catastrophic_backtracking(&draft.pattern) {
        return Err(GuardError::invalid_rule(format!(
            "rule '{}': pattern nests unbounded quantifiers: {}",
            draft.name, draft.pattern
        )));
    }
    Ok(())
}

/// Kind of rule conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Same pattern, different action
    ContradictoryActions,
    /// Overlapping patterns and age scope, one enforcing and one advisory
    OverlappingScope,
}

/// A warning about two rules that disagree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConflict {
    pub kind: ConflictKind,
    pub rule_id: String,
    pub other_rule_id: String,
    pub message: String,
}

impl std::fmt::Display for RuleConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-> {}: {}", self.rule_id, self.other_rule_id, self.message)
    }
}

fn normalize(pattern: &str) -> String {
    pattern.trim().to_lowercase()
}

/// Conflicts between `rule` and the other stored rules
///
/// Only enabled rules can conflict.
pub fn detect_conflicts<'a>(
    rule: &SafetyRule,
    others: impl IntoIterator<Item = &'a SafetyRule>,
) -> Vec<RuleConflict> {
    let mut conflicts = Vec::new();
    if !rule.enabled {
        return conflicts;
    }
    let pattern = normalize(&rule.pattern);

    for other in others {
        if other.id == rule.id || !other.enabled {
            continue;
        }
        let other_pattern = normalize(&other.pattern);

        if pattern == other_pattern {
            if other.action != rule.action {
                conflicts.push(RuleConflict {
                    kind: ConflictKind::ContradictoryActions,
                    rule_id: rule.id.clone(),
                    other_rule_id: other.id.clone(),
                    message: format!(
                        "identical pattern with actions {} and {}",
                        rule.action, other.action
                    ),
                });
            }
            continue;
        }

        let patterns_overlap =
            pattern.contains(other_pattern.as_str()) || other_pattern.contains(pattern.as_str());
        let ages_overlap = !rule.age_groups.is_disjoint(&other.age_groups);
        let contradictory = rule.action.is_enforcing() != other.action.is_enforcing();

        if patterns_overlap && ages_overlap && contradictory {
            let shared: Vec<String> = rule
                .age_groups
                .intersection(&other.age_groups)
                .map(|a| a.to_string())
                .collect();
            conflicts.push(RuleConflict {
                kind: ConflictKind::OverlappingScope,
                rule_id: rule.id.clone(),
                other_rule_id: other.id.clone(),
                message: format!(
                    "overlapping patterns for [{}] with actions {} and {}",
                    shared.join(", "),
                    rule.action,
                    other.action
                ),
            });
        }
    }

    conflicts
}
