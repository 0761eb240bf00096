//! Compiled, immutable rule snapshot
//!
//! A [`RuleSet`] is what the pipeline evaluates against. The store rebuilds one
//! on every mutation and publishes it atomically; readers hold an `Arc` to the
//! version they started with.

use nestguard_core::{
    AgeGroup, AgeGroupPolicy, ContentType, GuardError, GuardResult, RuleCategory, SafetyRule,
};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;

use crate::catalog::TopicCatalog;

/// Compiled program size limit per pattern
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Compile a rule or topic pattern (case-insensitive)
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
}

/// A rule with its compiled pattern
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: SafetyRule,
    pub regex: Regex,
}

/// Immutable snapshot of rules, policies and topics
#[derive(Debug, Clone)]
pub struct RuleSet {
    version: u64,
    rules: Vec<CompiledRule>,
    policies: BTreeMap<AgeGroup, AgeGroupPolicy>,
    topics: BTreeMap<String, Vec<Regex>>,
}

impl RuleSet {
    /// Compile everything; fails on the first bad pattern
    pub fn build<'a>(
        version: u64,
        rules: impl IntoIterator<Item = &'a SafetyRule>,
        policies: &BTreeMap<AgeGroup, AgeGroupPolicy>,
        topics: &TopicCatalog,
    ) -> GuardResult<Self> {
        let mut compiled = Vec::new();
        for rule in rules {
            let regex = compile_pattern(&rule.pattern).map_err(|e| {
                GuardError::invalid_rule(format!("rule {}: pattern does not compile: {}", rule.id, e))
            })?;
            compiled.push(CompiledRule {
                rule: rule.clone(),
                regex,
            });
        }

        let mut topic_matchers = BTreeMap::new();
        for (name, patterns) in topics {
            let regexes = patterns
                .iter()
                .map(|p| compile_pattern(p))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| GuardError::config(format!("topic {}: pattern does not compile: {}", name, e)))?;
            topic_matchers.insert(name.clone(), regexes);
        }

        let mut policies = policies.clone();
        for age in AgeGroup::ALL {
            policies
                .entry(age)
                .or_insert_with(|| AgeGroupPolicy::default_for(age));
        }

        Ok(Self {
            version,
            rules: compiled,
            policies,
            topics: topic_matchers,
        })
    }

    /// Empty rule set with default policies
    pub fn empty() -> Self {
        Self {
            version: 0,
            rules: Vec::new(),
            policies: AgeGroup::ALL
                .into_iter()
                .map(|age| (age, AgeGroupPolicy::default_for(age)))
                .collect(),
            topics: BTreeMap::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Enabled rules of a category that apply to this age and content type
    pub fn applicable(
        &self,
        category: RuleCategory,
        age: AgeGroup,
        content_type: ContentType,
    ) -> impl Iterator<Item = &CompiledRule> {
        self.rules
            .iter()
            .filter(move |c| c.rule.category == category && c.rule.applies_to(age, content_type))
    }

    pub fn policy(&self, age: AgeGroup) -> &AgeGroupPolicy {
        // build() fills every age group
        &self.policies[&age]
    }

    /// Compiled matchers of a topic; empty when the topic is unknown
    pub fn topic_matchers(&self, topic: &str) -> &[Regex] {
        self.topics.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestguard_core::{RuleAction, RuleDraft, Severity};

    #[test]
    fn test_build_fills_missing_policies() {
        let set = RuleSet::build(3, [], &BTreeMap::new(), &TopicCatalog::new()).unwrap();
        assert_eq!(set.version(), 3);
        assert_eq!(set.policy(AgeGroup::Teen).max_complexity, 65);
        assert!(set.topic_matchers("violence").is_empty());
    }

    #[test]
    fn test_build_rejects_bad_pattern() {
        let rule = SafetyRule::from_draft(
            "r1",
            RuleDraft::new("broken", "(unclosed", RuleAction::Block, Severity::High),
        );
        let err = RuleSet::build(1, [&rule], &BTreeMap::new(), &TopicCatalog::new()).unwrap_err();
        assert!(err.to_string().contains("r1"));
    }

    #[test]
    fn test_applicable_respects_scope() {
        let rule = SafetyRule::from_draft(
            "r1",
            RuleDraft::new("teen-only", "skip school", RuleAction::Warn, Severity::Low)
                .with_age_groups([AgeGroup::Teen]),
        );
        let set = RuleSet::build(1, [&rule], &BTreeMap::new(), &TopicCatalog::new()).unwrap();

        let teen: Vec<_> = set
            .applicable(RuleCategory::Custom, AgeGroup::Teen, ContentType::VoiceInput)
            .collect();
        assert_eq!(teen.len(), 1);
        assert!(teen[0].regex.is_match("I want to SKIP SCHOOL"));
        assert_eq!(
            set.applicable(RuleCategory::Custom, AgeGroup::Child, ContentType::VoiceInput)
                .count(),
            0
        );
    }
}
