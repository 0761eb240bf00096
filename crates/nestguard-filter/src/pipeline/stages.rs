//! Individual pipeline stages
//!
//! Each stage reads the snapshot and appends to [`Findings`]; none of them
//! looks at what earlier stages found.

use nestguard_core::{
    AgeGroup, AgeGroupPolicy, ContentType, RuleAction, RuleCategory, Severity, Violation,
    ViolationKind,
};

use super::context::is_hostile;
use crate::ruleset::{CompiledRule, RuleSet};

/// Accumulated stage output
#[derive(Debug, Default)]
pub struct Findings {
    pub violations: Vec<Violation>,
    pub flags: Vec<String>,
    /// Byte spans to replace in sanitized output
    pub spans: Vec<(usize, usize)>,
    /// A violation that span replacement cannot fix was recorded
    pub unresolvable: bool,
}

impl Findings {
    fn push(&mut self, violation: Violation, resolvable: bool) {
        if !resolvable {
            self.unresolvable = true;
        }
        self.violations.push(violation);
    }

    fn flag(&mut self, rule: &CompiledRule) {
        self.flags.push(rule.rule.name.clone());
    }
}

/// Inputs shared by all stages
pub struct StageInput<'a> {
    pub content: &'a str,
    pub age_group: AgeGroup,
    pub content_type: ContentType,
    pub policy: &'a AgeGroupPolicy,
    pub rules: &'a RuleSet,
}

fn describe(rule: &CompiledRule) -> String {
    if rule.rule.description.is_empty() {
        rule.rule.name.clone()
    } else {
        rule.rule.description.clone()
    }
}

/// Profanity tier re-mapped for the age group
pub fn remap_profanity(severity: Severity, age: AgeGroup) -> Severity {
    match age {
        AgeGroup::Child => severity.raise(),
        AgeGroup::Teen => severity,
        AgeGroup::Adult => match severity {
            Severity::Medium => Severity::Low,
            Severity::High => Severity::Medium,
            other => other,
        },
    }
}

/// Stage 1: tiered word lists
pub fn profanity(input: &StageInput<'_>, findings: &mut Findings) {
    for rule in input
        .rules
        .applicable(RuleCategory::Profanity, input.age_group, input.content_type)
    {
        let spans: Vec<(usize, usize)> = rule
            .regex
            .find_iter(input.content)
            .map(|m| (m.start(), m.end()))
            .collect();
        let Some(&(start, end)) = spans.first() else {
            continue;
        };
        if rule.rule.action == RuleAction::Flag {
            findings.flag(rule);
            continue;
        }

        findings.spans.extend(spans);
        let severity = remap_profanity(rule.rule.severity, input.age_group);
        findings.push(
            Violation::new(ViolationKind::Profanity, severity, describe(rule))
                .with_rule(rule.rule.id.clone())
                .with_span(start, end),
            true,
        );
    }
}

/// Stage 2: blocked topics from the policy, then topic-category rules
///
/// Allowed topics are advisory and never block.
pub fn topics(input: &StageInput<'_>, findings: &mut Findings) {
    let severity = if input.policy.strict_mode {
        Severity::High
    } else {
        Severity::Medium
    };

    for topic in &input.policy.blocked_topics {
        let hit = input
            .rules
            .topic_matchers(topic)
            .iter()
            .find_map(|re| re.find(input.content));
        if let Some(m) = hit {
            findings.push(
                Violation::new(
                    ViolationKind::InappropriateTopic,
                    severity,
                    format!("blocked topic '{}'", topic),
                )
                .with_span(m.start(), m.end()),
                false,
            );
        }
    }

    for rule in input
        .rules
        .applicable(RuleCategory::Topic, input.age_group, input.content_type)
    {
        let Some(m) = rule.regex.find(input.content) else {
            continue;
        };
        if rule.rule.action == RuleAction::Flag {
            findings.flag(rule);
            continue;
        }
        findings.push(
            Violation::new(ViolationKind::InappropriateTopic, rule.rule.severity, describe(rule))
                .with_rule(rule.rule.id.clone())
                .with_span(m.start(), m.end()),
            false,
        );
    }
}

/// Stage 3: imperative harm matchers, always high
pub fn harmful_instructions(input: &StageInput<'_>, findings: &mut Findings) {
    for rule in input.rules.applicable(
        RuleCategory::HarmfulInstruction,
        input.age_group,
        input.content_type,
    ) {
        if let Some(m) = rule.regex.find(input.content) {
            findings.push(
                Violation::new(ViolationKind::HarmfulInstruction, Severity::High, describe(rule))
                    .with_rule(rule.rule.id.clone())
                    .with_span(m.start(), m.end()),
                false,
            );
        }
    }
}

/// `avgWordLen * 5 + avgSentenceLen * 2`, clamped to 0..=100
pub fn complexity_score(content: &str) -> f32 {
    let word_lengths: Vec<usize> = content
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).count())
        .filter(|len| *len > 0)
        .collect();
    if word_lengths.is_empty() {
        return 0.0;
    }

    let sentences = content
        .split(['.', '!', '?'])
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .count()
        .max(1);

    let words = word_lengths.len() as f32;
    let avg_word_len = word_lengths.iter().sum::<usize>() as f32 / words;
    let avg_sentence_len = words / sentences as f32;
    (avg_word_len * 5.0 + avg_sentence_len * 2.0).clamp(0.0, 100.0)
}

/// Stage 4: language complexity against the age ceiling, always low
pub fn complexity(input: &StageInput<'_>, findings: &mut Findings) {
    let score = complexity_score(input.content);
    let ceiling = input.policy.max_complexity as f32;
    if score > ceiling {
        findings.push(
            Violation::new(
                ViolationKind::LanguageComplexity,
                Severity::Low,
                format!("complexity {:.0} exceeds {}", score, input.policy.max_complexity),
            ),
            true,
        );
    }
}

/// Stage 5: hostile content following negative history
pub fn conversation(input: &StageInput<'_>, negative_history: bool, findings: &mut Findings) {
    if negative_history && is_hostile(input.content) {
        findings.push(
            Violation::new(
                ViolationKind::ContextEscalation,
                Severity::Medium,
                "hostile message after a negative conversation",
            ),
            false,
        );
    }
}

/// Stage 6: operator-defined custom rules
pub fn policy_rules(input: &StageInput<'_>, findings: &mut Findings) {
    let strict = input.policy.strict_mode;

    for rule in input
        .rules
        .applicable(RuleCategory::Custom, input.age_group, input.content_type)
    {
        let spans: Vec<(usize, usize)> = rule
            .regex
            .find_iter(input.content)
            .map(|m| (m.start(), m.end()))
            .collect();
        let Some(&(start, end)) = spans.first() else {
            continue;
        };

        let (severity, resolvable) = match rule.rule.action {
            RuleAction::Block => (rule.rule.severity, false),
            RuleAction::Sanitize => {
                findings.spans.extend(spans);
                (rule.rule.severity, true)
            }
            RuleAction::Warn if strict => (rule.rule.severity, true),
            RuleAction::Warn => (Severity::Low, true),
            RuleAction::Flag if strict => (Severity::Low, true),
            RuleAction::Flag => {
                findings.flag(rule);
                continue;
            }
        };

        findings.push(
            Violation::new(ViolationKind::PolicyRule, severity, describe(rule))
                .with_rule(rule.rule.id.clone())
                .with_span(start, end),
            resolvable,
        );
    }
}
