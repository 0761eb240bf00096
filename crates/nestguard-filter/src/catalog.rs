//! Built-in rule catalog
//!
//! Ships the default profanity tiers, harmful-instruction matchers and the
//! topic catalog. Everything here is plain data loaded into a
//! [`RuleStore`](crate::RuleStore); operators can replace any of it through
//! import.

use nestguard_core::{RuleAction, RuleCategory, RuleDraft, Severity};
use std::collections::BTreeMap;

/// Topic name -> patterns (case-insensitive regex)
pub type TopicCatalog = BTreeMap<String, Vec<String>>;

/// Id prefix of built-in rules
pub const BUILTIN_PREFIX: &str = "builtin-";

/// Built-in rules with their stable ids
pub fn default_rules() -> Vec<(String, RuleDraft)> {
    let profanity = |tier: &str, pattern: &str, severity: Severity| {
        (
            format!("{}profanity-{}", BUILTIN_PREFIX, tier),
            RuleDraft::new(format!("profanity-{}", tier), pattern, RuleAction::Sanitize, severity)
                .with_category(RuleCategory::Profanity)
                .with_description(format!("{} profanity", tier)),
        )
    };

    let harmful = |name: &str, pattern: &str, description: &str| {
        (
            format!("{}harmful-{}", BUILTIN_PREFIX, name),
            RuleDraft::new(format!("harmful-{}", name), pattern, RuleAction::Block, Severity::High)
                .with_category(RuleCategory::HarmfulInstruction)
                .with_description(description),
        )
    };

    vec![
        profanity(
            "mild",
            r"\b(?:damn(?:it)?|dammit|crap(?:py)?|pissed)\b",
            Severity::Low,
        ),
        profanity(
            "moderate",
            r"\b(?:hell|ass(?:hole)?s?|bastards?|bitch(?:es|y)?|piss)\b",
            Severity::Medium,
        ),
        profanity(
            "severe",
            r"\b(?:f+u+c+k\w*|shit\w*|motherf\w+|cunts?)\b",
            Severity::High,
        ),
        harmful(
            "make-dangerous",
            r"\bhow\s+(?:do\s+(?:i|you)\s+|can\s+i\s+)?(?:to\s+)?(?:make|build)\s+(?:a\s+|an\s+|some\s+)?(?:weapons?|bombs?|guns?|explosives?|poisons?|drugs?|fire)\b",
            "instructions for making something dangerous",
        ),
        harmful(
            "hurt",
            r"\bhow\s+(?:do\s+(?:i|you)\s+|can\s+i\s+)?(?:to\s+)?(?:hurt|harm|kill|injure|poison)\b",
            "instructions for hurting someone",
        ),
        harmful(
            "ways-to-hurt",
            r"\bways?\s+to\s+(?:hurt|harm|kill|injure)\b",
            "instructions for hurting someone",
        ),
    ]
}

/// Built-in topic catalog referenced by the default policies
pub fn default_topics() -> TopicCatalog {
    let topics: [(&str, &[&str]); 6] = [
        (
            "violence",
            &[r"\b(?:kill(?:s|ed|ing)?|murder\w*|fight(?:s|ing)?|blood(?:y)?|guns?|shoot(?:s|ing)?|stab(?:s|bed|bing)?|war)\b"],
        ),
        (
            "adult_content",
            &[r"\b(?:sex\w*|porn\w*|nude|naked|xxx)\b"],
        ),
        (
            "drugs",
            &[r"\b(?:drugs?|cocaine|heroin|weed|marijuana|meth|vap(?:e|ing)|alcohol|beer|drunk)\b"],
        ),
        (
            "scary_content",
            &[r"\b(?:horror|zombies?|demons?|haunted|nightmares?)\b"],
        ),
        (
            "self_harm",
            &[
                r"\b(?:suicide|self[-\s]?harm)\b",
                r"\b(?:cut|hurt|kill)(?:ting)?\s+myself\b",
            ],
        ),
        (
            "gambling",
            &[r"\b(?:gambl\w*|casinos?|poker|betting|slot\s+machines?)\b"],
        ),
    ];

    topics
        .into_iter()
        .map(|(name, patterns)| {
            (
                name.to_string(),
                patterns.iter().map(|p| p.to_string()).collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::RegexBuilder;

    #[test]
    fn test_default_patterns_compile() {
        for (id, draft) in default_rules() {
            assert!(id.starts_with(BUILTIN_PREFIX));
            RegexBuilder::new(&draft.pattern)
                .case_insensitive(true)
                .build()
                .unwrap_or_else(|e| panic!("{} does not compile: {}", id, e));
        }
        for (topic, patterns) in default_topics() {
            for pattern in patterns {
                RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .unwrap_or_else(|e| panic!("topic {} does not compile: {}", topic, e));
            }
        }
    }

    #[test]
    fn test_default_policies_resolve_topics() {
        let topics = default_topics();
        for age in nestguard_core::AgeGroup::ALL {
            let policy = nestguard_core::AgeGroupPolicy::default_for(age);
            for topic in &policy.blocked_topics {
                assert!(topics.contains_key(topic), "missing topic {}", topic);
            }
        }
    }

    #[test]
    fn test_weapon_is_not_a_violence_keyword() {
        let topics = default_topics();
        let re = RegexBuilder::new(&topics["violence"][0])
            .case_insensitive(true)
            .build()
            .unwrap();
        assert!(!re.is_match("How to make a weapon"));
        assert!(re.is_match("they had a big fight"));
    }
}
