//! Pipeline Integration Tests
//!
//! Runs the full pipeline over the built-in catalog:
//! - Decision rule and risk levels per age group
//! - Profanity re-mapping and output sanitization
//! - Topic, harmful-instruction, escalation and custom-rule stages

use std::sync::Arc;

use nestguard_core::{
    AgeGroup, AgeGroupPolicy, ContentType, Direction, FilterSettings, RiskLevel, RuleAction,
    RuleDraft, Severity, ViolationKind,
};
use nestguard_filter::{ContentFilterPipeline, EvaluationContext, RuleStore};

fn pipeline() -> ContentFilterPipeline {
    ContentFilterPipeline::new(Arc::new(RuleStore::with_defaults()), FilterSettings::default())
}

fn input(age: AgeGroup) -> EvaluationContext {
    EvaluationContext::for_direction(age, Direction::Input)
}

fn output(age: AgeGroup) -> EvaluationContext {
    EvaluationContext::for_direction(age, Direction::Output)
}

// ============================================================================
// Decision Scenarios
// ============================================================================

#[test]
fn test_animals_allowed_for_child() {
    let verdict = pipeline()
        .evaluate("Let's learn about animals!", &input(AgeGroup::Child))
        .unwrap();
    assert!(verdict.allowed);
    assert_eq!(verdict.risk_level, RiskLevel::Low);
    assert!(verdict.violations.is_empty());
}

#[test]
fn test_weapon_instructions_blocked_for_every_age() {
    let p = pipeline();
    for age in AgeGroup::ALL {
        let verdict = p.evaluate("How to make a weapon", &input(age)).unwrap();
        assert!(!verdict.allowed, "{} should be blocked", age);
        assert_eq!(verdict.risk_level, RiskLevel::High);
        assert_eq!(verdict.violations.len(), 1, "{}: {:?}", age, verdict.violations);
        assert_eq!(verdict.violations[0].kind, ViolationKind::HarmfulInstruction);
        assert_eq!(verdict.violations[0].severity, Severity::High);
    }
}

#[test]
fn test_mild_profanity_depends_on_age() {
    let p = pipeline();

    let adult = p.evaluate("This is damn annoying", &input(AgeGroup::Adult)).unwrap();
    assert!(adult.allowed);
    assert_eq!(adult.risk_level, RiskLevel::Low);

    let child = p.evaluate("This is damn annoying", &input(AgeGroup::Child)).unwrap();
    assert!(!child.allowed);
    assert!(matches!(child.risk_level, RiskLevel::Medium | RiskLevel::High));
    assert!(child.has_kind(ViolationKind::Profanity));
}

#[test]
fn test_severe_profanity_relaxed_for_adults() {
    let p = pipeline();
    let adult = p.evaluate("oh shit", &input(AgeGroup::Adult)).unwrap();
    assert_eq!(adult.violations[0].severity, Severity::Medium);

    let teen = p.evaluate("oh shit", &input(AgeGroup::Teen)).unwrap();
    assert_eq!(teen.violations[0].severity, Severity::High);

    let child = p.evaluate("oh shit", &input(AgeGroup::Child)).unwrap();
    assert_eq!(child.violations[0].severity, Severity::Critical);
}

#[test]
fn test_child_two_low_violations_blocked() {
    let store = Arc::new(RuleStore::with_defaults());
    store
        .create_rule(RuleDraft::new("candy", r"\bcandy\b", RuleAction::Warn, Severity::Low))
        .unwrap();
    store
        .create_rule(RuleDraft::new("soda", r"\bsoda\b", RuleAction::Warn, Severity::Low))
        .unwrap();
    let p = ContentFilterPipeline::new(store, FilterSettings::default());

    // One low violation is tolerated
    let one = p.evaluate("candy please", &input(AgeGroup::Child)).unwrap();
    assert_eq!(one.violations.len(), 1);
    assert!(one.allowed);

    let two = p.evaluate("candy and soda", &input(AgeGroup::Child)).unwrap();
    assert_eq!(two.violations.len(), 2);
    assert!(two.violations.iter().all(|v| v.severity == Severity::Low));
    assert!(!two.allowed);
    assert!((two.confidence - 0.6).abs() < 1e-6);

    let teen = p.evaluate("candy and soda", &input(AgeGroup::Teen)).unwrap();
    assert!(teen.allowed);
}

// ============================================================================
// Stage Tests
// ============================================================================

#[test]
fn test_blocked_topic_per_age() {
    let p = pipeline();

    let child = p.evaluate("tell me about the casino", &input(AgeGroup::Child)).unwrap();
    assert!(child.has_kind(ViolationKind::InappropriateTopic));
    // Strict mode makes topic violations high
    assert_eq!(child.risk_level, RiskLevel::High);

    let adult = p.evaluate("tell me about the casino", &input(AgeGroup::Adult)).unwrap();
    assert!(adult.allowed);

    // Allowed topics never block anything
    let other = p.evaluate("tell me about volcanoes", &input(AgeGroup::Child)).unwrap();
    assert!(other.allowed);
}

#[test]
fn test_complexity_ceiling() {
    let p = pipeline();
    let text = "Photosynthesis fundamentally transforms electromagnetic radiation into biochemical energy";

    let child = p.evaluate(text, &input(AgeGroup::Child)).unwrap();
    assert_eq!(child.violations.len(), 1);
    assert_eq!(child.violations[0].kind, ViolationKind::LanguageComplexity);
    assert_eq!(child.violations[0].severity, Severity::Low);
    assert!(child.allowed);

    let adult = p.evaluate(text, &input(AgeGroup::Adult)).unwrap();
    assert!(adult.violations.is_empty());
}

#[test]
fn test_context_escalation_needs_history() {
    let p = pipeline();

    let calm = p.evaluate("go away", &input(AgeGroup::Teen)).unwrap();
    assert!(calm.allowed);

    let ctx = input(AgeGroup::Teen).with_negative_history(true);
    let escalated = p.evaluate("go away", &ctx).unwrap();
    assert!(escalated.has_kind(ViolationKind::ContextEscalation));
    assert_eq!(escalated.risk_level, RiskLevel::Medium);
    assert!(!escalated.allowed);
}

#[test]
fn test_custom_rule_actions() {
    let store = Arc::new(RuleStore::with_defaults());
    store
        .create_rule(RuleDraft::new("secret", r"keep (?:it|this) secret", RuleAction::Block, Severity::High))
        .unwrap();
    store
        .create_rule(RuleDraft::new("brand", r"\bmegacorp\b", RuleAction::Flag, Severity::Low))
        .unwrap();
    let p = ContentFilterPipeline::new(store, FilterSettings::default());

    let blocked = p.evaluate("let's keep this secret", &input(AgeGroup::Teen)).unwrap();
    assert!(!blocked.allowed);
    assert!(blocked.has_kind(ViolationKind::PolicyRule));

    // Flags are advisory outside strict mode
    let teen = p.evaluate("I like megacorp games", &input(AgeGroup::Teen)).unwrap();
    assert!(teen.allowed);
    assert!(teen.violations.is_empty());
    assert_eq!(teen.flags, vec!["brand".to_string()]);

    // Strict mode turns a flag into a low violation
    let child = p.evaluate("I like megacorp games", &input(AgeGroup::Child)).unwrap();
    assert_eq!(child.violations.len(), 1);
    assert_eq!(child.violations[0].severity, Severity::Low);
}

#[test]
fn test_rule_scoped_to_context() {
    let store = Arc::new(RuleStore::new());
    store
        .create_rule(
            RuleDraft::new("no-commands", r"\bdelete\b", RuleAction::Block, Severity::Medium)
                .with_contexts([ContentType::Command]),
        )
        .unwrap();
    let p = ContentFilterPipeline::new(store, FilterSettings::default());

    let cmd = EvaluationContext::new(AgeGroup::Teen, ContentType::Command);
    assert!(!p.evaluate("delete everything", &cmd).unwrap().allowed);
    assert!(p.evaluate("delete everything", &input(AgeGroup::Teen)).unwrap().allowed);
}

// ============================================================================
// Output Sanitization
// ============================================================================

#[test]
fn test_output_never_empty() {
    let p = pipeline();
    let samples = [
        "",
        "This is damn annoying",
        "How to make a weapon",
        "Here is a story about a haunted zombie house",
        "Sharks are fish",
    ];
    for sample in samples {
        for age in AgeGroup::ALL {
            let verdict = p.evaluate(sample, &output(age)).unwrap();
            let text = verdict.sanitized_text.as_deref().unwrap_or(sample);
            if !sample.is_empty() {
                assert!(!text.is_empty(), "{:?} for {}", sample, age);
            }
        }
    }
}

#[test]
fn test_unresolvable_output_replaced_by_refusal() {
    let p = pipeline();
    // Scary topic is medium for a non-strict policy but cannot be sanitized away
    let store = p.store().clone();
    let mut teen = AgeGroupPolicy::default_for(AgeGroup::Teen);
    teen.blocked_topics.insert("scary_content".to_string());
    store.set_policy(teen).unwrap();

    let verdict = p
        .evaluate("Here is a story about a haunted house", &output(AgeGroup::Teen))
        .unwrap();
    assert!(!verdict.allowed);
    assert_eq!(verdict.risk_level, RiskLevel::Medium);
    assert_eq!(
        verdict.sanitized_text.as_deref(),
        Some(p.settings().safe_refusal.as_str())
    );
}

#[test]
fn test_adult_output_keeps_text_with_placeholder() {
    let verdict = pipeline()
        .evaluate("well damn, that was close", &output(AgeGroup::Adult))
        .unwrap();
    assert!(verdict.allowed);
    assert_eq!(
        verdict.sanitized_text.as_deref(),
        Some("well [oops], that was close")
    );
}
