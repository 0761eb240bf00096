//! Dry-run a rule against labelled samples

use nestguard_core::{GuardError, GuardResult, RuleDraft};
use serde::{Deserialize, Serialize};

use super::validation::validate_draft;
use crate::ruleset::compile_pattern;

/// A sample and whether the rule is expected to match it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSample {
    pub content: String,
    pub expected_match: bool,
}

impl TestSample {
    pub fn matching(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            expected_match: true,
        }
    }

    pub fn non_matching(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            expected_match: false,
        }
    }
}

/// Outcome for one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    pub content: String,
    pub expected_match: bool,
    pub matched: bool,
}

impl SampleResult {
    pub fn is_correct(&self) -> bool {
        self.expected_match == self.matched
    }
}

/// Confusion counts and derived metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleTestReport {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    /// Correct / total (0 when there are no samples)
    pub accuracy: f64,
    /// TP / (TP + FP) (0 when nothing matched)
    pub precision: f64,
    /// TP / (TP + FN) (0 when nothing was expected to match)
    pub recall: f64,
    pub results: Vec<SampleResult>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Validate the draft, then run it over every sample
pub fn test_rule(draft: &RuleDraft, samples: &[TestSample]) -> GuardResult<RuleTestReport> {
    validate_draft(draft)?;
    let regex =
        compile_pattern(&draft.pattern).map_err(|e| GuardError::invalid_rule(e.to_string()))?;

    let mut report = RuleTestReport::default();
    for sample in samples {
        let matched = regex.is_match(&sample.content);
        match (sample.expected_match, matched) {
            (true, true) => report.true_positives += 1,
            (false, true) => report.false_positives += 1,
            (false, false) => report.true_negatives += 1,
            (true, false) => report.false_negatives += 1,
        }
        report.results.push(SampleResult {
            content: sample.content.clone(),
            expected_match: sample.expected_match,
            matched,
        });
    }

    let correct = report.true_positives + report.true_negatives;
    report.accuracy = ratio(correct, samples.len());
    report.precision = ratio(
        report.true_positives,
        report.true_positives + report.false_positives,
    );
    report.recall = ratio(
        report.true_positives,
        report.true_positives + report.false_negatives,
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestguard_core::{RuleAction, Severity};

    #[test]
    fn test_metrics() {
        let draft = RuleDraft::new("candy", r"\bcandy\b", RuleAction::Warn, Severity::Low);
        let samples = vec![
            TestSample::matching("can I have candy"),
            TestSample::matching("CANDY please"),
            TestSample::matching("sweets please"),
            TestSample::non_matching("candyfloss is fluffy"),
            TestSample::non_matching("I like carrots"),
        ];

        let report = test_rule(&draft, &samples).unwrap();
        assert_eq!(report.true_positives, 2);
        assert_eq!(report.false_negatives, 1);
        assert_eq!(report.true_negatives, 2);
        assert_eq!(report.false_positives, 0);
        assert!((report.accuracy - 0.8).abs() < 1e-9);
        assert!((report.precision - 1.0).abs() < 1e-9);
        assert!((report.recall - 2.0 / 3.0).abs() < 1e-9);
        assert!(!report.results[2].is_correct());
    }

    #[test]
    fn test_invalid_rule_is_rejected() {
        let draft = RuleDraft::new("bad", "(", RuleAction::Warn, Severity::Low);
        assert!(test_rule(&draft, &[]).is_err());
    }

    #[test]
    fn test_no_samples() {
        let draft = RuleDraft::new("ok", "x", RuleAction::Warn, Severity::Low);
        let report = test_rule(&draft, &[]).unwrap();
        assert_eq!(report.accuracy, 0.0);
        assert!(report.results.is_empty());
    }
}
