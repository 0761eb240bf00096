//! Validation verdicts and the violations they carry

use serde::{Deserialize, Serialize};

use crate::rule::Severity;

/// Kind of problem found in a piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Profanity,
    InappropriateTopic,
    HarmfulInstruction,
    LanguageComplexity,
    ContextEscalation,
    PolicyRule,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Profanity => "profanity",
            Self::InappropriateTopic => "inappropriate_topic",
            Self::HarmfulInstruction => "harmful_instruction",
            Self::LanguageComplexity => "language_complexity",
            Self::ContextEscalation => "context_escalation",
            Self::PolicyRule => "policy_rule",
        };
        write!(f, "{}", s)
    }
}

/// One problem found by a pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub severity: Severity,
    pub description: String,
    /// Rule that produced the violation, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Byte range of the match in the original content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<(usize, usize)>,
}

impl Violation {
    pub fn new(kind: ViolationKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
            rule_id: None,
            span: None,
        }
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.span = Some((start, end));
        self
    }
}

/// Overall risk of a verdict
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// High if any violation is high/critical, medium if any is medium
    pub fn from_violations(violations: &[Violation]) -> Self {
        if violations.iter().any(|v| v.severity.is_severe()) {
            Self::High
        } else if violations.iter().any(|v| v.severity == Severity::Medium) {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown risk level: {}", s)),
        }
    }
}

/// Outcome of running the filter pipeline on one piece of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerdict {
    pub allowed: bool,
    pub risk_level: RiskLevel,
    pub violations: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitized_text: Option<String>,
    pub confidence: f32,
    pub processing_time_ms: u64,
    /// Rule set the verdict was computed against
    #[serde(default)]
    pub rule_set_version: u64,
    /// Advisory matches that did not count as violations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

impl ValidationVerdict {
    /// Clean verdict with no violations
    pub fn clean(rule_set_version: u64) -> Self {
        Self {
            allowed: true,
            risk_level: RiskLevel::Low,
            violations: Vec::new(),
            sanitized_text: None,
            confidence: 1.0,
            processing_time_ms: 0,
            rule_set_version,
            flags: Vec::new(),
        }
    }

    /// Fail-safe verdict used when evaluation itself failed
    pub fn fail_safe(reason: impl Into<String>, rule_set_version: u64) -> Self {
        Self {
            allowed: false,
            risk_level: RiskLevel::High,
            violations: vec![Violation::new(
                ViolationKind::PolicyRule,
                Severity::High,
                reason,
            )],
            sanitized_text: None,
            confidence: 0.1,
            processing_time_ms: 0,
            rule_set_version,
            flags: Vec::new(),
        }
    }

    pub fn has_kind(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }

    /// Human-readable reasons, one per violation, in pipeline order
    pub fn blocked_reasons(&self) -> Vec<String> {
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.kind, v.description))
            .collect()
    }
}
