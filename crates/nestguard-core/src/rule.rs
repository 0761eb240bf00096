//! Safety rules and per-age-group policies
//!
//! Rules are data, not code: a pattern plus the action and severity to apply
//! when it matches. Policies hold the per-age thresholds the pipeline reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::age::{AgeGroup, ContentType};
use crate::error::{GuardError, GuardResult};

/// Severity of a rule match or violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// One tier stricter, saturating at critical
    pub fn raise(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    /// One tier milder, saturating at low
    pub fn lower(self) -> Self {
        match self {
            Self::Critical => Self::High,
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }

    /// High or critical
    pub fn is_severe(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// What happens when a rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Violation at the rule's severity
    Block,
    /// Violation; matched span is replaced in output
    Sanitize,
    /// Low-severity violation (full severity in strict mode)
    Warn,
    /// Advisory only (low violation in strict mode)
    Flag,
}

impl RuleAction {
    /// Block and sanitize enforce; warn and flag only advise
    pub fn is_enforcing(&self) -> bool {
        matches!(self, Self::Block | Self::Sanitize)
    }
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Block => write!(f, "block"),
            Self::Sanitize => write!(f, "sanitize"),
            Self::Warn => write!(f, "warn"),
            Self::Flag => write!(f, "flag"),
        }
    }
}

impl std::str::FromStr for RuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "sanitize" => Ok(Self::Sanitize),
            "warn" => Ok(Self::Warn),
            "flag" => Ok(Self::Flag),
            _ => Err(format!("Unknown rule action: {}", s)),
        }
    }
}

/// Pipeline stage that consumes a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Word/phrase lists; severity is the tier before age re-mapping
    Profanity,
    /// Topic patterns (normally supplied through the topic catalog)
    Topic,
    /// Imperative "how to hurt" style matchers
    HarmfulInstruction,
    /// Operator-defined rules evaluated in the policy stage
    #[default]
    Custom,
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Profanity => write!(f, "profanity"),
            Self::Topic => write!(f, "topic"),
            Self::HarmfulInstruction => write!(f, "harmful_instruction"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "profanity" => Ok(Self::Profanity),
            "topic" => Ok(Self::Topic),
            "harmful_instruction" => Ok(Self::HarmfulInstruction),
            "custom" => Ok(Self::Custom),
            _ => Err(format!("Unknown rule category: {}", s)),
        }
    }
}

/// Editable part of a rule, used for create and update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub pattern: String,
    pub action: RuleAction,
    pub severity: Severity,
    #[serde(default)]
    pub category: RuleCategory,
    #[serde(default)]
    pub age_groups: BTreeSet<AgeGroup>,
    #[serde(default = "all_contexts")]
    pub contexts: BTreeSet<ContentType>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn all_contexts() -> BTreeSet<ContentType> {
    ContentType::ALL.into_iter().collect()
}

fn default_enabled() -> bool {
    true
}

impl RuleDraft {
    /// Draft applying to every age group and context
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        action: RuleAction,
        severity: Severity,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            pattern: pattern.into(),
            action,
            severity,
            category: RuleCategory::Custom,
            age_groups: AgeGroup::ALL.into_iter().collect(),
            contexts: all_contexts(),
            enabled: true,
        }
    }

    pub fn with_category(mut self, category: RuleCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_age_groups(mut self, groups: impl IntoIterator<Item = AgeGroup>) -> Self {
        self.age_groups = groups.into_iter().collect();
        self
    }

    pub fn with_contexts(mut self, contexts: impl IntoIterator<Item = ContentType>) -> Self {
        self.contexts = contexts.into_iter().collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A stored, versioned safety rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyRule {
    pub id: String,
    /// Starts at 1; every update archives the old version and bumps this
    #[serde(default = "first_version")]
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub pattern: String,
    pub action: RuleAction,
    pub severity: Severity,
    #[serde(default)]
    pub category: RuleCategory,
    pub age_groups: BTreeSet<AgeGroup>,
    #[serde(default = "all_contexts")]
    pub contexts: BTreeSet<ContentType>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn first_version() -> u32 {
    1
}

impl SafetyRule {
    /// Create version 1 of a rule from a draft
    pub fn from_draft(id: impl Into<String>, draft: RuleDraft) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            version: 1,
            name: draft.name,
            description: draft.description,
            pattern: draft.pattern,
            action: draft.action,
            severity: draft.severity,
            category: draft.category,
            age_groups: draft.age_groups,
            contexts: draft.contexts,
            enabled: draft.enabled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Next version of this rule with the draft applied
    pub fn revise(&self, draft: RuleDraft) -> Self {
        Self {
            id: self.id.clone(),
            version: self.version + 1,
            name: draft.name,
            description: draft.description,
            pattern: draft.pattern,
            action: draft.action,
            severity: draft.severity,
            category: draft.category,
            age_groups: draft.age_groups,
            contexts: draft.contexts,
            enabled: draft.enabled,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    /// Editable fields of this rule
    pub fn to_draft(&self) -> RuleDraft {
        RuleDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            pattern: self.pattern.clone(),
            action: self.action,
            severity: self.severity,
            category: self.category,
            age_groups: self.age_groups.clone(),
            contexts: self.contexts.clone(),
            enabled: self.enabled,
        }
    }

    pub fn applies_to(&self, age: AgeGroup, content_type: ContentType) -> bool {
        self.enabled && self.age_groups.contains(&age) && self.contexts.contains(&content_type)
    }
}

/// Policy settings for one age group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeGroupPolicy {
    pub age_group: AgeGroup,

    /// Advisory only; never used to block unmatched content
    #[serde(default)]
    pub allowed_topics: BTreeSet<String>,

    /// Topic names resolved through the topic catalog
    #[serde(default)]
    pub blocked_topics: BTreeSet<String>,

    /// Language complexity ceiling on a 0-100 scale
    pub max_complexity: u8,

    /// Warn/flag rules count at full weight
    #[serde(default)]
    pub strict_mode: bool,

    /// Disallowed content goes to parental review
    #[serde(default)]
    pub supervision_required: bool,
}

impl AgeGroupPolicy {
    /// Built-in policy for an age group
    pub fn default_for(age_group: AgeGroup) -> Self {
        let set = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>();
        match age_group {
            AgeGroup::Child => Self {
                age_group,
                allowed_topics: set(&["animals", "nature", "science", "stories", "games", "music"]),
                blocked_topics: set(&[
                    "violence",
                    "adult_content",
                    "drugs",
                    "scary_content",
                    "self_harm",
                    "gambling",
                ]),
                max_complexity: 40,
                strict_mode: true,
                supervision_required: true,
            },
            AgeGroup::Teen => Self {
                age_group,
                allowed_topics: set(&["science", "history", "sports", "music", "technology"]),
                blocked_topics: set(&["adult_content", "drugs", "self_harm", "gambling"]),
                max_complexity: 65,
                strict_mode: false,
                supervision_required: true,
            },
            AgeGroup::Adult => Self {
                age_group,
                allowed_topics: BTreeSet::new(),
                blocked_topics: set(&["self_harm"]),
                max_complexity: 100,
                strict_mode: false,
                supervision_required: false,
            },
        }
    }

    /// Check the policy invariants
    pub fn validate(&self) -> GuardResult<()> {
        if self.max_complexity > 100 {
            return Err(GuardError::config(format!(
                "{} policy: max_complexity must be within 0-100 (got {})",
                self.age_group, self.max_complexity
            )));
        }
        let overlap: Vec<&String> = self
            .allowed_topics
            .intersection(&self.blocked_topics)
            .collect();
        if !overlap.is_empty() {
            return Err(GuardError::config(format!(
                "{} policy: topics both allowed and blocked: {:?}",
                self.age_group, overlap
            )));
        }
        Ok(())
    }
}
