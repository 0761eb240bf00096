//! Configuration export/import document
//!
//! ```yaml
//! apiVersion: nestguard.dev/v1
//! kind: SafetyConfiguration
//! version: 7
//! exportedAt: 2026-01-01T00:00:00Z
//! rules: [...]
//! policies: [...]
//! topics:
//!   violence: ['\bfight\b']
//! checksum: 3f1c...
//! ```
//!
//! The checksum is the SHA-256 hex digest of the canonical JSON encoding of
//! `rules`, `policies` and `topics`, so it survives a YAML round trip.

use chrono::{DateTime, Utc};
use nestguard_core::{AgeGroupPolicy, GuardError, GuardResult, SafetyRule};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::catalog::TopicCatalog;

pub const API_VERSION: &str = "nestguard.dev/v1";
pub const DOCUMENT_KIND: &str = "SafetyConfiguration";

/// Serialization format of an export document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Yaml,
    Json,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yaml => write!(f, "yaml"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown export format: {}", s)),
        }
    }
}

/// How an import combines with the current configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Document becomes the whole configuration
    #[default]
    Replace,
    /// Document rules/topics are upserted; everything else is kept
    Merge,
}

impl std::str::FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::Merge),
            _ => Err(format!("Unknown import mode: {}", s)),
        }
    }
}

/// Exported safety configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationDocument {
    pub api_version: String,
    pub kind: String,
    /// Rule-set version at export time
    #[serde(default)]
    pub version: u64,
    #[serde(default = "Utc::now")]
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub rules: Vec<SafetyRule>,
    #[serde(default)]
    pub policies: Vec<AgeGroupPolicy>,
    #[serde(default)]
    pub topics: TopicCatalog,
    /// Absent in hand-written documents; verified when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Serialize)]
struct ChecksumBody<'a> {
    rules: &'a [SafetyRule],
    policies: &'a [AgeGroupPolicy],
    topics: &'a TopicCatalog,
}

impl ConfigurationDocument {
    /// Build a document and stamp its checksum
    pub fn new(
        version: u64,
        mut rules: Vec<SafetyRule>,
        mut policies: Vec<AgeGroupPolicy>,
        topics: TopicCatalog,
    ) -> GuardResult<Self> {
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        policies.sort_by_key(|p| p.age_group);

        let mut doc = Self {
            api_version: API_VERSION.to_string(),
            kind: DOCUMENT_KIND.to_string(),
            version,
            exported_at: Utc::now(),
            rules,
            policies,
            topics,
            checksum: None,
        };
        doc.checksum = Some(doc.compute_checksum()?);
        Ok(doc)
    }

    /// SHA-256 hex of the canonical content
    pub fn compute_checksum(&self) -> GuardResult<String> {
        let body = ChecksumBody {
            rules: &self.rules,
            policies: &self.policies,
            topics: &self.topics,
        };
        let bytes = serde_json::to_vec(&body)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Check header and checksum
    pub fn verify(&self) -> GuardResult<()> {
        if self.api_version != API_VERSION {
            return Err(GuardError::import(format!(
                "unsupported apiVersion '{}' (expected {})",
                self.api_version, API_VERSION
            )));
        }
        if self.kind != DOCUMENT_KIND {
            return Err(GuardError::import(format!(
                "unexpected kind '{}' (expected {})",
                self.kind, DOCUMENT_KIND
            )));
        }
        if let Some(ref expected) = self.checksum {
            let actual = self.compute_checksum()?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(GuardError::import(format!(
                    "checksum mismatch: document says {}, content hashes to {}",
                    expected, actual
                )));
            }
        }
        Ok(())
    }

    pub fn render(&self, format: ExportFormat) -> GuardResult<String> {
        Ok(match format {
            ExportFormat::Yaml => serde_yaml::to_string(self)?,
            ExportFormat::Json => serde_json::to_string_pretty(self)?,
        })
    }

    /// Parse JSON or YAML; JSON is detected by a leading `{`
    pub fn parse(text: &str) -> GuardResult<Self> {
        let doc = if text.trim_start().starts_with('{') {
            serde_json::from_str(text)
                .map_err(|e| GuardError::import(format!("invalid JSON document: {}", e)))?
        } else {
            serde_yaml::from_str(text)
                .map_err(|e| GuardError::import(format!("invalid YAML document: {}", e)))?
        };
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestguard_core::{AgeGroup, RuleAction, RuleDraft, Severity};

    fn sample() -> ConfigurationDocument {
        let rule = SafetyRule::from_draft(
            "r1",
            RuleDraft::new("secret", r"\bsecret\b", RuleAction::Flag, Severity::Low),
        );
        ConfigurationDocument::new(
            4,
            vec![rule],
            vec![AgeGroupPolicy::default_for(AgeGroup::Child)],
            crate::catalog::default_topics(),
        )
        .unwrap()
    }

    #[test]
    fn test_checksum_survives_yaml() {
        let doc = sample();
        let yaml = doc.render(ExportFormat::Yaml).unwrap();
        assert!(yaml.contains("apiVersion: nestguard.dev/v1"));
        assert!(yaml.contains("kind: SafetyConfiguration"));

        let parsed = ConfigurationDocument::parse(&yaml).unwrap();
        parsed.verify().unwrap();
        assert_eq!(parsed.checksum, doc.checksum);
    }

    #[test]
    fn test_tampered_document_fails_verification() {
        let doc = sample();
        let mut json: serde_json::Value =
            serde_json::from_str(&doc.render(ExportFormat::Json).unwrap()).unwrap();
        json["rules"][0]["action"] = serde_json::json!("block");

        let parsed = ConfigurationDocument::parse(&json.to_string()).unwrap();
        let err = parsed.verify().unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_hand_written_document_without_checksum() {
        let yaml = r#"
apiVersion: nestguard.dev/v1
kind: SafetyConfiguration
rules:
  - id: no-secrets
    name: no-secrets
    pattern: 'keep (it|this) secret'
    action: block
    severity: high
    age_groups: [child]
    created_at: 2026-01-01T00:00:00Z
    updated_at: 2026-01-01T00:00:00Z
"#;
        let doc = ConfigurationDocument::parse(yaml).unwrap();
        doc.verify().unwrap();
        assert_eq!(doc.rules[0].version, 1);
        assert_eq!(doc.rules[0].contexts.len(), 3);
        assert!(doc.checksum.is_none());
        assert!(doc.topics.is_empty());
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let mut doc = sample();
        doc.kind = "GuardConfig".to_string();
        assert!(doc.verify().is_err());
    }
}
