// NestGuard Core - GuardConfig resource type
//
// GuardConfig holds the tunables of one engine instance:
// - Validation cache TTL, size and sweep cadence
// - Audit log capacity, retention and optional persistence sink
// - Parental approval timeout, expiry policy and exception bounds
// - Filter limits and the child-facing fallback messages
//
// Every field has a serde default so an empty spec yields a working engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{GuardError, GuardResult};

/// GuardConfig - engine configuration document
///
/// Example:
/// ```yaml
/// apiVersion: nestguard.dev/v1
/// kind: GuardConfig
/// metadata:
///   name: living-room-device
/// spec:
///   cache:
///     ttl_seconds: 60
///     max_entries: 1000
///   audit:
///     max_entries: 10000
///     retention_days: 30
///     sink: ${NESTGUARD_AUDIT_FILE}
///   approval:
///     timeout_seconds: 3600
///     expiry_policy: auto_reject
///   filter:
///     max_content_bytes: 8192
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardConfig {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: ConfigMetadata,

    #[serde(default)]
    pub spec: GuardSpec,
}

fn default_api_version() -> String {
    "nestguard.dev/v1".to_string()
}

fn default_kind() -> String {
    "GuardConfig".to_string()
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ConfigMetadata::default(),
            spec: GuardSpec::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl Default for ConfigMetadata {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            labels: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardSpec {
    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub audit: AuditSettings,

    #[serde(default)]
    pub approval: ApprovalSettings,

    #[serde(default)]
    pub filter: FilterSettings,

    /// Exported rule configuration to load at startup (YAML or JSON)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<String>,
}

/// Validation cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entries older than this are misses
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,

    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,

    #[serde(default = "default_cache_sweep")]
    pub sweep_interval_seconds: u64,

    /// Sweep removes entries older than this
    #[serde(default = "default_cache_sweep")]
    pub max_age_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_cache_entries() -> usize {
    1000
}

fn default_cache_sweep() -> u64 {
    600 // 10 minutes
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl(),
            max_entries: default_cache_entries(),
            sweep_interval_seconds: default_cache_sweep(),
            max_age_seconds: default_cache_sweep(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }
}

/// Audit log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Oldest entries are evicted beyond this
    #[serde(default = "default_audit_entries")]
    pub max_entries: usize,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default = "default_retention_sweep")]
    pub retention_sweep_interval_seconds: u64,

    /// JSON-lines file receiving every entry (supports ${ENV_VAR})
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<String>,
}

fn default_audit_entries() -> usize {
    10_000
}

fn default_retention_days() -> u32 {
    30
}

fn default_retention_sweep() -> u64 {
    86_400 // daily
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            max_entries: default_audit_entries(),
            retention_days: default_retention_days(),
            retention_sweep_interval_seconds: default_retention_sweep(),
            sink: None,
        }
    }
}

impl AuditSettings {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_interval_seconds)
    }
}

/// What the expiry sweep does with an overdue request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    #[default]
    AutoReject,
    AutoApprove,
}

/// Parental approval workflow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSettings {
    /// How long a parent has to answer
    #[serde(default = "default_approval_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_approval_sweep")]
    pub sweep_interval_seconds: u64,

    #[serde(default)]
    pub expiry_policy: ExpiryPolicy,

    /// Uses granted by an approval
    #[serde(default = "default_exception_uses")]
    pub exception_max_usage: u32,

    /// Lifetime of an approval exception unless the parent overrides it
    #[serde(default = "default_exception_duration")]
    pub exception_duration_seconds: u64,
}

fn default_approval_timeout() -> u64 {
    3600
}

fn default_approval_sweep() -> u64 {
    60
}

fn default_exception_uses() -> u32 {
    5
}

fn default_exception_duration() -> u64 {
    86_400
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_approval_timeout(),
            sweep_interval_seconds: default_approval_sweep(),
            expiry_policy: ExpiryPolicy::default(),
            exception_max_usage: default_exception_uses(),
            exception_duration_seconds: default_exception_duration(),
        }
    }
}

impl ApprovalSettings {
    pub fn timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.timeout_seconds as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn exception_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.exception_duration_seconds as i64)
    }
}

/// Filter pipeline settings and child-facing messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Larger content is an evaluation error (fail-safe)
    #[serde(default = "default_max_content")]
    pub max_content_bytes: usize,

    /// Replaces profanity spans in sanitized output
    #[serde(default = "default_placeholder")]
    pub placeholder: String,

    /// Spoken instead of output that cannot be sanitized
    #[serde(default = "default_safe_refusal")]
    pub safe_refusal: String,

    /// Returned to the child when their input is blocked
    #[serde(default = "default_input_refusal")]
    pub input_refusal: String,

    /// Recent turns inspected for escalation
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_max_content() -> usize {
    8192
}

fn default_placeholder() -> String {
    "[oops]".to_string()
}

fn default_safe_refusal() -> String {
    "Let's talk about something else! Do you want to hear a fun fact about animals?".to_string()
}

fn default_input_refusal() -> String {
    "Hmm, let's try saying that a different way.".to_string()
}

fn default_history_window() -> usize {
    5
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            max_content_bytes: default_max_content(),
            placeholder: default_placeholder(),
            safe_refusal: default_safe_refusal(),
            input_refusal: default_input_refusal(),
            history_window: default_history_window(),
        }
    }
}

impl GuardConfig {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Parse from a YAML string, expand env vars, validate
    pub fn from_yaml_str(content: &str) -> GuardResult<Self> {
        let mut config: GuardConfig = serde_yaml::from_str(content)
            .map_err(|e| GuardError::config(format!("Failed to parse config: {}", e)))?;
        config.expand_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> GuardResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GuardError::config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> GuardResult<()> {
        if self.kind != "GuardConfig" {
            return Err(GuardError::config(format!(
                "Expected kind GuardConfig, got {}",
                self.kind
            )));
        }
        if self.metadata.name.is_empty() {
            return Err(GuardError::config("GuardConfig name is required"));
        }

        let spec = &self.spec;
        if spec.cache.enabled && spec.cache.max_entries == 0 {
            return Err(GuardError::config("cache.max_entries must be greater than 0"));
        }
        if spec.audit.max_entries == 0 {
            return Err(GuardError::config("audit.max_entries must be greater than 0"));
        }
        if spec.approval.timeout_seconds == 0 {
            return Err(GuardError::config(
                "approval.timeout_seconds must be greater than 0",
            ));
        }
        if spec.approval.exception_max_usage == 0 {
            return Err(GuardError::config(
                "approval.exception_max_usage must be at least 1",
            ));
        }
        if spec.filter.max_content_bytes == 0 {
            return Err(GuardError::config(
                "filter.max_content_bytes must be greater than 0",
            ));
        }
        if spec.filter.safe_refusal.trim().is_empty() || spec.filter.input_refusal.trim().is_empty()
        {
            return Err(GuardError::config("fallback messages must not be empty"));
        }
        for (name, secs) in [
            ("cache.sweep_interval_seconds", spec.cache.sweep_interval_seconds),
            ("approval.sweep_interval_seconds", spec.approval.sweep_interval_seconds),
            (
                "audit.retention_sweep_interval_seconds",
                spec.audit.retention_sweep_interval_seconds,
            ),
        ] {
            if secs == 0 {
                return Err(GuardError::config(format!("{} must be greater than 0", name)));
            }
        }

        Ok(())
    }

    /// Expand ${VAR} references in path-like values
    pub fn expand_env_vars(&mut self) {
        if let Some(ref sink) = self.spec.audit.sink {
            self.spec.audit.sink = Some(expand_env_var(sink));
        }
        if let Some(ref rules_file) = self.spec.rules_file {
            self.spec.rules_file = Some(expand_env_var(rules_file));
        }
    }
}

/// Expand ${VAR_NAME} patterns in a string; unknown variables are left as-is
fn expand_env_var(value: &str) -> String {
    static ENV_REF: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = ENV_REF.get_or_init(|| {
        regex::Regex::new(r"\$\{([^}]+)\}").expect("env reference pattern is valid")
    });

    let mut result = value.to_string();
    for cap in re.captures_iter(value) {
        if let Ok(var_value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &var_value);
        }
    }
    result
}
