// NestGuard Core - Error types
//
// One error enum for the whole engine. Validation-path callers never see these:
// the gateway turns system errors into fail-safe verdicts. Workflow and
// configuration errors are surfaced to dashboards and operators as-is.

use thiserror::Error;

use crate::review::ReviewStatus;

/// Result alias used across all NestGuard crates
pub type GuardResult<T> = Result<T, GuardError>;

/// Errors produced by the safety engine
#[derive(Debug, Error)]
pub enum GuardError {
    /// Configuration document is malformed or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied malformed data
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rule failed validation (empty fields, bad pattern, no age groups)
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// Rule id does not exist in the store
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    /// Configuration import rejected; the store is unchanged
    #[error("Import rejected: {0}")]
    Import(String),

    /// Review request id does not exist
    #[error("Review request not found: {0}")]
    RequestNotFound(String),

    /// Review request already reached a terminal state
    #[error("Review request {id} is not pending (status: {status})")]
    RequestNotPending { id: String, status: ReviewStatus },

    /// Internal failure while evaluating content
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Audit persistence failure
    #[error("Audit error: {0}")]
    Audit(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuardError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_rule(msg: impl Into<String>) -> Self {
        Self::InvalidRule(msg.into())
    }

    pub fn import(msg: impl Into<String>) -> Self {
        Self::Import(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn audit(msg: impl Into<String>) -> Self {
        Self::Audit(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Workflow errors indicate a caller bug rather than a safety concern
    pub fn is_workflow_error(&self) -> bool {
        matches!(self, Self::RequestNotFound(_) | Self::RequestNotPending { .. })
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for GuardError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_pending_message() {
        let err = GuardError::RequestNotPending {
            id: "req-1".to_string(),
            status: ReviewStatus::Approved,
        };
        assert_eq!(
            err.to_string(),
            "Review request req-1 is not pending (status: approved)"
        );
        assert!(err.is_workflow_error());
        assert!(!GuardError::config("x").is_workflow_error());
    }
}
