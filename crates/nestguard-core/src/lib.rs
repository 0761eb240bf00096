// NestGuard Core - Foundation types for the child-safety engine
//
// Shared data model (rules, policies, verdicts, exceptions, review requests,
// audit entries), the engine configuration document, the error type and the
// notification hub. Behavior lives in the filter, audit and runtime crates.

pub mod age;
pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod exception;
pub mod review;
pub mod rule;
pub mod verdict;

// Re-export core types
pub use age::{AgeGroup, ContentType, Direction};
pub use audit::{AuditEventType, AuditFilter, SafetyAuditEntry, SafetyReport, TimeRange};
pub use config::{
    ApprovalSettings, AuditSettings, CacheSettings, ConfigMetadata, ExpiryPolicy, FilterSettings,
    GuardConfig, GuardSpec,
};
pub use error::{GuardError, GuardResult};
pub use events::{ChannelListener, FnListener, NotificationHub, NotificationListener, SafetyEvent};
pub use exception::SafetyException;
pub use review::{
    ParentResponse, ParentalReviewRequest, ReviewDecision, ReviewPriority, ReviewStatus,
};
pub use rule::{AgeGroupPolicy, RuleAction, RuleCategory, RuleDraft, SafetyRule, Severity};
pub use verdict::{RiskLevel, ValidationVerdict, Violation, ViolationKind};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identity used for audit entries that have no user (e.g. child-safe checks)
pub const ANONYMOUS_USER: &str = "anonymous";
