//! Parental review requests
//!
//! State machine: `pending -> approved | rejected | expired`. Terminal states
//! have no exits; the transition check lives in [`ReviewStatus::can_transition_to`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::age::AgeGroup;
use crate::verdict::{RiskLevel, Violation};

/// Lifecycle state of a review request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ReviewStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Only pending requests move, and only to a terminal state
    pub fn can_transition_to(&self, next: ReviewStatus) -> bool {
        matches!(self, Self::Pending) && next.is_terminal()
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Review priority shown on the parent dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl ReviewPriority {
    /// high -> urgent, medium -> high, low -> medium
    pub fn from_risk(risk: RiskLevel) -> Self {
        match risk {
            RiskLevel::High => Self::Urgent,
            RiskLevel::Medium => Self::High,
            RiskLevel::Low => Self::Medium,
        }
    }
}

impl std::fmt::Display for ReviewPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

/// How a request was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
    /// Expired and approved by the expiry policy
    AutoApproved,
    /// Expired and rejected by the expiry policy
    AutoRejected,
}

impl ReviewDecision {
    pub fn is_approval(&self) -> bool {
        matches!(self, Self::Approved | Self::AutoApproved)
    }
}

impl std::fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::AutoApproved => write!(f, "auto_approved"),
            Self::AutoRejected => write!(f, "auto_rejected"),
        }
    }
}

/// Parent's (or the expiry policy's) answer to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentResponse {
    pub decision: ReviewDecision,
    pub reason: String,
    pub approver: String,
    /// Overrides the default exception lifetime on approval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_duration_secs: Option<u64>,
    pub responded_at: DateTime<Utc>,
}

/// Pending decision artifact created when content cannot be resolved autonomously
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentalReviewRequest {
    pub id: String,
    pub user_id: String,
    pub age_group: AgeGroup,
    pub content: String,
    pub violations: Vec<Violation>,
    pub risk_level: RiskLevel,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub priority: ReviewPriority,
    pub status: ReviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_response: Option<ParentResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ParentalReviewRequest {
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReviewStatus::Pending && now >= self.expires_at
    }

    /// Short preview for notifications
    pub fn excerpt(&self, max_chars: usize) -> String {
        excerpt(&self.content, max_chars)
    }
}

/// Truncate on a char boundary, appending an ellipsis when cut
pub fn excerpt(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let cut: String = content.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use ReviewStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Expired));
        assert!(!Pending.can_transition_to(Pending));
        for terminal in [Approved, Rejected, Expired] {
            for next in [Pending, Approved, Rejected, Expired] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_priority_never_below_medium() {
        assert_eq!(ReviewPriority::from_risk(RiskLevel::High), ReviewPriority::Urgent);
        assert_eq!(ReviewPriority::from_risk(RiskLevel::Medium), ReviewPriority::High);
        assert_eq!(ReviewPriority::from_risk(RiskLevel::Low), ReviewPriority::Medium);
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("a longer sentence here", 8), "a longer...");
        assert_eq!(excerpt("héllo wörld", 5), "héllo...");
    }
}
