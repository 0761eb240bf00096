//! Safety exceptions - parental overrides with time and usage bounds
//!
//! Exceptions are never deleted when they run out. An exception past its
//! expiry, at its usage limit, or revoked simply stops matching; the record
//! stays for audit history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::age::{AgeGroup, ContentType};

/// Parental override permitting content that would otherwise be blocked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyException {
    pub id: String,
    pub user_id: String,
    /// Regex matched against future content for the same user
    pub pattern: String,
    pub reason: String,
    pub approver: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_count: u32,
    pub max_usage: u32,
    pub contexts: BTreeSet<ContentType>,
    /// Age group of the user when the exception was granted
    pub age_group: AgeGroup,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SafetyException {
    /// True when the exception may still match content at `now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        if self.usage_count >= self.max_usage {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    pub fn applies_to(&self, content_type: ContentType) -> bool {
        self.contexts.contains(&content_type)
    }

    pub fn remaining_uses(&self) -> u32 {
        self.max_usage.saturating_sub(self.usage_count)
    }
}
