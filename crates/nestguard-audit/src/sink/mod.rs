//! Audit persistence sinks
//!
//! The in-memory [`AuditLog`](crate::AuditLog) is authoritative for queries;
//! a sink is a best-effort durable copy written by a background task.

pub mod file;

use async_trait::async_trait;
use nestguard_core::{GuardResult, SafetyAuditEntry};

/// Durable destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one entry
    async fn persist(&self, entry: &SafetyAuditEntry) -> GuardResult<()>;

    /// Flush buffered writes
    async fn flush(&self) -> GuardResult<()> {
        Ok(())
    }
}
