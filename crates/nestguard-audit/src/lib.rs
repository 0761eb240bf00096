//! NestGuard Audit - Append-only log of safety decisions
//!
//! Every validation decision, review request and parental decision lands here.
//! The log is in-memory, sharded per user with [`dashmap::DashMap`], bounded in
//! size, and optionally mirrored to a durable sink by a background writer.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nestguard_audit::{AuditLog, FileSink};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // In-memory only
//! let log = AuditLog::new(10_000);
//!
//! // Mirrored to a JSON-lines file
//! let sink = FileSink::new("./audit.jsonl").await?;
//! let log = AuditLog::new(10_000).with_sink(Arc::new(sink));
//! # Ok(())
//! # }
//! ```

pub mod log;
pub mod report;
pub mod sink;

pub use log::{AuditLog, DEFAULT_MAX_ENTRIES};
pub use report::{build_report, count_by_event};
pub use sink::file::{read_entries, FileSink};
pub use sink::AuditSink;
