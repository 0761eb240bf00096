//! NestGuard Filter - Rules, content filter pipeline and verdict cache
//!
//! This crate holds everything that decides whether a piece of text is safe:
//!
//! - **RuleStore**: versioned rules, age-group policies and the topic catalog,
//!   published as lock-free compiled snapshots
//! - **ContentFilterPipeline**: the fixed sequence of checks producing a
//!   [`ValidationVerdict`](nestguard_core::ValidationVerdict)
//! - **ValidationCache**: short-TTL memoization of verdicts
//!
//! ## Example
//!
//! ```rust
//! use nestguard_core::{AgeGroup, ContentType, FilterSettings};
//! use nestguard_filter::{ContentFilterPipeline, EvaluationContext, RuleStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(RuleStore::with_defaults());
//! let pipeline = ContentFilterPipeline::new(store, FilterSettings::default());
//!
//! let ctx = EvaluationContext::new(AgeGroup::Child, ContentType::VoiceInput);
//! let verdict = pipeline.evaluate("Let's learn about animals!", &ctx).unwrap();
//! assert!(verdict.allowed);
//! ```

pub mod cache;
pub mod catalog;
pub mod pipeline;
pub mod ruleset;
pub mod store;

pub use cache::{CacheKey, CacheStats, ValidationCache};
pub use catalog::{default_rules, default_topics, TopicCatalog};
pub use pipeline::context::{has_negative_signal, is_hostile};
pub use pipeline::{ContentFilterPipeline, EvaluationContext};
pub use ruleset::{CompiledRule, RuleSet};
pub use store::export::{ConfigurationDocument, ExportFormat, ImportMode};
pub use store::testing::{RuleTestReport, SampleResult, TestSample};
pub use store::validation::{ConflictKind, RuleConflict};
pub use store::{ImportSummary, RuleChange, RuleFilter, RuleStore};
