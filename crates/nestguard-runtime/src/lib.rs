//! NestGuard Runtime - Gateway, parental approval and background sweeps
//!
//! - **SafetyGateway**: the only entry point collaborators call
//!   (`validate_input`, `validate_output`, `validate_child_safe`)
//! - **ApprovalWorkflow**: parental review requests and their state machine
//! - **ExceptionStore**: bounded, parent-granted overrides
//! - **UserDirectory**: user to age-group resolution
//! - **Sweeper**: approval timeouts, cache eviction and audit retention
//!
//! ## Example
//!
//! ```rust
//! use nestguard_core::{AgeGroup, GuardSpec};
//! use nestguard_runtime::{InMemoryUserDirectory, SafetyGateway};
//! use std::sync::Arc;
//!
//! let directory = InMemoryUserDirectory::new().with_user("kid-1", AgeGroup::Child);
//! let gateway = SafetyGateway::builder(GuardSpec::default())
//!     .user_directory(Arc::new(directory))
//!     .build();
//!
//! let decision = gateway.validate_input("Let's learn about animals!", "kid-1");
//! assert!(decision.is_allowed());
//! ```

pub mod approval;
pub mod directory;
pub mod exceptions;
pub mod gateway;
pub mod sweeper;

pub use approval::{ApprovalWorkflow, DecisionInput};
pub use directory::{InMemoryUserDirectory, UserDirectory};
pub use exceptions::{ExceptionGrant, ExceptionStore};
pub use gateway::{GateDecision, GatewayBuilder, GatewayStats, SafetyGateway};
pub use sweeper::Sweeper;
