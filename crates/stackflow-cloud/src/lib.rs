//! StackFlow Cloud
//!
//! Provisioning executor for StackFlow stacks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  StackFlow CLI                   │
//! │                 (stack up/down)                  │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               stackflow-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │               Executor                    │   │
//! │  │  plan order / concurrency / cancellation  │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ Provisioner  │  │  State Mgmt  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │     local     │
//! │   provider    │
//! └───────────────┘
//! ```

pub mod error;
pub mod executor;
pub mod provider;
pub mod result;
pub mod state;

// Re-exports
pub use error::{CloudError, ProvisionError, Result, TeardownError};
pub use executor::{CancelHandle, Executor, ExecutorOptions};
pub use provider::{AuthStatus, ProvisionRequest, Provisioned, Provisioner};
pub use result::{
    DeploymentResult, NodeOutcome, PlanSummary, RunStatus, TeardownOutcome, TeardownReport,
};
pub use state::{NodeRecord, StackState, StateLock, StateManager};
