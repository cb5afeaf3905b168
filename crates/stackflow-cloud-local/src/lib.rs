//! Local provider for StackFlow
//!
//! This crate implements the `Provisioner` trait in memory. It fabricates the
//! outputs each resource kind exposes (endpoints, identifiers, generated
//! credentials) so a stack can be planned, provisioned and torn down without
//! a cloud account.
//!
//! # Example
//!
//! ```ignore
//! use stackflow_cloud::Executor;
//! use stackflow_cloud_local::LocalProvider;
//! use std::sync::Arc;
//!
//! let mut stack = stackflow_core::parse_stack_file("stack.kdl")?;
//! let executor = Executor::new(Arc::new(LocalProvider::default()));
//! let result = executor.run(&mut stack).await?;
//! ```

mod outputs;
pub mod provider;

pub use provider::{DEFAULT_REGION, LocalProvider, LocalResource};
