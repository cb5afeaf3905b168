//! Cloud provisioning error types

use thiserror::Error;

/// Errors raised by the executor and the state manager
#[derive(Error, Debug)]
pub enum CloudError {
    #[error(transparent)]
    Stack(#[from] stackflow_core::StackError),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Failure reported by a provider for a single resource
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Failure reported by a provider while deleting a resource
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TeardownError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource still in use: {0}")]
    InUse(String),

    #[error("API error: {0}")]
    ApiError(String),
}
