//! Provisioning capability consumed by the executor

use crate::error::{ProvisionError, TeardownError};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stackflow_core::ResourceHandle;

/// Provisioning backend abstraction
///
/// The executor only needs to submit a resolved resource description and
/// receive a handle plus the attributes that became known. Vendor-specific
/// APIs live behind implementations of this trait.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Returns the provider name (e.g., "local")
    fn name(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> AuthStatus {
        AuthStatus::ok(self.name())
    }

    /// Create a resource from its fully resolved configuration
    async fn provision(&self, request: &ProvisionRequest) -> Result<Provisioned, ProvisionError>;

    /// Delete a previously provisioned resource
    async fn teardown(&self, kind: &str, handle: &ResourceHandle) -> Result<(), TeardownError>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// A single resource submitted for provisioning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Stack-level resource identifier
    pub node_id: String,

    /// Resource kind (e.g., "database", "environment")
    pub kind: String,

    /// Configuration with every deferred reference substituted
    ///
    /// Sensitive references arrive as `#{secret:<node>/<attribute>}`.
    pub config: Value,

    /// Attributes the executor expects back
    pub expected_outputs: Vec<String>,
}

impl ProvisionRequest {
    /// Get a configuration value as a specific type
    pub fn get_config<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

/// Result of a successful provisioning call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provisioned {
    /// Provider-specific resource handle
    pub handle: ResourceHandle,

    /// Attributes that became known (endpoint, generated credentials, ...)
    pub outputs: IndexMap<String, Value>,
}

impl Provisioned {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: ResourceHandle::new(handle),
            outputs: IndexMap::new(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: Value) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }
}
