//! In-process provider implementation

use crate::outputs::{fabricate, secret_name, suffix};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use stackflow_cloud::{
    AuthStatus, ProvisionError, ProvisionRequest, Provisioned, Provisioner, TeardownError,
};
use stackflow_core::ResourceHandle;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const DEFAULT_REGION: &str = "local-1";

/// A resource held by the local provider
#[derive(Debug, Clone)]
pub struct LocalResource {
    pub node_id: String,
    pub kind: String,
    pub outputs: IndexMap<String, Value>,
}

/// Provider that keeps resources in memory
///
/// Outputs are fabricated per kind, credentials are random. Failures can be
/// injected per node id to exercise halting and teardown paths.
pub struct LocalProvider {
    region: String,
    latency: Option<Duration>,
    fail_on: HashSet<String>,
    fail_teardown_on: HashSet<String>,
    resources: Mutex<HashMap<ResourceHandle, LocalResource>>,
    provision_calls: AtomicUsize,
    teardown_calls: AtomicUsize,
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new(DEFAULT_REGION)
    }
}

impl LocalProvider {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            latency: None,
            fail_on: HashSet::new(),
            fail_teardown_on: HashSet::new(),
            resources: Mutex::new(HashMap::new()),
            provision_calls: AtomicUsize::new(0),
            teardown_calls: AtomicUsize::new(0),
        }
    }

    /// Simulated latency for every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail provisioning of the given node
    pub fn fail_on(mut self, node_id: impl Into<String>) -> Self {
        self.fail_on.insert(node_id.into());
        self
    }

    /// Fail teardown of the given node
    pub fn fail_teardown_on(mut self, node_id: impl Into<String>) -> Self {
        self.fail_teardown_on.insert(node_id.into());
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn provision_calls(&self) -> usize {
        self.provision_calls.load(Ordering::SeqCst)
    }

    pub fn teardown_calls(&self) -> usize {
        self.teardown_calls.load(Ordering::SeqCst)
    }

    /// Number of live resources
    pub fn live_count(&self) -> usize {
        self.registry().len()
    }

    pub fn resource(&self, handle: &ResourceHandle) -> Option<LocalResource> {
        self.registry().get(handle).cloned()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<ResourceHandle, LocalResource>> {
        self.resources.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Credential stored under a database's secret name
    fn stored_credential(&self, name: &str) -> Option<Value> {
        self.registry()
            .values()
            .find(|r| r.outputs.get("secretName").and_then(Value::as_str) == Some(name))
            .and_then(|r| r.outputs.get("generatedCredential").cloned())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Provisioner for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn check_auth(&self) -> AuthStatus {
        AuthStatus::ok(format!("local ({})", self.region))
    }

    async fn provision(&self, request: &ProvisionRequest) -> Result<Provisioned, ProvisionError> {
        self.provision_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.fail_on.contains(&request.node_id) {
            return Err(ProvisionError::ApiError(format!(
                "simulated failure for {}",
                request.node_id
            )));
        }

        // 同じノードの生存リソースがあれば引き継ぐ
        let existing = self
            .registry()
            .iter()
            .find(|(_, r)| r.node_id == request.node_id && r.kind == request.kind)
            .map(|(h, r)| (h.clone(), r.outputs.clone()));
        if let Some((handle, outputs)) = existing {
            tracing::info!(node = %request.node_id, handle = %handle, "Adopting existing local resource");
            return Ok(Provisioned { handle, outputs });
        }

        let stored = match secret_name(request) {
            Some(name) if request.kind == "secret" => {
                let stored = self.stored_credential(name);
                if stored.is_none() {
                    tracing::warn!(node = %request.node_id, secret = %name, "Secret not found; generating a new credential");
                }
                stored
            }
            _ => None,
        };
        let outputs = fabricate(request, &self.region, stored.as_ref())?;
        let handle = ResourceHandle::new(format!("{}/{}-{}", request.kind, request.node_id, suffix()));
        self.registry().insert(
            handle.clone(),
            LocalResource {
                node_id: request.node_id.clone(),
                kind: request.kind.clone(),
                outputs: outputs.clone(),
            },
        );
        tracing::debug!(node = %request.node_id, handle = %handle, "Created local resource");
        Ok(Provisioned { handle, outputs })
    }

    async fn teardown(&self, kind: &str, handle: &ResourceHandle) -> Result<(), TeardownError> {
        self.teardown_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let node_id = match self.registry().get(handle) {
            Some(resource) => resource.node_id.clone(),
            None => {
                // 別プロセスで作成されたリソースは既に存在しない
                tracing::warn!(kind = %kind, handle = %handle, "Local resource not found; treating as deleted");
                return Ok(());
            }
        };
        if self.fail_teardown_on.contains(&node_id) {
            return Err(TeardownError::ApiError(format!(
                "simulated teardown failure for {}",
                node_id
            )));
        }

        self.registry().remove(handle);
        tracing::debug!(kind = %kind, handle = %handle, "Deleted local resource");
        Ok(())
    }
}
