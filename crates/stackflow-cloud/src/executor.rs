//! Provisioning executor
//!
//! Walks a stack's fixed deployment plan, resolves each node's configuration
//! from already-provisioned producers, calls the provider and resolves the
//! node's outputs from the result.

use crate::error::{CloudError, ProvisionError, Result};
use crate::provider::{ProvisionRequest, Provisioned, Provisioner};
use crate::result::{DeploymentResult, NodeOutcome, RunStatus, TeardownOutcome, TeardownReport};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use indexmap::IndexMap;
use stackflow_core::{NodeStatus, Stack};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Shared cancellation flag
///
/// Cancelling lets in-flight provisioning calls finish but prevents any new
/// node from starting.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Executor options
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Maximum number of nodes provisioned at the same time
    pub concurrency: usize,

    /// Cancellation flag checked before each node starts
    pub cancel: CancelHandle,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            cancel: CancelHandle::new(),
        }
    }
}

pub struct Executor {
    provider: Arc<dyn Provisioner>,
    options: ExecutorOptions,
}

impl Executor {
    pub fn new(provider: Arc<dyn Provisioner>) -> Self {
        Self {
            provider,
            options: ExecutorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.options.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.options.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.options.cancel.clone()
    }

    pub fn provider(&self) -> &dyn Provisioner {
        self.provider.as_ref()
    }

    /// Provision every pending node of the stack in plan order
    ///
    /// Nodes that are already provisioned are skipped without a provider call.
    /// The first failure halts the run; nodes that never started are reported
    /// as unattempted. Nothing is rolled back.
    #[tracing::instrument(skip_all, fields(stack = %stack.name(), provider = %self.provider.name()))]
    pub async fn run(&self, stack: &mut Stack) -> Result<DeploymentResult> {
        let started = Instant::now();

        if let Some(node) = stack.nodes().find(|n| n.status() == NodeStatus::TornDown) {
            return Err(CloudError::InvalidState(format!(
                "resource '{}' has been torn down; rebuild the stack before running it again",
                node.id()
            )));
        }

        let plan: Vec<String> = stack.plan().iter().map(str::to_string).collect();
        let mut outcomes: IndexMap<String, NodeOutcome> = IndexMap::with_capacity(plan.len());
        for id in &plan {
            let mut node = stack.transition(id)?;
            let outcome = match node.status() {
                NodeStatus::Provisioned => NodeOutcome::AlreadyProvisioned,
                NodeStatus::Failed | NodeStatus::Provisioning => {
                    info!(node = %id, status = %node.status(), "Retrying resource");
                    node.reset()?;
                    NodeOutcome::Unattempted
                }
                _ => NodeOutcome::Unattempted,
            };
            outcomes.insert(id.clone(), outcome);
        }

        let limit = self.options.concurrency.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut halted = false;
        let mut provision_calls = 0;

        loop {
            if !halted && self.options.cancel.is_cancelled() {
                warn!(
                    in_flight = in_flight.len(),
                    "Run cancelled; waiting for in-flight resources"
                );
                halted = true;
            }

            if !halted {
                for id in &plan {
                    if in_flight.len() >= limit {
                        break;
                    }
                    if stack.status_of(id) != Some(NodeStatus::Pending)
                        || !stack.dependencies_satisfied(id)
                    {
                        continue;
                    }
                    match prepare(stack, id) {
                        Ok(request) => {
                            info!(node = %id, kind = %request.kind, "Provisioning resource");
                            provision_calls += 1;
                            in_flight.push(provision(Arc::clone(&self.provider), request));
                        }
                        Err(e) => {
                            // Unresolvable configuration means the graph was built wrong
                            error!(node = %id, error = %e, "Cannot resolve configuration");
                            let attempted_config = mark_failed(stack, id)?;
                            outcomes.insert(
                                id.clone(),
                                NodeOutcome::Failed {
                                    error: e.to_string(),
                                    attempted_config,
                                },
                            );
                            halted = true;
                            break;
                        }
                    }
                }
            }

            let Some((id, result)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(provisioned) => {
                    let handle = provisioned.handle.to_string();
                    let mut node = stack.transition(&id)?;
                    match node.complete(provisioned.handle, provisioned.outputs) {
                        Ok(()) => {
                            info!(node = %id, handle = %handle, "Resource provisioned");
                            outcomes.insert(id, NodeOutcome::Provisioned { handle });
                        }
                        Err(e) => {
                            error!(node = %id, error = %e, "Provider result rejected");
                            let attempted_config = mark_failed(stack, &id)?;
                            outcomes.insert(
                                id,
                                NodeOutcome::Failed {
                                    error: e.to_string(),
                                    attempted_config,
                                },
                            );
                            halted = true;
                        }
                    }
                }
                Err(e) => {
                    error!(node = %id, error = %e, "Provisioning failed");
                    let attempted_config = mark_failed(stack, &id)?;
                    outcomes.insert(
                        id,
                        NodeOutcome::Failed {
                            error: e.to_string(),
                            attempted_config,
                        },
                    );
                    halted = true;
                }
            }
        }

        let status = if outcomes
            .values()
            .any(|o| matches!(o, NodeOutcome::Failed { .. }))
        {
            RunStatus::Failed
        } else if outcomes.values().all(NodeOutcome::is_success) {
            RunStatus::Succeeded
        } else {
            RunStatus::Cancelled
        };

        let result = DeploymentResult {
            status,
            outcomes,
            provision_calls,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            status = %result.status,
            provisioned = result.provisioned().len(),
            unchanged = result.already_provisioned().len(),
            failed = result.failed().len(),
            unattempted = result.unattempted().len(),
            "Run finished"
        );
        Ok(result)
    }

    /// Delete every provisioned node in reverse plan order
    ///
    /// Teardown is best effort: a failure is recorded and the pass continues.
    /// Resources the failed node depends on are retained since it still uses them.
    #[tracing::instrument(skip_all, fields(stack = %stack.name(), provider = %self.provider.name()))]
    pub async fn teardown(&self, stack: &mut Stack) -> Result<TeardownReport> {
        let started = Instant::now();
        let order: Vec<String> = stack.plan().iter().rev().map(str::to_string).collect();
        let mut report = TeardownReport::default();
        let mut retained: HashMap<String, String> = HashMap::new();

        for id in &order {
            let Some(node) = stack.node(id) else {
                continue;
            };
            if node.status() != NodeStatus::Provisioned {
                continue;
            }
            if let Some(blocker) = retained.get(id) {
                debug!(node = %id, blocked_by = %blocker, "Retaining resource");
                report.outcomes.insert(
                    id.clone(),
                    TeardownOutcome::Retained {
                        blocked_by: blocker.clone(),
                    },
                );
                continue;
            }

            let kind = node.kind().to_string();
            let handle = node.handle().cloned().ok_or_else(|| {
                CloudError::InvalidState(format!("provisioned resource '{}' has no handle", id))
            })?;

            info!(node = %id, handle = %handle, "Tearing down resource");
            match self.provider.teardown(&kind, &handle).await {
                Ok(()) => {
                    stack.transition(id)?.mark_torn_down()?;
                    report.outcomes.insert(id.clone(), TeardownOutcome::TornDown);
                }
                Err(e) => {
                    warn!(node = %id, error = %e, "Teardown failed");
                    for dependency in stack.graph().transitive_dependencies(id) {
                        retained.entry(dependency).or_insert_with(|| id.clone());
                    }
                    report.outcomes.insert(
                        id.clone(),
                        TeardownOutcome::Failed {
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            torn_down = report.torn_down().len(),
            failed = report.failed().len(),
            "Teardown finished"
        );
        Ok(report)
    }
}

/// Resolve a node's configuration and mark it provisioning
fn prepare(stack: &mut Stack, id: &str) -> stackflow_core::Result<ProvisionRequest> {
    let mut node = stack.transition(id)?;
    let config = node.config().resolve()?;
    node.mark_provisioning()?;
    Ok(ProvisionRequest {
        node_id: id.to_string(),
        kind: node.kind().to_string(),
        config,
        expected_outputs: node.outputs().keys().cloned().collect(),
    })
}

/// Mark a node failed and return its configuration with secrets masked
fn mark_failed(stack: &mut Stack, id: &str) -> Result<serde_json::Value> {
    let mut node = stack.transition(id)?;
    node.mark_failed()?;
    Ok(node.config().redacted())
}

async fn provision(
    provider: Arc<dyn Provisioner>,
    request: ProvisionRequest,
) -> (String, std::result::Result<Provisioned, ProvisionError>) {
    let result = provider.provision(&request).await;
    (request.node_id, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TeardownError;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use stackflow_core::{
        ConfigValue, MASK, ResourceHandle, StackBuilder, StackError, Template, report,
    };
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Provider that records every call and fabricates outputs
    #[derive(Default)]
    struct RecordingProvider {
        events: Mutex<Vec<String>>,
        configs: Mutex<HashMap<String, Value>>,
        fail_on: Mutex<HashSet<String>>,
        fail_teardown: HashSet<String>,
        omit_output: Option<(String, String)>,
        cancel_on: Option<(String, CancelHandle)>,
        delay: Option<Duration>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl RecordingProvider {
        fn failing(node: &str) -> Self {
            let provider = Self::default();
            provider.fail_on.lock().unwrap().insert(node.to_string());
            provider
        }

        fn calls(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| e.strip_prefix("start:").map(str::to_string))
                .collect()
        }

        fn teardowns(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| e.strip_prefix("teardown:").map(str::to_string))
                .collect()
        }

        fn position(&self, event: &str) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .position(|e| e == event)
                .unwrap()
        }
    }

    #[async_trait]
    impl Provisioner for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn provision(
            &self,
            request: &ProvisionRequest,
        ) -> std::result::Result<Provisioned, ProvisionError> {
            let id = request.node_id.clone();
            self.events.lock().unwrap().push(format!("start:{}", id));
            self.configs
                .lock()
                .unwrap()
                .insert(id.clone(), request.config.clone());

            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            if let Some((node, cancel)) = &self.cancel_on
                && *node == id
            {
                cancel.cancel();
            }
            self.events.lock().unwrap().push(format!("end:{}", id));

            if self.fail_on.lock().unwrap().contains(&id) {
                return Err(ProvisionError::ApiError(format!("{} rejected", id)));
            }

            let mut provisioned = Provisioned::new(format!("h-{}", id));
            for attr in &request.expected_outputs {
                if self
                    .omit_output
                    .as_ref()
                    .is_some_and(|(n, a)| *n == id && a == attr)
                {
                    continue;
                }
                let value = match attr.as_str() {
                    "endpointPort" => json!(5432),
                    "generatedCredential" => json!({"username": "app", "password": "pw-123"}),
                    _ => json!(format!("{}-{}", id, attr)),
                };
                provisioned = provisioned.with_output(attr.clone(), value);
            }
            Ok(provisioned)
        }

        async fn teardown(
            &self,
            _kind: &str,
            handle: &ResourceHandle,
        ) -> std::result::Result<(), TeardownError> {
            let id = handle.as_str().trim_start_matches("h-").to_string();
            self.events.lock().unwrap().push(format!("teardown:{}", id));
            if self.fail_teardown.contains(&id) {
                return Err(TeardownError::InUse(id));
            }
            Ok(())
        }
    }

    /// Network -> Database -> Secret -> Environment
    fn carbon_cycle() -> Stack {
        let mut b = StackBuilder::new("carbon-cycle");
        let net = b
            .declare("Network", "network", ConfigValue::map([("maxAzs", 2)]), &[])
            .unwrap();
        let db = b
            .declare(
                "Database",
                "database",
                ConfigValue::map([("vpc", net.output("vpcId").unwrap())]),
                &["Network"],
            )
            .unwrap();
        let secret = b
            .declare(
                "Secret",
                "secret",
                ConfigValue::map([
                    ("secret-name", db.output("secretName").unwrap()),
                    ("credential", db.output("generatedCredential").unwrap()),
                ]),
                &["Database"],
            )
            .unwrap();
        let env = Template::new()
            .with("DB_HOST", db.output("endpointAddress").unwrap())
            .with("DB_PORT", db.output("endpointPort").unwrap())
            .with("DB_USER", secret.output("username").unwrap())
            .with("DB_PASSWORD", secret.output("password").unwrap());
        let environment = b
            .declare(
                "Environment",
                "environment",
                ConfigValue::map([("env", env)]),
                &["Secret", "Database"],
            )
            .unwrap();
        b.output(
            "DatabaseEndpoint",
            db.output("endpointAddress").unwrap(),
            None,
        )
        .unwrap();
        b.output(
            "EnvironmentUrl",
            ConfigValue::concat([
                ConfigValue::from("http://"),
                ConfigValue::from(environment.output("endpointUrl").unwrap()),
            ]),
            None,
        )
        .unwrap();
        b.build().unwrap()
    }

    fn executor(provider: &Arc<RecordingProvider>) -> Executor {
        Executor::new(provider.clone() as Arc<dyn Provisioner>)
    }

    #[tokio::test]
    async fn test_run_provisions_in_plan_order() {
        let provider = Arc::new(RecordingProvider::default());
        let mut stack = carbon_cycle();

        let result = executor(&provider).run(&mut stack).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.provision_calls, 4);
        assert_eq!(
            provider.calls(),
            vec!["Network", "Database", "Secret", "Environment"]
        );
        assert_eq!(stack.count_with_status(NodeStatus::Provisioned), 4);

        // 依存先の確定値が設定に渡る
        let configs = provider.configs.lock().unwrap();
        assert_eq!(configs["Database"]["vpc"], json!("Network-vpcId"));
        assert_eq!(configs["Secret"]["secret-name"], json!("Database-secretName"));
        assert_eq!(
            configs["Secret"]["credential"],
            json!("#{secret:Database/generatedCredential}")
        );
        let env = &configs["Environment"]["env"];
        assert_eq!(env["DB_HOST"], json!("Database-endpointAddress"));
        assert_eq!(env["DB_PORT"], json!("5432"));
        assert_eq!(env["DB_PASSWORD"], json!("#{secret:Secret/password}"));
        assert!(!env.to_string().contains("Secret-password"));
    }

    #[tokio::test]
    async fn test_sensitive_outputs_never_reach_provider_config() {
        let provider = Arc::new(RecordingProvider::default());
        let mut stack = carbon_cycle();
        executor(&provider).run(&mut stack).await.unwrap();

        let configs = provider.configs.lock().unwrap();
        for (node, config) in configs.iter() {
            let rendered = config.to_string();
            assert!(!rendered.contains("pw-123"), "{} received a raw credential", node);
            assert!(!rendered.contains("Secret-password"), "{} received a raw password", node);
            assert!(!rendered.contains("Secret-username"), "{} received a raw username", node);
        }
    }

    #[tokio::test]
    async fn test_report_after_run() {
        let provider = Arc::new(RecordingProvider::default());
        let mut stack = carbon_cycle();
        executor(&provider).run(&mut stack).await.unwrap();

        let report = report(&stack);
        assert_eq!(
            report.attribute("Database", "endpointAddress").unwrap().value,
            "Database-endpointAddress"
        );
        assert_eq!(report.attribute("Secret", "password").unwrap().value, MASK);
        assert_eq!(
            report.output("EnvironmentUrl").unwrap().value,
            "http://Environment-endpointUrl"
        );
        assert!(!report.to_string().contains("Secret-password"));
    }

    #[tokio::test]
    async fn test_rerun_is_noop() {
        let provider = Arc::new(RecordingProvider::default());
        let mut stack = carbon_cycle();
        let exec = executor(&provider);
        exec.run(&mut stack).await.unwrap();

        let second = exec.run(&mut stack).await.unwrap();
        assert!(second.is_success());
        assert_eq!(second.provision_calls, 0);
        assert_eq!(second.already_provisioned().len(), 4);
        assert_eq!(provider.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_failure_halts_dependents() {
        let provider = Arc::new(RecordingProvider::failing("Database"));
        let mut stack = carbon_cycle();

        let result = executor(&provider).run(&mut stack).await.unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.succeeded(), vec!["Network"]);
        assert_eq!(result.failed(), vec!["Database"]);
        assert_eq!(result.unattempted(), vec!["Secret", "Environment"]);
        assert_eq!(provider.calls(), vec!["Network", "Database"]);
        assert_eq!(stack.status_of("Database"), Some(NodeStatus::Failed));
        assert_eq!(stack.status_of("Secret"), Some(NodeStatus::Pending));

        match result.outcome("Database").unwrap() {
            NodeOutcome::Failed {
                error,
                attempted_config,
            } => {
                assert!(error.contains("Database rejected"));
                assert_eq!(attempted_config["vpc"], json!("Network-vpcId"));
            }
            other => panic!("Expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_after_failure_skips_provisioned_nodes() {
        let provider = Arc::new(RecordingProvider::failing("Secret"));
        let mut stack = carbon_cycle();
        let exec = executor(&provider);

        let first = exec.run(&mut stack).await.unwrap();
        assert_eq!(first.failed(), vec!["Secret"]);

        provider.fail_on.lock().unwrap().clear();
        let second = exec.run(&mut stack).await.unwrap();

        assert!(second.is_success());
        assert_eq!(second.already_provisioned(), vec!["Network", "Database"]);
        assert_eq!(second.provisioned(), vec!["Secret", "Environment"]);
        assert_eq!(
            provider.calls(),
            vec!["Network", "Database", "Secret", "Secret", "Environment"]
        );
    }

    #[tokio::test]
    async fn test_missing_output_fails_node() {
        let provider = Arc::new(RecordingProvider {
            omit_output: Some(("Database".to_string(), "endpointPort".to_string())),
            ..Default::default()
        });
        let mut stack = carbon_cycle();

        let result = executor(&provider).run(&mut stack).await.unwrap();

        assert_eq!(result.failed(), vec!["Database"]);
        assert!(matches!(
            result.outcome("Database"),
            Some(NodeOutcome::Failed { error, .. }) if error.contains("endpointPort")
        ));
        let address = stack
            .node("Database")
            .unwrap()
            .output("endpointAddress")
            .unwrap();
        assert!(matches!(address.read(), Err(StackError::NotYetResolved(_))));
    }

    #[tokio::test]
    async fn test_cancel_before_run() {
        let provider = Arc::new(RecordingProvider::default());
        let mut stack = carbon_cycle();
        let exec = executor(&provider);
        exec.cancel_handle().cancel();

        let result = exec.run(&mut stack).await.unwrap();

        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(result.unattempted().len(), 4);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_node_finish() {
        let cancel = CancelHandle::new();
        let provider = Arc::new(RecordingProvider {
            cancel_on: Some(("Database".to_string(), cancel.clone())),
            ..Default::default()
        });
        let mut stack = carbon_cycle();

        let result = executor(&provider)
            .with_cancel_handle(cancel)
            .run(&mut stack)
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(result.succeeded(), vec!["Network", "Database"]);
        assert_eq!(result.unattempted(), vec!["Secret", "Environment"]);
        assert_eq!(stack.status_of("Database"), Some(NodeStatus::Provisioned));
    }

    #[tokio::test]
    async fn test_concurrency_respects_dependencies() {
        let mut b = StackBuilder::new("parallel");
        let net = b
            .declare("Network", "network", ConfigValue::empty(), &[])
            .unwrap();
        b.declare("Role", "role", ConfigValue::empty(), &[]).unwrap();
        b.declare("Bundle", "artifact", ConfigValue::empty(), &[])
            .unwrap();
        b.declare(
            "Database",
            "database",
            ConfigValue::map([("vpc", net.output("vpcId").unwrap())]),
            &[],
        )
        .unwrap();
        b.declare(
            "App",
            "application",
            ConfigValue::empty(),
            &["Role", "Bundle", "Database"],
        )
        .unwrap();
        let mut stack = b.build().unwrap();

        let provider = Arc::new(RecordingProvider {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let result = executor(&provider)
            .with_concurrency(2)
            .run(&mut stack)
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(provider.max_active.load(Ordering::SeqCst), 2);
        for node in ["Database", "App"] {
            for dep in stack.graph().dependencies_of(node) {
                assert!(
                    provider.position(&format!("end:{}", dep))
                        < provider.position(&format!("start:{}", node)),
                    "{} started before {} finished",
                    node,
                    dep
                );
            }
        }
    }

    #[tokio::test]
    async fn test_failure_with_concurrency_waits_for_in_flight() {
        let mut b = StackBuilder::new("parallel-failure");
        b.declare("A", "role", ConfigValue::empty(), &[]).unwrap();
        b.declare("B", "role", ConfigValue::empty(), &[]).unwrap();
        b.declare("C", "role", ConfigValue::empty(), &["A"]).unwrap();
        let mut stack = b.build().unwrap();

        let provider = Arc::new(RecordingProvider {
            delay: Some(Duration::from_millis(10)),
            ..RecordingProvider::failing("A")
        });
        let result = executor(&provider)
            .with_concurrency(4)
            .run(&mut stack)
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.failed(), vec!["A"]);
        // B は A と同時に開始済みなので完了まで待つ
        assert_eq!(result.provisioned(), vec!["B"]);
        assert_eq!(result.unattempted(), vec!["C"]);
    }

    #[tokio::test]
    async fn test_teardown_in_reverse_order() {
        let provider = Arc::new(RecordingProvider::default());
        let mut stack = carbon_cycle();
        let exec = executor(&provider);
        exec.run(&mut stack).await.unwrap();

        let report = exec.teardown(&mut stack).await.unwrap();

        assert!(report.is_success());
        assert_eq!(
            provider.teardowns(),
            vec!["Environment", "Secret", "Database", "Network"]
        );
        assert_eq!(stack.count_with_status(NodeStatus::TornDown), 4);

        let rerun = exec.run(&mut stack).await;
        assert!(matches!(rerun, Err(CloudError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_teardown_is_best_effort() {
        let mut b = StackBuilder::new("teardown");
        b.declare("Network", "network", ConfigValue::empty(), &[])
            .unwrap();
        b.declare("Database", "database", ConfigValue::empty(), &["Network"])
            .unwrap();
        b.declare("Secret", "secret", ConfigValue::empty(), &["Database"])
            .unwrap();
        b.declare("Bucket", "artifact", ConfigValue::empty(), &[])
            .unwrap();
        let mut stack = b.build().unwrap();

        let provider = Arc::new(RecordingProvider {
            fail_teardown: HashSet::from(["Secret".to_string()]),
            ..Default::default()
        });
        let exec = executor(&provider);
        exec.run(&mut stack).await.unwrap();

        let report = exec.teardown(&mut stack).await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed(), vec!["Secret"]);
        assert_eq!(report.torn_down(), vec!["Bucket"]);
        assert_eq!(
            report.outcomes["Database"],
            TeardownOutcome::Retained {
                blocked_by: "Secret".to_string()
            }
        );
        assert!(matches!(
            report.outcomes["Network"],
            TeardownOutcome::Retained { .. }
        ));
        assert_eq!(provider.teardowns(), vec!["Bucket", "Secret"]);
        assert_eq!(stack.status_of("Secret"), Some(NodeStatus::Provisioned));
        assert_eq!(stack.status_of("Bucket"), Some(NodeStatus::TornDown));
    }
}
