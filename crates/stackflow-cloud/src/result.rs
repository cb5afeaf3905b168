//! Outcome types for deployment and teardown runs

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stackflow_core::{NodeStatus, Stack};
use std::fmt;

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every node is provisioned
    Succeeded,
    /// A node failed and provisioning halted
    Failed,
    /// The run was cancelled before every node started
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What happened to a single node during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NodeOutcome {
    /// Provisioned during this run
    Provisioned { handle: String },
    /// Already provisioned before the run; no provider call was made
    AlreadyProvisioned,
    /// The provider call (or output resolution) failed
    Failed {
        error: String,
        /// Attempted configuration with sensitive values masked
        attempted_config: serde_json::Value,
    },
    /// Never started
    Unattempted,
}

impl NodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            NodeOutcome::Provisioned { .. } | NodeOutcome::AlreadyProvisioned
        )
    }
}

/// Result of `Executor::run`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub status: RunStatus,

    /// Outcome per node, in plan order
    pub outcomes: IndexMap<String, NodeOutcome>,

    /// Number of provider calls issued
    pub provision_calls: usize,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl DeploymentResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn outcome(&self, id: &str) -> Option<&NodeOutcome> {
        self.outcomes.get(id)
    }

    /// Nodes provisioned during this run
    pub fn provisioned(&self) -> Vec<&str> {
        self.filter(|o| matches!(o, NodeOutcome::Provisioned { .. }))
    }

    /// Nodes that were already provisioned
    pub fn already_provisioned(&self) -> Vec<&str> {
        self.filter(|o| matches!(o, NodeOutcome::AlreadyProvisioned))
    }

    /// Nodes that are provisioned after the run
    pub fn succeeded(&self) -> Vec<&str> {
        self.filter(NodeOutcome::is_success)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.filter(|o| matches!(o, NodeOutcome::Failed { .. }))
    }

    pub fn unattempted(&self) -> Vec<&str> {
        self.filter(|o| matches!(o, NodeOutcome::Unattempted))
    }

    fn filter(&self, pred: impl Fn(&NodeOutcome) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| pred(*o))
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// What happened to a single node during teardown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TeardownOutcome {
    TornDown,
    Failed { error: String },
    /// Kept because a dependent could not be torn down
    Retained { blocked_by: String },
}

/// Result of `Executor::teardown`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeardownReport {
    /// Outcome per provisioned node, in reverse plan order
    pub outcomes: IndexMap<String, TeardownOutcome>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl TeardownReport {
    pub fn is_success(&self) -> bool {
        self.outcomes
            .values()
            .all(|o| matches!(o, TeardownOutcome::TornDown))
    }

    pub fn torn_down(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TeardownOutcome::TornDown))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TeardownOutcome::Failed { .. }))
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Summary of what a run would do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub provision: usize,
    pub retry: usize,
    pub unchanged: usize,
}

impl PlanSummary {
    pub fn of(stack: &Stack) -> Self {
        let mut summary = PlanSummary {
            provision: 0,
            retry: 0,
            unchanged: 0,
        };
        for node in stack.nodes() {
            match node.status() {
                NodeStatus::Provisioned => summary.unchanged += 1,
                NodeStatus::Failed | NodeStatus::Provisioning => summary.retry += 1,
                NodeStatus::Pending | NodeStatus::TornDown => summary.provision += 1,
            }
        }
        summary
    }

    pub fn has_changes(&self) -> bool {
        self.provision + self.retry > 0
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to provision, {} to retry, {} unchanged",
            self.provision, self.retry, self.unchanged
        )
    }
}
