//! State management for provisioned stacks
//!
//! Manages the `.stackflow/state.json` file which records, per node, the
//! lifecycle status, the provider handle and the resolved outputs. Reloading
//! it before a run makes a rerun in a new process skip what already exists.

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stackflow_core::{NodeStatus, ResourceHandle, Stack};
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".stackflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Persisted state of one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    /// State file version
    pub version: u32,

    /// Stack name the state belongs to
    pub stack: String,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Node records in plan order
    pub nodes: IndexMap<String, NodeRecord>,
}

/// Persisted state of a single node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub kind: String,

    pub status: NodeStatus,

    /// Provider-specific resource handle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<ResourceHandle>,

    /// Resolved output attributes
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Value>,

    pub updated_at: DateTime<Utc>,
}

impl StackState {
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION,
            stack: stack.into(),
            updated_at: Utc::now(),
            nodes: IndexMap::new(),
        }
    }

    /// Record the current status of every node
    pub fn capture(stack: &Stack) -> Self {
        let now = Utc::now();
        let nodes = stack
            .nodes_in_plan_order()
            .map(|node| {
                let outputs = node
                    .outputs()
                    .iter()
                    .filter_map(|(name, d)| d.read().ok().map(|v| (name.clone(), v.clone())))
                    .collect();
                let record = NodeRecord {
                    kind: node.kind().to_string(),
                    status: node.status(),
                    handle: node.handle().cloned(),
                    outputs,
                    updated_at: now,
                };
                (node.id().to_string(), record)
            })
            .collect();

        Self {
            version: STATE_VERSION,
            stack: stack.name().to_string(),
            updated_at: now,
            nodes,
        }
    }

    /// Restore recorded statuses onto a freshly built stack
    ///
    /// Provisioned nodes get their handle back and their outputs resolved,
    /// failed nodes are marked failed. Nodes recorded as provisioning or
    /// torn down start over as pending. Returns the number of nodes restored
    /// as provisioned.
    pub fn apply(&self, stack: &mut Stack) -> Result<usize> {
        if self.stack != stack.name() {
            return Err(CloudError::StateError(format!(
                "state belongs to stack '{}', not '{}'",
                self.stack,
                stack.name()
            )));
        }

        let mut restored = 0;
        for (id, record) in &self.nodes {
            let Ok(mut node) = stack.transition(id) else {
                tracing::warn!(node = %id, "Recorded node is no longer declared; ignoring");
                continue;
            };
            if node.kind() != record.kind {
                return Err(CloudError::StateError(format!(
                    "node '{}' was recorded as kind '{}' but is declared as '{}'",
                    id,
                    record.kind,
                    node.kind()
                )));
            }

            match record.status {
                NodeStatus::Provisioned => {
                    let handle = record.handle.clone().ok_or_else(|| {
                        CloudError::StateError(format!(
                            "provisioned node '{}' has no handle recorded",
                            id
                        ))
                    })?;
                    node.complete(handle, record.outputs.clone())?;
                    restored += 1;
                }
                NodeStatus::Failed => node.mark_failed()?,
                NodeStatus::Provisioning => {
                    tracing::warn!(node = %id, "Node was interrupted while provisioning; it will be retried");
                }
                NodeStatus::Pending | NodeStatus::TornDown => {}
            }
        }

        tracing::debug!(restored, "Applied recorded state");
        Ok(restored)
    }

    pub fn record(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    /// Number of nodes recorded as provisioned
    pub fn provisioned_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|r| r.status == NodeStatus::Provisioned)
            .count()
    }
}

/// State manager for reading/writing state files
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the recorded state for a stack
    ///
    /// Returns an empty state when nothing has been recorded yet.
    pub async fn load(&self, stack: &str) -> Result<StackState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(StackState::new(stack));
        }

        let content = fs::read_to_string(&path).await?;
        let state: StackState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }
        if state.stack != stack {
            return Err(CloudError::StateError(format!(
                "State file {} belongs to stack '{}', not '{}'",
                path.display(),
                state.stack,
                stack
            )));
        }

        tracing::debug!("Loaded state with {} nodes", state.nodes.len());
        Ok(state)
    }

    /// Load the recorded state and apply it to the stack
    pub async fn restore(&self, stack: &mut Stack) -> Result<usize> {
        let state = self.load(stack.name()).await?;
        state.apply(stack)
    }

    pub async fn save(&self, state: &StackState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} nodes", state.nodes.len());
        Ok(())
    }

    /// Capture the stack and save it
    pub async fn persist(&self, stack: &Stack) -> Result<()> {
        self.save(&StackState::capture(stack)).await
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than an hour are stale
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
