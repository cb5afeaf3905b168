//! リソースノード

use crate::deferred::Deferred;
use crate::error::{Result, StackError};
use crate::value::ConfigValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::Deref;

/// ノードの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// 未着手
    Pending,
    /// プロビジョニング中
    Provisioning,
    /// プロビジョニング完了 (出力は確定済み)
    Provisioned,
    /// プロビジョニング失敗
    Failed,
    /// 明示的なティアダウンで削除済み
    TornDown,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Provisioning => write!(f, "provisioning"),
            NodeStatus::Provisioned => write!(f, "provisioned"),
            NodeStatus::Failed => write!(f, "failed"),
            NodeStatus::TornDown => write!(f, "torn_down"),
        }
    }
}

/// プロバイダーが返すリソースハンドル
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 宣言されたリソース
#[derive(Debug, Clone)]
pub struct Node {
    id: String,
    kind: String,
    config: ConfigValue,
    explicit_dependencies: Vec<String>,
    outputs: IndexMap<String, Deferred>,
    status: NodeStatus,
    handle: Option<ResourceHandle>,
}

impl Node {
    pub(crate) fn new(
        id: String,
        kind: String,
        config: ConfigValue,
        explicit_dependencies: Vec<String>,
        outputs: IndexMap<String, Deferred>,
    ) -> Self {
        Self {
            id,
            kind,
            config,
            explicit_dependencies,
            outputs,
            status: NodeStatus::Pending,
            handle: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn config(&self) -> &ConfigValue {
        &self.config
    }

    pub fn explicit_dependencies(&self) -> &[String] {
        &self.explicit_dependencies
    }

    pub(crate) fn add_explicit_dependency(&mut self, dependency: &str) {
        if !self.explicit_dependencies.iter().any(|d| d == dependency) {
            self.explicit_dependencies.push(dependency.to_string());
        }
    }

    /// 出力属性名から遅延値へのマッピング (宣言順)
    pub fn outputs(&self) -> &IndexMap<String, Deferred> {
        &self.outputs
    }

    pub fn output(&self, attribute: &str) -> Result<&Deferred> {
        self.outputs
            .get(attribute)
            .ok_or_else(|| StackError::UnknownOutput {
                node: self.id.clone(),
                attribute: attribute.to_string(),
            })
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn handle(&self) -> Option<&ResourceHandle> {
        self.handle.as_ref()
    }

    /// 未着手・失敗状態から再実行可能な状態へ戻す
    pub(crate) fn reset(&mut self) -> Result<()> {
        match self.status {
            NodeStatus::Pending | NodeStatus::Failed | NodeStatus::Provisioning => {
                self.status = NodeStatus::Pending;
                Ok(())
            }
            _ => Err(self.invalid_transition()),
        }
    }

    pub(crate) fn mark_provisioning(&mut self) -> Result<()> {
        if self.status != NodeStatus::Pending {
            return Err(self.invalid_transition());
        }
        self.status = NodeStatus::Provisioning;
        Ok(())
    }

    /// プロビジョニング完了。宣言された全ての出力を確定する
    ///
    /// 出力が一つでも欠けていれば何も確定せずにエラーを返します。
    pub(crate) fn complete(
        &mut self,
        handle: ResourceHandle,
        mut outputs: IndexMap<String, Value>,
    ) -> Result<()> {
        if !matches!(self.status, NodeStatus::Pending | NodeStatus::Provisioning) {
            return Err(self.invalid_transition());
        }
        if let Some(missing) = self.outputs.keys().find(|k| !outputs.contains_key(*k)) {
            return Err(StackError::MissingOutput {
                node: self.id.clone(),
                attribute: missing.clone(),
            });
        }

        for (attribute, deferred) in &self.outputs {
            if let Some(value) = outputs.shift_remove(attribute) {
                deferred.resolve(value)?;
            }
        }
        if !outputs.is_empty() {
            tracing::debug!(
                node = %self.id,
                extra = ?outputs.keys().collect::<Vec<_>>(),
                "Ignoring undeclared outputs"
            );
        }

        self.handle = Some(handle);
        self.status = NodeStatus::Provisioned;
        Ok(())
    }

    pub(crate) fn mark_failed(&mut self) -> Result<()> {
        if !matches!(self.status, NodeStatus::Pending | NodeStatus::Provisioning) {
            return Err(self.invalid_transition());
        }
        self.status = NodeStatus::Failed;
        Ok(())
    }

    /// ティアダウン完了。確定済みの出力は古い値として残る
    pub(crate) fn mark_torn_down(&mut self) -> Result<()> {
        if self.status != NodeStatus::Provisioned {
            return Err(self.invalid_transition());
        }
        self.handle = None;
        self.status = NodeStatus::TornDown;
        Ok(())
    }

    fn invalid_transition(&self) -> StackError {
        StackError::InvalidTransition {
            node: self.id.clone(),
            status: self.status.to_string(),
        }
    }
}

/// ノードの状態遷移
///
/// `Stack::transition` からのみ得られます。エグゼキューターと状態の復元が
/// 使う操作で、出力の確定はここを通してしか行えません。
///
/// ```compile_fail
/// # use stackflow_core::{ConfigValue, ResourceHandle, StackBuilder};
/// let mut builder = StackBuilder::new("demo");
/// builder.declare("App", "application", ConfigValue::empty(), &[]).unwrap();
/// let mut stack = builder.build().unwrap();
/// // ノードを直接変更する手段は公開されていない
/// stack.node_mut("App").unwrap().mark_provisioning();
/// ```
#[doc(hidden)]
pub struct Transition<'a> {
    node: &'a mut Node,
}

impl<'a> Transition<'a> {
    pub(crate) fn new(node: &'a mut Node) -> Self {
        Self { node }
    }

    pub fn reset(&mut self) -> Result<()> {
        self.node.reset()
    }

    pub fn mark_provisioning(&mut self) -> Result<()> {
        self.node.mark_provisioning()
    }

    pub fn complete(
        &mut self,
        handle: ResourceHandle,
        outputs: IndexMap<String, Value>,
    ) -> Result<()> {
        self.node.complete(handle, outputs)
    }

    pub fn mark_failed(&mut self) -> Result<()> {
        self.node.mark_failed()
    }

    pub fn mark_torn_down(&mut self) -> Result<()> {
        self.node.mark_torn_down()
    }
}

impl Deref for Transition<'_> {
    type Target = Node;

    fn deref(&self) -> &Node {
        self.node
    }
}
