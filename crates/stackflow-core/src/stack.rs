//! スタック定義
//!
//! `StackBuilder` はグラフ構築用の明示的なオブジェクトで、全てのリソース宣言は
//! これを経由します。グローバルな「現在のスタック」は持たないため、複数の
//! スタックを独立して構築・テストできます。

use crate::catalog::KindCatalog;
use crate::deferred::Deferred;
use crate::error::{Result, StackError};
use crate::graph::DependencyGraph;
use crate::node::{Node, NodeStatus, Transition};
use crate::value::ConfigValue;
use indexmap::IndexMap;
use std::fmt;
use tracing::{debug, info};

/// 宣言されたノードへのハンドル
#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: String,
    outputs: IndexMap<String, Deferred>,
}

impl NodeHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 名前付きの出力 (宣言時点では未確定)
    pub fn output(&self, attribute: &str) -> Result<Deferred> {
        self.outputs
            .get(attribute)
            .cloned()
            .ok_or_else(|| StackError::UnknownOutput {
                node: self.id.clone(),
                attribute: attribute.to_string(),
            })
    }

    pub fn outputs(&self) -> &IndexMap<String, Deferred> {
        &self.outputs
    }
}

/// スタック出力 (実行後に利用者へ提示する値)
#[derive(Debug, Clone)]
pub struct StackOutput {
    pub name: String,
    pub value: ConfigValue,
    pub description: Option<String>,
}

/// 実行前に一度だけ計算される固定のプロビジョニング順序
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    order: Vec<String>,
}

impl DeploymentPlan {
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|o| o == id)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.order
    }
}

impl fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.order.iter().enumerate() {
            writeln!(f, "{:>3}. {}", i + 1, id)?;
        }
        Ok(())
    }
}

pub struct StackBuilder {
    name: String,
    catalog: KindCatalog,
    graph: DependencyGraph,
    nodes: IndexMap<String, Node>,
    outputs: IndexMap<String, StackOutput>,
}

impl StackBuilder {
    /// 標準カタログでビルダーを作成
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_catalog(name, KindCatalog::standard())
    }

    pub fn with_catalog(name: impl Into<String>, catalog: KindCatalog) -> Self {
        Self {
            name: name.into(),
            catalog,
            graph: DependencyGraph::new(),
            nodes: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &KindCatalog {
        &self.catalog
    }

    /// リソースを宣言
    ///
    /// 設定に埋め込まれた参照から暗黙の依存エッジを、`dependencies` から明示的な
    /// 依存エッジを追加します。依存先は宣言済みでなければなりません。
    #[tracing::instrument(skip(self, config, dependencies), fields(stack = %self.name))]
    pub fn declare(
        &mut self,
        id: &str,
        kind: &str,
        config: impl Into<ConfigValue>,
        dependencies: &[&str],
    ) -> Result<NodeHandle> {
        let config = config.into();
        let spec = self
            .catalog
            .get(kind)
            .ok_or_else(|| StackError::UnknownKind(kind.to_string()))?;
        if self.nodes.contains_key(id) {
            return Err(StackError::DuplicateNode(id.to_string()));
        }
        if let Some(missing) = dependencies.iter().find(|d| !self.nodes.contains_key(**d)) {
            return Err(StackError::UnknownDependency(missing.to_string()));
        }

        let mut implicit: Vec<String> = Vec::new();
        for reference in config.references() {
            self.check_reference(reference)?;
            if !implicit.iter().any(|p| p == reference.producer()) {
                implicit.push(reference.producer().to_string());
            }
        }

        let outputs: IndexMap<String, Deferred> = spec
            .outputs
            .iter()
            .map(|o| {
                (
                    o.name.clone(),
                    Deferred::with_sensitivity(id, &o.name, o.sensitive),
                )
            })
            .collect();

        self.graph.add_node(id)?;
        for dependency in dependencies.iter().copied().chain(implicit.iter().map(String::as_str)) {
            self.graph.add_edge(id, dependency)?;
        }

        let explicit = dependencies.iter().map(|d| d.to_string()).collect();
        let node = Node::new(
            id.to_string(),
            kind.to_string(),
            config,
            explicit,
            outputs.clone(),
        );
        self.nodes.insert(id.to_string(), node);

        debug!(
            node = id,
            kind,
            explicit = dependencies.len(),
            implicit = implicit.len(),
            "Declared resource"
        );

        Ok(NodeHandle {
            id: id.to_string(),
            outputs,
        })
    }

    /// 明示的な依存を後から追加 (冪等)
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) -> Result<()> {
        let node = self
            .nodes
            .get_mut(dependent)
            .ok_or_else(|| StackError::UnknownNode(dependent.to_string()))?;
        if !self.graph.contains(dependency) {
            return Err(StackError::UnknownDependency(dependency.to_string()));
        }
        self.graph.add_edge(dependent, dependency)?;
        node.add_explicit_dependency(dependency);
        Ok(())
    }

    /// 宣言済みノードの出力を取得
    pub fn reference(&self, node: &str, attribute: &str) -> Result<Deferred> {
        let node = self
            .nodes
            .get(node)
            .ok_or_else(|| StackError::UnknownDependency(node.to_string()))?;
        node.output(attribute).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// スタック出力を宣言
    pub fn output(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ConfigValue>,
        description: Option<String>,
    ) -> Result<()> {
        let value = value.into();
        for reference in value.references() {
            self.check_reference(reference)?;
        }
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(StackError::InvalidDefinition(format!(
                "出力 '{}' が重複しています",
                name
            )));
        }
        self.outputs.insert(
            name.clone(),
            StackOutput {
                name,
                value,
                description,
            },
        );
        Ok(())
    }

    /// 参照がこのビルダーで宣言されたノードの出力であることを確認
    fn check_reference(&self, reference: &Deferred) -> Result<()> {
        let owned = self
            .nodes
            .get(reference.producer())
            .and_then(|n| n.outputs().get(reference.attribute()))
            .is_some_and(|d| d.same_cell(reference));
        if owned {
            Ok(())
        } else {
            Err(StackError::UnknownDependency(reference.producer().to_string()))
        }
    }

    /// デプロイ計画を確定してスタックを生成
    ///
    /// 循環依存はここで検出され、プロビジョニング開始前に失敗します。
    pub fn build(self) -> Result<Stack> {
        let order = self.graph.topological_order()?;
        info!(stack = %self.name, nodes = order.len(), "Deployment plan computed");
        Ok(Stack {
            name: self.name,
            graph: self.graph,
            nodes: self.nodes,
            outputs: self.outputs,
            plan: DeploymentPlan { order },
        })
    }
}

/// 計画確定済みのスタック
#[derive(Debug)]
pub struct Stack {
    name: String,
    graph: DependencyGraph,
    nodes: IndexMap<String, Node>,
    outputs: IndexMap<String, StackOutput>,
    plan: DeploymentPlan,
}

impl Stack {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plan(&self) -> &DeploymentPlan {
        &self.plan
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// ノードの状態遷移。エグゼキューターと状態の復元専用
    #[doc(hidden)]
    pub fn transition(&mut self, id: &str) -> Result<Transition<'_>> {
        self.nodes
            .get_mut(id)
            .map(Transition::new)
            .ok_or_else(|| StackError::UnknownNode(id.to_string()))
    }

    /// 宣言順のノード
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// 計画順のノード
    pub fn nodes_in_plan_order(&self) -> impl Iterator<Item = &Node> {
        self.plan.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn outputs(&self) -> impl Iterator<Item = &StackOutput> {
        self.outputs.values()
    }

    pub fn status_of(&self, id: &str) -> Option<NodeStatus> {
        self.nodes.get(id).map(Node::status)
    }

    /// 依存先が全てプロビジョニング済みか
    pub fn dependencies_satisfied(&self, id: &str) -> bool {
        self.graph
            .dependencies_of(id)
            .iter()
            .all(|d| self.status_of(d) == Some(NodeStatus::Provisioned))
    }

    pub fn count_with_status(&self, status: NodeStatus) -> usize {
        self.nodes.values().filter(|n| n.status() == status).count()
    }
}
