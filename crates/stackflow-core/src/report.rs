//! 出力レポート
//!
//! 実行後の確定値を人間向けにまとめます。機密属性はどの経路でも固定の
//! マスク文字列で表示され、無効化する手段はありません。

use crate::node::NodeStatus;
use crate::stack::Stack;
use crate::value::{ConfigValue, to_text};
use serde::Serialize;
use std::fmt;

/// 機密値の代わりに表示する固定文字列
pub const MASK: &str = "********";

const UNRESOLVED: &str = "(unresolved)";

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub stack: String,
    pub nodes: Vec<NodeReport>,
    pub outputs: Vec<OutputReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub id: String,
    pub kind: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub attributes: Vec<AttributeReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttributeReport {
    pub name: String,
    pub value: String,
    pub sensitive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputReport {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: String,
}

/// スタックのレポートを生成
pub fn report(stack: &Stack) -> Report {
    let nodes = stack
        .nodes_in_plan_order()
        .map(|node| NodeReport {
            id: node.id().to_string(),
            kind: node.kind().to_string(),
            status: node.status(),
            handle: node.handle().map(|h| h.to_string()),
            attributes: node
                .outputs()
                .iter()
                .map(|(name, deferred)| AttributeReport {
                    name: name.clone(),
                    value: if deferred.is_sensitive() {
                        MASK.to_string()
                    } else {
                        deferred
                            .read()
                            .map(to_text)
                            .unwrap_or_else(|_| UNRESOLVED.to_string())
                    },
                    sensitive: deferred.is_sensitive(),
                })
                .collect(),
        })
        .collect();

    let outputs = stack
        .outputs()
        .map(|output| OutputReport {
            name: output.name.clone(),
            description: output.description.clone(),
            value: render_output(&output.value),
        })
        .collect();

    Report {
        stack: stack.name().to_string(),
        nodes,
        outputs,
    }
}

fn render_output(value: &ConfigValue) -> String {
    // 機密値に触れる出力は全体をマスク
    if value.touches_sensitive() {
        return MASK.to_string();
    }
    match value.resolve() {
        Ok(v) => to_text(&v),
        Err(_) => UNRESOLVED.to_string(),
    }
}

impl Report {
    pub fn output(&self, name: &str) -> Option<&OutputReport> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn attribute(&self, node: &str, attribute: &str) -> Option<&AttributeReport> {
        self.nodes
            .iter()
            .find(|n| n.id == node)
            .and_then(|n| n.attributes.iter().find(|a| a.name == attribute))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stack: {}", self.stack)?;
        for node in &self.nodes {
            write!(f, "  {} ({}) [{}]", node.id, node.kind, node.status)?;
            if let Some(handle) = &node.handle {
                write!(f, " {}", handle)?;
            }
            writeln!(f)?;
            for attr in &node.attributes {
                writeln!(f, "    {} = {}", attr.name, attr.value)?;
            }
        }
        if !self.outputs.is_empty() {
            writeln!(f, "Outputs:")?;
            for output in &self.outputs {
                writeln!(f, "  {} = {}", output.name, output.value)?;
                if let Some(description) = &output.description {
                    writeln!(f, "    # {}", description)?;
                }
            }
        }
        Ok(())
    }
}
