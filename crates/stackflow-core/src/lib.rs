//! StackFlow Core
//!
//! リソースグラフと遅延値解決のエンジン。
//!
//! - [`Deferred`]: プロビジョニング後に確定する単一代入の値
//! - [`ConfigValue`]: 参照を埋め込める設定値ツリー
//! - [`StackBuilder`] / [`Stack`]: リソース宣言と固定のデプロイ計画
//! - [`DependencyGraph`]: 宣言順タイブレーク付きのトポロジカルソート
//! - [`Template`]: 確定後の値による環境変数などの展開
//! - [`report`]: 機密値をマスクした結果レポート

pub mod catalog;
pub mod deferred;
pub mod error;
pub mod graph;
pub mod node;
pub mod parser;
pub mod report;
pub mod stack;
pub mod template;
pub mod value;

pub use catalog::{KindCatalog, KindSpec, OutputSpec};
pub use deferred::Deferred;
pub use error::{Result, StackError};
pub use graph::DependencyGraph;
pub use node::{Node, NodeStatus, ResourceHandle, Transition};
pub use parser::{parse_stack_file, parse_stack_str, parse_stack_str_with_catalog};
pub use report::{AttributeReport, MASK, NodeReport, OutputReport, Report, report};
pub use stack::{DeploymentPlan, NodeHandle, Stack, StackBuilder, StackOutput};
pub use template::{ResolvedConfiguration, Template, interpolate, secret_indirection};
pub use value::ConfigValue;
