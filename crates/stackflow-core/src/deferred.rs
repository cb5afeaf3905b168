//! 遅延値 (Deferred Value)
//!
//! プロビジョニングが完了するまで確定しない属性値のプレースホルダー。
//! 値は一度だけ確定でき、同じハンドルを共有する全ての保持者から観測できます。

use crate::error::{Result, StackError};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// 単一代入のプレースホルダー
///
/// クローンは同じセルを共有します。確定 (`resolve`) は生成元のノードだけが
/// 行えるよう crate 内に閉じています。
#[derive(Clone)]
pub struct Deferred {
    inner: Arc<Inner>,
}

struct Inner {
    producer: String,
    attribute: String,
    sensitive: bool,
    cell: OnceLock<Value>,
}

impl Deferred {
    /// 未確定のハンドルを作成
    pub fn new(producer: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::with_sensitivity(producer, attribute, false)
    }

    pub fn with_sensitivity(
        producer: impl Into<String>,
        attribute: impl Into<String>,
        sensitive: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                producer: producer.into(),
                attribute: attribute.into(),
                sensitive,
                cell: OnceLock::new(),
            }),
        }
    }

    pub fn producer(&self) -> &str {
        &self.inner.producer
    }

    pub fn attribute(&self) -> &str {
        &self.inner.attribute
    }

    pub fn is_sensitive(&self) -> bool {
        self.inner.sensitive
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.cell.get().is_some()
    }

    /// `node.attribute` 形式の参照名
    pub fn reference(&self) -> String {
        format!("{}.{}", self.inner.producer, self.inner.attribute)
    }

    /// 確定済みの値を取得
    pub fn read(&self) -> Result<&Value> {
        self.inner
            .cell
            .get()
            .ok_or_else(|| StackError::NotYetResolved(self.reference()))
    }

    /// 値を確定する。二度目の呼び出しはエラー
    pub(crate) fn resolve(&self, value: Value) -> Result<()> {
        self.inner
            .cell
            .set(value)
            .map_err(|_| StackError::AlreadyResolved(self.reference()))
    }

    /// 同じセルを指しているか
    pub fn same_cell(&self, other: &Deferred) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.cell.get() {
            None => "unresolved".to_string(),
            Some(_) if self.inner.sensitive => "resolved(<sensitive>)".to_string(),
            Some(v) => format!("resolved({})", v),
        };
        write!(f, "Deferred({} {})", self.reference(), state)
    }
}

impl fmt::Display for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}}}", self.reference())
    }
}
