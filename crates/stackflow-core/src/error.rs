use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な定義: {0}")]
    InvalidDefinition(String),

    #[error("未定義の依存先: {0}")]
    UnknownDependency(String),

    #[error("リソースが見つかりません: {0}")]
    UnknownNode(String),

    #[error("リソースIDが重複しています: {0}")]
    DuplicateNode(String),

    #[error("未登録のリソース種別: {0}")]
    UnknownKind(String),

    #[error("リソース '{node}' は属性 '{attribute}' を公開していません")]
    UnknownOutput { node: String, attribute: String },

    #[error("循環依存が検出されました: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("値はまだ確定していません: {0}")]
    NotYetResolved(String),

    #[error("値は既に確定しています: {0}")]
    AlreadyResolved(String),

    #[error("未解決の参照: {0}")]
    UnresolvedReference(String),

    #[error("リソース '{node}' のプロビジョニング結果に属性 '{attribute}' が含まれていません")]
    MissingOutput { node: String, attribute: String },

    #[error("リソース '{node}' は状態 {status} のため操作できません")]
    InvalidTransition { node: String, status: String },
}

pub type Result<T> = std::result::Result<T, StackError>;
