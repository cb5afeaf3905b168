pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// スタック定義ファイルのパスを直接指定する環境変数
pub const STACK_PATH_ENV: &str = "STACKFLOW_STACK_PATH";

/// プロジェクト内の作業ディレクトリ名
pub const PROJECT_DIR: &str = ".stackflow";

const CANDIDATES: [&str; 4] = [
    "stack.local.kdl",
    ".stack.local.kdl",
    "stack.kdl",
    ".stack.kdl",
];

/// StackFlowのグローバル設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stackflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// プロジェクトのstack.kdlファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 STACKFLOW_STACK_PATH (直接パス指定)
/// 2. カレントディレクトリ: stack.local.kdl, .stack.local.kdl, stack.kdl, .stack.kdl
/// 3. ./.stackflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/stackflow/stack.kdl (グローバル設定)
pub fn find_stack_file() -> Result<PathBuf> {
    if let Ok(stack_path) = std::env::var(STACK_PATH_ENV) {
        let path = PathBuf::from(stack_path);
        if !path.exists() {
            return Err(ConfigError::EnvPathNotFound(path));
        }
        return Ok(path);
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = find_in(&current_dir) {
        return Ok(path);
    }

    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir()
        && let Some(path) = find_in(&project_dir)
    {
        return Ok(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("stackflow").join("stack.kdl");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::StackFileNotFound)
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// スタック定義ファイルに対応するプロジェクトルート
///
/// `.stackflow/` 内の定義ならその親ディレクトリ。状態ファイルはここに置かれます。
pub fn project_root(stack_file: &Path) -> PathBuf {
    let dir = stack_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    match (dir.file_name(), dir.parent()) {
        (Some(name), Some(parent)) if name == PROJECT_DIR => parent.to_path_buf(),
        _ => dir,
    }
}
