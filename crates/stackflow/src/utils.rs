use colored::{ColoredString, Colorize};
use stackflow_cloud::{StateLock, StateManager};
use stackflow_core::{NodeStatus, Report, Stack};
use std::path::PathBuf;

/// 読み込んだスタックと状態ファイルの置き場所
pub struct LoadedStack {
    pub stack: Stack,
    pub state: StateManager,
}

/// スタック定義ファイルを決定する（-f 指定がなければ自動検出）
pub fn resolve_stack_file(file: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match file {
        Some(path) => Ok(path),
        None => Ok(stackflow_config::find_stack_file()?),
    }
}

/// スタック定義を読み込む
pub fn load_stack(file: Option<PathBuf>) -> anyhow::Result<LoadedStack> {
    let path = resolve_stack_file(file)?;
    // 標準出力は JSON 出力にも使うため stderr へ
    eprintln!("📄 スタック定義: {}", path.display().to_string().cyan());

    let stack = stackflow_core::parse_stack_file(&path)?;
    let root = stackflow_config::project_root(&path);
    Ok(LoadedStack {
        stack,
        state: StateManager::new(root),
    })
}

/// 記録済みの状態を反映してスタックを読み込む
pub async fn load_stack_with_state(file: Option<PathBuf>) -> anyhow::Result<LoadedStack> {
    let mut loaded = load_stack(file)?;
    restore_state(&mut loaded).await?;
    Ok(loaded)
}

/// 状態を変更するコマンド用。`lock` が真なら復元の前にロックを取得する
pub async fn load_stack_for_update(
    file: Option<PathBuf>,
    lock: bool,
) -> anyhow::Result<(LoadedStack, Option<StateLock>)> {
    let mut loaded = load_stack(file)?;
    let guard = if lock {
        Some(loaded.state.acquire_lock().await?)
    } else {
        None
    };
    restore_state(&mut loaded).await?;
    Ok((loaded, guard))
}

async fn restore_state(loaded: &mut LoadedStack) -> anyhow::Result<()> {
    let restored = loaded.state.restore(&mut loaded.stack).await?;
    tracing::debug!(restored, "Restored recorded state");
    Ok(())
}

pub fn status_label(status: NodeStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        NodeStatus::Pending => label.normal(),
        NodeStatus::Provisioning => label.yellow(),
        NodeStatus::Provisioned => label.green(),
        NodeStatus::Failed => label.red(),
        NodeStatus::TornDown => label.dimmed(),
    }
}

/// デプロイ計画を表示
pub fn print_plan(stack: &Stack) {
    println!(
        "{}",
        format!("デプロイ計画 ({} リソース):", stack.plan().len()).bold()
    );
    for (i, node) in stack.nodes_in_plan_order().enumerate() {
        let deps = stack.graph().dependencies_of(node.id());
        let deps = if deps.is_empty() {
            String::new()
        } else {
            format!(" ← {}", deps.join(", "))
        };
        println!(
            "  {:>2}. {} ({}) [{}]{}",
            i + 1,
            node.id().cyan(),
            node.kind(),
            status_label(node.status()),
            deps.dimmed()
        );
    }
}

/// スタック出力を表示
pub fn print_outputs(report: &Report) {
    if report.outputs.is_empty() {
        return;
    }
    println!("{}", "出力:".bold());
    for output in &report.outputs {
        match &output.description {
            Some(description) => println!(
                "  {} = {}  {}",
                output.name.cyan(),
                output.value,
                format!("# {}", description).dimmed()
            ),
            None => println!("  {} = {}", output.name.cyan(), output.value),
        }
    }
}
