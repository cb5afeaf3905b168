use crate::utils;
use colored::Colorize;
use stackflow_cloud::{Executor, TeardownOutcome};
use stackflow_cloud_local::LocalProvider;
use stackflow_core::NodeStatus;
use std::path::PathBuf;
use std::sync::Arc;

pub async fn handle(file: Option<PathBuf>, yes: bool) -> anyhow::Result<()> {
    println!("{}", "リソースを削除します...".blue().bold());
    let (loaded, lock) = utils::load_stack_for_update(file, yes).await?;
    let mut stack = loaded.stack;
    let state = loaded.state;

    let targets: Vec<String> = stack
        .plan()
        .iter()
        .rev()
        .filter(|id| stack.status_of(id) == Some(NodeStatus::Provisioned))
        .map(str::to_string)
        .collect();
    if targets.is_empty() {
        println!("{}", "削除するリソースはありません".green());
        return Ok(());
    }

    println!();
    println!(
        "{}",
        format!("削除対象 ({} 個, 削除順):", targets.len()).bold()
    );
    for id in &targets {
        println!("  • {}", id.cyan());
    }

    let Some(lock) = lock else {
        println!();
        println!("{}", "警告: 上記のリソースを削除します。".yellow());
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    };
    let executor = Executor::new(Arc::new(LocalProvider::default()));
    let report = executor.teardown(&mut stack).await;

    state.persist(&stack).await?;
    lock.release().await?;
    let report = report?;

    println!();
    for (id, outcome) in &report.outcomes {
        match outcome {
            TeardownOutcome::TornDown => println!("  ✓ {} を削除しました", id.cyan()),
            TeardownOutcome::Failed { error } => println!("  ✗ {} {}", id.red(), error),
            TeardownOutcome::Retained { blocked_by } => {
                println!("  - {} ({} が使用中のため保持)", id, blocked_by.yellow())
            }
        }
    }

    println!();
    if report.is_success() {
        println!(
            "{}",
            format!("✓ {} 個のリソースを削除しました", report.torn_down().len())
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "削除に失敗したリソースがあります: {}",
            report.failed().join(", ")
        ))
    }
}
