use crate::utils;
use colored::Colorize;
use stackflow_cloud::{CancelHandle, Executor, NodeOutcome, PlanSummary, Provisioner, RunStatus};
use stackflow_cloud_local::LocalProvider;
use std::path::PathBuf;
use std::sync::Arc;

pub async fn handle(
    file: Option<PathBuf>,
    concurrency: usize,
    region: String,
    yes: bool,
) -> anyhow::Result<()> {
    println!("{}", "プロビジョニングを開始します...".blue().bold());
    // 実行する場合は状態の読み込み前にロックを取る
    let (loaded, lock) = utils::load_stack_for_update(file, yes).await?;
    let mut stack = loaded.stack;
    let state = loaded.state;

    println!("スタック: {}", stack.name().cyan());
    println!();
    utils::print_plan(&stack);

    let summary = PlanSummary::of(&stack);
    println!();
    println!("{}", summary.to_string().bold());
    if !summary.has_changes() {
        println!("{}", "✓ 全てのリソースはプロビジョニング済みです".green());
        return Ok(());
    }

    // 確認（--yesが指定されていない場合）
    let Some(lock) = lock else {
        println!();
        println!(
            "{}",
            "警告: 上記のリソースを作成します。失敗してもロールバックは行いません。".yellow()
        );
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    };

    let provider = Arc::new(LocalProvider::new(region));
    let auth = provider.check_auth().await;
    if !auth.authenticated {
        anyhow::bail!(
            "プロバイダー '{}' の認証に失敗しました: {}",
            provider.name(),
            auth.error.unwrap_or_default()
        );
    }
    println!(
        "プロバイダー: {} ({})",
        provider.name().cyan(),
        auth.account_info.unwrap_or_default()
    );

    // Ctrl-C で新しいリソースの開始を止める
    let cancel = CancelHandle::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!();
                eprintln!(
                    "{}",
                    "中断します。実行中のリソースの完了を待っています...".yellow()
                );
                cancel.cancel();
            }
        })
    };

    let executor = Executor::new(provider)
        .with_concurrency(concurrency)
        .with_cancel_handle(cancel);
    let result = executor.run(&mut stack).await;
    watcher.abort();

    // 失敗しても確定した分は記録する
    state.persist(&stack).await?;
    lock.release().await?;
    let result = result?;

    println!();
    for (id, outcome) in &result.outcomes {
        match outcome {
            NodeOutcome::Provisioned { handle } => {
                println!("  ✓ {} ({})", id.cyan(), handle.dimmed());
            }
            NodeOutcome::AlreadyProvisioned => {
                println!("  - {} (プロビジョニング済み)", id);
            }
            NodeOutcome::Failed {
                error,
                attempted_config,
            } => {
                println!("  ✗ {} {}", id.red(), error);
                println!("      設定: {}", attempted_config.to_string().dimmed());
            }
            NodeOutcome::Unattempted => {
                println!("  … {} (未実行)", id.dimmed());
            }
        }
    }

    println!();
    match result.status {
        RunStatus::Succeeded => {
            println!(
                "{}",
                format!(
                    "✓ プロビジョニングが完了しました ({} 件, {}ms)",
                    result.provision_calls, result.duration_ms
                )
                .green()
                .bold()
            );
            utils::print_outputs(&stackflow_core::report(&stack));
            Ok(())
        }
        RunStatus::Failed => Err(anyhow::anyhow!(
            "プロビジョニングに失敗しました: {}",
            result.failed().join(", ")
        )),
        RunStatus::Cancelled => Err(anyhow::anyhow!(
            "プロビジョニングを中断しました (未実行: {})",
            result.unattempted().join(", ")
        )),
    }
}
