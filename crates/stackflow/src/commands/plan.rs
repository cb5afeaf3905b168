use crate::utils;
use colored::Colorize;
use stackflow_cloud::PlanSummary;
use std::path::PathBuf;

pub async fn handle(file: Option<PathBuf>) -> anyhow::Result<()> {
    let loaded = utils::load_stack_with_state(file).await?;
    let stack = &loaded.stack;

    println!("スタック: {}", stack.name().cyan());
    println!();
    utils::print_plan(stack);

    let summary = PlanSummary::of(stack);
    println!();
    if summary.has_changes() {
        println!("{}", summary.to_string().yellow());
    } else {
        println!("{}", "✓ 変更はありません".green());
    }

    Ok(())
}
