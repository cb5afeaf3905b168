use crate::utils;
use colored::Colorize;
use std::path::PathBuf;

pub async fn handle(file: Option<PathBuf>) -> anyhow::Result<()> {
    println!("{}", "スタック定義を検証中...".blue());

    match utils::load_stack(file) {
        Ok(loaded) => {
            let stack = &loaded.stack;
            println!("{}", "✓ スタック定義は正常です！".green().bold());
            println!();
            println!("サマリー:");
            println!("  スタック: {}", stack.name().cyan());
            println!("  リソース: {}個", stack.plan().len());
            for node in stack.nodes_in_plan_order() {
                println!(
                    "    - {} ({}, 出力 {}個)",
                    node.id().cyan(),
                    node.kind(),
                    node.outputs().len()
                );
            }
            let outputs = stack.outputs().count();
            if outputs > 0 {
                println!("  出力: {}個", outputs);
            }
        }
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 定義エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
