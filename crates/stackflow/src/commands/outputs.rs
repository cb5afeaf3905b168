use crate::utils;
use colored::Colorize;
use std::path::PathBuf;

pub async fn handle(file: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let loaded = utils::load_stack_with_state(file).await?;
    let report = stackflow_core::report(&loaded.stack);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("スタック: {}", report.stack.cyan());
    println!();
    for node in &report.nodes {
        println!(
            "{} ({}) [{}]",
            node.id.cyan(),
            node.kind,
            utils::status_label(node.status)
        );
        for attr in &node.attributes {
            println!("    {} = {}", attr.name, attr.value);
        }
    }
    println!();
    utils::print_outputs(&report);

    Ok(())
}
