mod commands;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stack")]
#[command(about = "宣言する。つながる。クラウドの構成は、KDLで。", long_about = None)]
struct Cli {
    /// スタック定義ファイル (省略時は自動検出)
    #[arg(short = 'f', long = "file", env = "STACKFLOW_STACK_PATH", global = true)]
    file: Option<PathBuf>,

    /// デバッグログを表示
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// スタック定義を検証
    Validate,
    /// デプロイ計画を表示
    Plan,
    /// スタックをプロビジョニング
    Up {
        /// 同時にプロビジョニングするリソースの上限
        #[arg(short, long, default_value_t = 1)]
        concurrency: usize,
        /// プロビジョニング先のリージョン
        #[arg(short, long, env = "STACKFLOW_REGION", default_value = stackflow_cloud_local::DEFAULT_REGION)]
        region: String,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// スタックのリソースを削除
    Down {
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// スタックの出力を表示
    Outputs {
        /// JSON形式で出力
        #[arg(long)]
        json: bool,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if cli.verbose { "debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Versionコマンドは定義ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("stackflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let file = cli.file;
    match cli.command {
        Commands::Validate => commands::validate::handle(file).await?,
        Commands::Plan => commands::plan::handle(file).await?,
        Commands::Up {
            concurrency,
            region,
            yes,
        } => commands::up::handle(file, concurrency, region, yes).await?,
        Commands::Down { yes } => commands::down::handle(file, yes).await?,
        Commands::Outputs { json } => commands::outputs::handle(file, json).await?,
        Commands::Version => {
            unreachable!("Version is handled before loading the stack");
        }
    }

    Ok(())
}
