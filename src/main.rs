mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统
    if cli.verbose {
        resonance::logger::init_with_default("debug");
    } else {
        resonance::logger::init_logger();
    }

    match cli.command {
        Commands::Run(args) => {
            let passed = cli::run(args, cli.config.as_ref(), cli.verbose).await?;
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::Preview(args) => cli::preview(args, cli.config.as_ref())?,
    }
    Ok(())
}
