use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "hifz", about = "Points ledger and exam scoring for hifz circles")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Manage a tenant's point rules
    Rules(commands::rules::RulesArgs),
    /// Inspect and correct student ledgers
    Ledger(commands::ledger::LedgerArgs),
    /// Rebuild student totals from their transactions
    Recompute(commands::recompute::RecomputeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Config(args) => commands::config::run(args),
        Commands::Rules(args) => commands::rules::run(args).await,
        Commands::Ledger(args) => commands::ledger::run(args).await,
        Commands::Recompute(args) => commands::recompute::run(args).await,
    }
}
