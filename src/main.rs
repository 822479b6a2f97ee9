mod commands;
mod fetch;
mod scheduler_file;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "calsched")]
#[command(about = "Reconciles an ICS calendar feed with a playlist/command scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the action list without touching anything.
    Plan,
    /// Execute the reconciled action list.
    Apply,
    /// Import unmanaged scheduler rows as unmanaged intents.
    Adopt,
    /// Emit an ICS document of unmanaged scheduler rows.
    Export,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan => commands::plan::run().await,
        Commands::Apply => commands::apply::run().await,
        Commands::Adopt => commands::adopt::run().await,
        Commands::Export => commands::export::run().await,
    }
}
