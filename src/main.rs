use clap::Parser;
use team_pool_manager::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli::bootstrap()?;

    match cli.command {
        Command::Codes(args) => cli::codes::run(args).await,
        Command::InspectToken(args) => cli::inspect::run(args),
        Command::Sync(args) => cli::sync::run(args, &config).await,
    }
}
