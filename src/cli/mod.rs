//! CLI module for the team pool manager
//!
//! Provides operator subcommands:
//! - `codes`: generate a batch of redemption codes
//! - `inspect-token`: show the claims of a bearer token
//! - `sync`: import teams from a credential file and sync them

pub mod codes;
pub mod inspect;
pub mod sync;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// Team pool manager - upstream team seats, credential refresh and redemption codes
#[derive(Parser)]
#[command(name = "team-pool-manager")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a batch of redemption codes and print them as JSON
    Codes(codes::CodesArgs),

    /// Print the expiry and email claims of a bearer token
    InspectToken(inspect::InspectArgs),

    /// Import teams from a JSON credential file, then sync every team
    Sync(sync::SyncArgs),
}

/// Load configuration and install logging, shared by all commands
pub fn bootstrap() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging);

    Ok(config)
}
