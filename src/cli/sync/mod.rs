//! Sync command - imports teams from a credential file and syncs the pool

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::infrastructure::team::{ImportTeamRequest, SyncOutcome};
use crate::ServiceContainer;

/// Arguments for the sync command
#[derive(Args, Clone, Debug)]
pub struct SyncArgs {
    /// JSON array of team credentials to import
    #[arg(long)]
    pub file: PathBuf,
}

#[derive(Debug, Serialize)]
struct SyncSummary {
    imported: usize,
    import_errors: Vec<String>,
    teams: Vec<SyncOutcome>,
    available_seats: u32,
}

/// Import every entry of the file, sync all teams and print per-team outcomes
pub async fn run(args: SyncArgs, config: &AppConfig) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(&args.file).await?;
    let requests = parse_requests(&raw)?;

    let container = ServiceContainer::from_config(config)?;
    let mut imported = 0;
    let mut import_errors = Vec::new();

    for (index, request) in requests.into_iter().enumerate() {
        match container.teams.import_team(request).await {
            Ok(report) => imported += report.imported.len(),
            Err(e) => {
                warn!(entry = index, error = %e, "Import failed");
                import_errors.push(format!("entry {}: {}", index, e));
            }
        }
    }

    let teams = container.teams.sync_all_teams().await?;
    let available_seats = container.teams.total_available_seats().await?;
    info!(imported, teams = teams.len(), available_seats, "Sync finished");

    let summary = SyncSummary {
        imported,
        import_errors,
        teams,
        available_seats,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn parse_requests(raw: &str) -> anyhow::Result<Vec<ImportTeamRequest>> {
    let requests: Vec<ImportTeamRequest> = serde_json::from_str(raw)?;

    if requests.is_empty() {
        anyhow::bail!("Credential file contains no teams");
    }

    Ok(requests)
}
