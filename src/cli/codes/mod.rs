//! Codes command - generates redemption codes

use std::sync::Arc;

use clap::Args;
use tracing::info;

use crate::infrastructure::redemption::{CodeOptions, RedemptionService, MAX_BATCH_SIZE};
use crate::infrastructure::storage::InMemoryStore;

/// Arguments for the codes command
#[derive(Args, Clone, Debug)]
pub struct CodesArgs {
    /// Number of codes to generate
    #[arg(long, default_value_t = 1)]
    pub count: usize,

    /// Days until the first-use deadline
    #[arg(long)]
    pub expires_days: Option<u32>,

    /// Attach a warranty of this many days
    #[arg(long)]
    pub warranty_days: Option<u32>,
}

impl CodesArgs {
    fn options(&self) -> CodeOptions {
        CodeOptions {
            expires_days: self.expires_days,
            has_warranty: self.warranty_days.is_some(),
            warranty_days: self.warranty_days,
        }
    }
}

/// Generate codes and print them as JSON
pub async fn run(args: CodesArgs) -> anyhow::Result<()> {
    if args.count == 0 || args.count > MAX_BATCH_SIZE {
        anyhow::bail!("--count must be between 1 and {}", MAX_BATCH_SIZE);
    }

    let service = RedemptionService::new(Arc::new(InMemoryStore::new()));
    let codes = service.generate_batch(args.count, &args.options()).await?;

    info!(count = codes.len(), "Codes generated");
    println!("{}", serde_json::to_string_pretty(&codes)?);

    Ok(())
}
