//! Inspect command - prints bearer token claims

use chrono::Utc;
use clap::Args;
use serde_json::json;

use crate::infrastructure::auth::decode_claims;

/// Arguments for the inspect-token command
#[derive(Args, Clone, Debug)]
pub struct InspectArgs {
    /// Bearer token to inspect
    pub token: String,
}

/// Decode the token without verifying it and print its claims
pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let claims = decode_claims(args.token.trim())?;

    let output = json!({
        "email": claims.email,
        "expires_at": claims.expires_at,
        "expired": claims.is_expired(Utc::now()),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
