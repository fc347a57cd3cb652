//! Team Pool Manager
//!
//! Keeps a pool of upstream team subscriptions usable and hands out seats on
//! them through redemption codes:
//! - Credential refresh with session and refresh-token grants
//! - Retrying upstream client with failure classification
//! - Team lifecycle tracking (active/full/expired/error/banned)
//! - Redemption codes with warranty-backed reuse

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use infrastructure::{
    redemption::{RedeemService, RedemptionService},
    storage::InMemoryStore,
    team::{TeamService, TeamSettings},
    upstream::{ExternalApiClient, ProviderApi, ProviderEndpoints, ReqwestTransport, TransportSettings},
    vault::AesGcmVault,
    warranty::{QueryRateLimiter, WarrantyService},
};
use tracing::info;

/// Explicitly wired services sharing one store, vault and upstream client
#[derive(Debug, Clone)]
pub struct ServiceContainer {
    pub teams: TeamService,
    pub codes: RedemptionService,
    pub warranty: WarrantyService,
    pub redeem: RedeemService,
}

impl ServiceContainer {
    /// Build every service from configuration
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let transport = ReqwestTransport::new(TransportSettings {
            proxy: config.upstream.proxy_url()?,
            timeout: config.upstream.timeout(),
        });
        let client = ExternalApiClient::new(Arc::new(transport), config.upstream.retry_policy());
        let upstream = Arc::new(ProviderApi::new(
            client,
            ProviderEndpoints {
                base_url: config.upstream.base_url.clone(),
                session_refresh_url: config.upstream.session_refresh_url.clone(),
                oauth_token_url: config.upstream.oauth_token_url.clone(),
            },
        ));

        let vault = Arc::new(AesGcmVault::from_secret(&config.vault.secret_key)?);
        let store = Arc::new(InMemoryStore::new());

        let teams = TeamService::new(
            store.clone(),
            upstream,
            vault,
            TeamSettings {
                default_max_members: config.teams.default_max_members,
                error_threshold: config.teams.error_threshold,
            },
        );
        let codes = RedemptionService::new(store.clone());
        let limiter = Arc::new(QueryRateLimiter::new(
            Duration::from_secs(config.warranty.query_interval_secs),
            config.warranty.limiter_capacity,
        ));
        let warranty = WarrantyService::new(store, teams.clone(), limiter);
        let redeem = RedeemService::new(codes.clone(), teams.clone(), warranty.clone());

        info!(
            base_url = %config.upstream.base_url,
            proxy = !config.upstream.proxy.is_empty(),
            "Services initialized"
        );

        Ok(Self {
            teams,
            codes,
            warranty,
            redeem,
        })
    }
}
