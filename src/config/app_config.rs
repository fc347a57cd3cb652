use serde::Deserialize;
use std::time::Duration;

use crate::domain::team::{DEFAULT_ERROR_THRESHOLD, DEFAULT_MAX_MEMBERS};
use crate::domain::DomainError;
use crate::infrastructure::upstream::{
    validate_proxy_url, RetryPolicy, DEFAULT_BASE_URL, DEFAULT_OAUTH_TOKEN_URL,
    DEFAULT_SESSION_REFRESH_URL,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub upstream: UpstreamConfig,
    pub vault: VaultConfig,
    pub warranty: WarrantyConfig,
    pub teams: TeamsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Upstream provider endpoints, transport and retry settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub session_refresh_url: String,
    pub oauth_token_url: String,
    /// http(s):// or socks5(h):// URL; empty for a direct connection
    pub proxy: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delays_ms: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VaultConfig {
    /// Secret the credentials-at-rest key is derived from
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarrantyConfig {
    pub query_interval_secs: u64,
    pub limiter_capacity: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TeamsConfig {
    pub default_max_members: u32,
    pub error_threshold: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_refresh_url: DEFAULT_SESSION_REFRESH_URL.to_string(),
            oauth_token_url: DEFAULT_OAUTH_TOKEN_URL.to_string(),
            proxy: String::new(),
            timeout_secs: 30,
            max_attempts: 3,
            retry_delays_ms: vec![1000, 2000, 4000],
        }
    }
}

impl Default for WarrantyConfig {
    fn default() -> Self {
        Self {
            query_interval_secs: 30,
            limiter_capacity: 10_000,
        }
    }
}

impl Default for TeamsConfig {
    fn default() -> Self {
        Self {
            default_max_members: DEFAULT_MAX_MEMBERS,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }
}

impl UpstreamConfig {
    /// Validated proxy URL, None for a direct connection
    pub fn proxy_url(&self) -> Result<Option<String>, DomainError> {
        validate_proxy_url(&self.proxy)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            self.retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        )
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("upstream.retry_delays_ms")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject settings the services cannot start with
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.vault.secret_key.trim().is_empty() {
            return Err(DomainError::configuration(
                "vault.secret_key must be set (APP__VAULT__SECRET_KEY)",
            ));
        }

        if self.upstream.max_attempts == 0 {
            return Err(DomainError::configuration("upstream.max_attempts must be at least 1"));
        }

        if self.teams.default_max_members == 0 || self.teams.error_threshold == 0 {
            return Err(DomainError::configuration(
                "teams.default_max_members and teams.error_threshold must be positive",
            ));
        }

        self.upstream.proxy_url()?;
        Ok(())
    }
}
