use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Credential error: {message}")]
    Credential { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    /// Upstream reported the account as deactivated or the token as invalidated
    #[error("Account banned: {message}")]
    AccountBanned { message: String },

    /// No usable access token could be obtained for the team
    #[error("Access token unavailable: {message}")]
    TokenUnavailable { message: String },

    #[error("Upstream error ({status}): {message}")]
    Upstream {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Rate limited: retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn account_banned(message: impl Into<String>) -> Self {
        Self::AccountBanned {
            message: message.into(),
        }
    }

    pub fn token_unavailable(message: impl Into<String>) -> Self {
        Self::TokenUnavailable {
            message: message.into(),
        }
    }

    pub fn upstream(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    /// Whether an operator has to re-import credentials before the team is usable again
    pub fn requires_intervention(&self) -> bool {
        matches!(self, Self::AccountBanned { .. } | Self::TokenUnavailable { .. })
    }
}
