//! Keeps a team's bearer token usable

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::credentials::{CredentialVault, EncryptedSecret};
use crate::domain::team::Team;
use crate::domain::upstream::{classify, ApiFailure, FailureKind, RefreshedTokens, UpstreamApi};
use crate::domain::DomainError;
use crate::infrastructure::auth::is_token_expired;

/// Result of making sure a team holds a usable access token.
///
/// Every variant other than `Cached` changed the team and must be persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenOutcome {
    /// Stored token is still valid; nothing was changed
    Cached(String),
    /// A refresh succeeded and the new token was stored on the team
    Refreshed(String),
    /// The provider reported the account banned; the team is now banned
    Banned(String),
    /// No token could be obtained; the failure was counted on the team
    Unavailable {
        reason: String,
        /// Last failed refresh call, `None` when no upstream attempt failed
        last_failure: Option<ApiFailure>,
    },
}

#[derive(Debug, Clone, Copy)]
enum RefreshPath {
    SessionToken,
    RefreshToken,
}

impl std::fmt::Display for RefreshPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionToken => write!(f, "session_token"),
            Self::RefreshToken => write!(f, "refresh_token"),
        }
    }
}

/// Token refresh state machine for a single team
#[derive(Debug, Clone)]
pub struct TokenRefresher {
    upstream: Arc<dyn UpstreamApi>,
    vault: Arc<dyn CredentialVault>,
    error_threshold: u32,
}

impl TokenRefresher {
    pub fn new(
        upstream: Arc<dyn UpstreamApi>,
        vault: Arc<dyn CredentialVault>,
        error_threshold: u32,
    ) -> Self {
        Self {
            upstream,
            vault,
            error_threshold,
        }
    }

    /// Return a valid token, refreshing it when the stored one has expired.
    ///
    /// Token fields on the team are only replaced on a successful refresh.
    pub async fn ensure_access_token(&self, team: &mut Team, now: DateTime<Utc>) -> TokenOutcome {
        match self.vault.decrypt(&team.credentials().access_token) {
            Ok(token) if !is_token_expired(&token, now) => return TokenOutcome::Cached(token),
            Ok(_) => info!(team_id = %team.id(), "Access token expired, refreshing"),
            Err(e) => warn!(team_id = %team.id(), error = %e, "Stored access token unreadable, refreshing"),
        }

        let mut last_failure = None;

        if let Some(session_token) = self.decrypt_optional(team, &team.credentials().session_token) {
            let result = self.upstream.refresh_with_session_token(&session_token).await;

            match self.apply_refresh(team, RefreshPath::SessionToken, result, now) {
                Ok(outcome) => return outcome,
                Err(failure) => last_failure = Some(failure),
            }
        }

        let refresh_token = self.decrypt_optional(team, &team.credentials().refresh_token);
        let client_id = self.decrypt_optional(team, &team.credentials().client_id);

        if let (Some(refresh_token), Some(client_id)) = (refresh_token, client_id) {
            let result = self
                .upstream
                .refresh_with_refresh_token(&refresh_token, &client_id)
                .await;

            match self.apply_refresh(team, RefreshPath::RefreshToken, result, now) {
                Ok(outcome) => return outcome,
                Err(failure) => last_failure = Some(failure),
            }
        }

        self.count_failure(team, "Access token expired and could not be refreshed", last_failure)
    }

    fn decrypt_optional(&self, team: &Team, secret: &Option<EncryptedSecret>) -> Option<String> {
        let secret = secret.as_ref()?;

        match self.vault.decrypt(secret) {
            Ok(value) if !value.is_empty() => Some(value),
            Ok(_) => None,
            Err(e) => {
                warn!(team_id = %team.id(), error = %e, "Stored refresh credential unreadable");
                None
            }
        }
    }

    /// Apply one refresh attempt; `Err` carries the failure and falls through to the next path
    fn apply_refresh(
        &self,
        team: &mut Team,
        path: RefreshPath,
        result: Result<RefreshedTokens, ApiFailure>,
        now: DateTime<Utc>,
    ) -> Result<TokenOutcome, ApiFailure> {
        let failure = match result {
            Ok(tokens) if is_token_expired(&tokens.access_token, now) => {
                ApiFailure::new(200, "Refreshed access token is already expired")
            }
            Ok(tokens) => return Ok(self.store_tokens(team, path, tokens)),
            Err(failure) => failure,
        };

        match classify(&failure) {
            FailureKind::AccountBanned => {
                warn!(team_id = %team.id(), %path, code = ?failure.code, "Account banned during token refresh");
                team.mark_banned();
                Ok(TokenOutcome::Banned(failure.message))
            }
            FailureKind::GrantInvalid => {
                warn!(team_id = %team.id(), %path, "Refresh grant rejected");
                let reason = format!("Refresh grant rejected: {}", failure.message);
                Ok(self.count_failure(team, &reason, Some(failure)))
            }
            kind => {
                warn!(team_id = %team.id(), %path, %kind, error = %failure, "Token refresh failed");
                Err(failure)
            }
        }
    }

    fn store_tokens(&self, team: &mut Team, path: RefreshPath, tokens: RefreshedTokens) -> TokenOutcome {
        let encrypted = match self.encrypt_tokens(&tokens) {
            Ok(encrypted) => encrypted,
            Err(e) => return self.count_failure(team, &e.to_string(), None),
        };

        let (access_token, refresh_token) = encrypted;
        team.replace_access_token(access_token);
        if let Some(refresh_token) = refresh_token {
            team.replace_refresh_token(refresh_token);
        }
        team.record_success();

        info!(team_id = %team.id(), %path, "Access token refreshed");
        TokenOutcome::Refreshed(tokens.access_token)
    }

    fn encrypt_tokens(
        &self,
        tokens: &RefreshedTokens,
    ) -> Result<(EncryptedSecret, Option<EncryptedSecret>), DomainError> {
        let access_token = self.vault.encrypt(&tokens.access_token)?;
        let refresh_token = match &tokens.refresh_token {
            Some(token) => Some(self.vault.encrypt(token)?),
            None => None,
        };

        Ok((access_token, refresh_token))
    }

    fn count_failure(
        &self,
        team: &mut Team,
        reason: &str,
        last_failure: Option<ApiFailure>,
    ) -> TokenOutcome {
        if team.record_failure(self.error_threshold) {
            warn!(
                team_id = %team.id(),
                error_count = team.error_count(),
                "Team moved to error after consecutive token failures"
            );
        } else {
            warn!(team_id = %team.id(), error_count = team.error_count(), reason, "Token unavailable");
        }

        TokenOutcome::Unavailable {
            reason: reason.to_string(),
            last_failure,
        }
    }
}
