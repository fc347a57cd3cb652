//! Team service for pool management and lifecycle transitions

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::token_refresher::{TokenOutcome, TokenRefresher};
use crate::domain::credentials::{encrypt_optional, CredentialVault};
use crate::domain::redemption::validate_email;
use crate::domain::team::{
    Team, TeamCredentials, TeamDraft, TeamId, TeamQuery, TeamRepository,
    TeamStatus, DEFAULT_ERROR_THRESHOLD, DEFAULT_MAX_MEMBERS,
};
use crate::domain::upstream::{
    classify, ApiFailure, FailureKind, TeamAccountInfo, UpstreamApi, TEAM_PLAN_TYPE,
};
use crate::domain::DomainError;
use crate::infrastructure::auth::{is_token_expired, token_email};

/// Tunables for team lifecycle handling
#[derive(Debug, Clone, Copy)]
pub struct TeamSettings {
    pub default_max_members: u32,
    pub error_threshold: u32,
}

impl Default for TeamSettings {
    fn default() -> Self {
        Self {
            default_max_members: DEFAULT_MAX_MEMBERS,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }
}

/// Credentials and identity for importing teams
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ImportTeamRequest {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    /// Owner email; read from the token when absent
    #[serde(default)]
    pub email: Option<String>,
    /// Import only this tenant instead of discovering them
    #[serde(default)]
    pub account_id: Option<String>,
}

/// Outcome of an import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub imported: Vec<TeamId>,
    /// Tenants already present in the pool
    pub skipped: Vec<String>,
}

/// Administrative changes to a team
#[derive(Debug, Clone, Default)]
pub struct UpdateTeamRequest {
    pub email: Option<String>,
    pub account_id: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub session_token: Option<String>,
    pub client_id: Option<String>,
    pub max_members: Option<u32>,
    /// Manual override; the only way out of banned
    pub status: Option<TeamStatus>,
}

/// Result of a successful sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub team_id: TeamId,
    pub status: TeamStatus,
    pub current_members: u32,
}

/// Per-team outcome of a pool-wide sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub team_id: TeamId,
    pub email: String,
    pub status: TeamStatus,
    pub error: Option<String>,
}

/// Whether a seat is taken or only invited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberState {
    Joined,
    Invited,
}

/// Joined members and pending invites in one view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamMemberView {
    pub email: String,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub state: MemberState,
    pub created_time: Option<String>,
}

/// Team with free seats, without credentials
#[derive(Debug, Clone, Serialize)]
pub struct AvailableTeam {
    pub id: TeamId,
    pub team_name: Option<String>,
    pub current_members: u32,
    pub max_members: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub subscription_plan: Option<String>,
}

/// Which upstream failures of an operation count towards the error threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Counting {
    AllFailures,
    TransientOnly,
}

/// Team service: pool administration and the team lifecycle state machine
#[derive(Debug, Clone)]
pub struct TeamService {
    repository: Arc<dyn TeamRepository>,
    upstream: Arc<dyn UpstreamApi>,
    vault: Arc<dyn CredentialVault>,
    refresher: TokenRefresher,
    settings: TeamSettings,
}

impl TeamService {
    pub fn new(
        repository: Arc<dyn TeamRepository>,
        upstream: Arc<dyn UpstreamApi>,
        vault: Arc<dyn CredentialVault>,
        settings: TeamSettings,
    ) -> Self {
        let refresher = TokenRefresher::new(upstream.clone(), vault.clone(), settings.error_threshold);

        Self {
            repository,
            upstream,
            vault,
            refresher,
            settings,
        }
    }

    async fn load(&self, id: TeamId) -> Result<Team, DomainError> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Team {} not found", id)))
    }

    /// Get a team by ID
    pub async fn get(&self, id: TeamId) -> Result<Option<Team>, DomainError> {
        self.repository.get(id).await
    }

    /// List teams
    pub async fn list(&self, query: Option<TeamQuery>) -> Result<Vec<Team>, DomainError> {
        self.repository.list(&query.unwrap_or_default()).await
    }

    // Token handling

    /// Make sure the team holds a usable token, persisting any change
    pub async fn ensure_access_token(&self, team: &mut Team) -> Result<String, DomainError> {
        match self.refresher.ensure_access_token(team, Utc::now()).await {
            TokenOutcome::Cached(token) => Ok(token),
            TokenOutcome::Refreshed(token) => {
                self.repository.update(team).await?;
                Ok(token)
            }
            TokenOutcome::Banned(reason) => {
                self.repository.update(team).await?;
                Err(DomainError::account_banned(format!(
                    "{} is banned or its token was invalidated: {}",
                    team.label(),
                    reason
                )))
            }
            TokenOutcome::Unavailable { reason, last_failure } => {
                self.repository.update(team).await?;
                let message = format!("{} (error count {})", reason, team.error_count());

                // Only a rejected grant or missing refresh path needs new credentials
                match last_failure {
                    Some(failure) if classify(&failure) != FailureKind::GrantInvalid => {
                        Err(DomainError::upstream(
                            failure.status,
                            failure.code,
                            format!("{}: {}", message, failure.message),
                        ))
                    }
                    _ => Err(DomainError::token_unavailable(message)),
                }
            }
        }
    }

    /// Usable token for a team by ID
    pub async fn access_token(&self, id: TeamId) -> Result<String, DomainError> {
        let mut team = self.load(id).await?;
        self.ensure_access_token(&mut team).await
    }

    /// Run a failed upstream call through the classifier and apply it to the team
    async fn upstream_failure(
        &self,
        team: &mut Team,
        failure: ApiFailure,
        counting: Counting,
    ) -> DomainError {
        let kind = classify(&failure);

        let error = match kind {
            FailureKind::AccountBanned => {
                warn!(team_id = %team.id(), code = ?failure.code, "Upstream reports account banned");
                team.mark_banned();
                DomainError::account_banned(format!("{} is banned: {}", team.label(), failure.message))
            }
            FailureKind::GrantInvalid => {
                team.record_failure(self.settings.error_threshold);
                DomainError::token_unavailable(failure.message)
            }
            _ => {
                if counting == Counting::AllFailures || kind.counts_as_error() {
                    if team.record_failure(self.settings.error_threshold) {
                        warn!(team_id = %team.id(), error_count = team.error_count(), "Team moved to error");
                    }
                }
                DomainError::upstream(failure.status, failure.code, failure.message)
            }
        };

        if let Err(e) = self.repository.update(team).await {
            return e;
        }

        error
    }

    // Lifecycle operations

    /// Re-fetch subscription metadata and seat usage from upstream
    pub async fn sync_team_info(&self, id: TeamId) -> Result<SyncReport, DomainError> {
        let mut team = self.load(id).await?;
        let token = self.ensure_access_token(&mut team).await?;

        let accounts = match self.upstream.account_info(&token).await {
            Ok(accounts) => accounts,
            Err(failure) => {
                return Err(self.upstream_failure(&mut team, failure, Counting::AllFailures).await)
            }
        };

        let Some(account) = select_account(&accounts, team.account_id()) else {
            team.mark_error();
            self.repository.update(&team).await?;
            return Err(DomainError::not_found(format!(
                "No team account is associated with the token of {}",
                team.label()
            )));
        };

        let seats = match self.count_seats(&token, &account.account_id).await {
            Ok(seats) => seats,
            Err(failure) => {
                return Err(self.upstream_failure(&mut team, failure, Counting::AllFailures).await)
            }
        };

        team.apply_sync(account.subscription(), seats, Utc::now());
        let team = self.repository.update(&team).await?;

        info!(team_id = %id, members = seats, status = %team.status(), "Team synced");
        Ok(SyncReport {
            team_id: id,
            status: team.status(),
            current_members: team.current_members(),
        })
    }

    /// Sync every team sequentially
    pub async fn sync_all_teams(&self) -> Result<Vec<SyncOutcome>, DomainError> {
        let teams = self.repository.list(&TeamQuery::new()).await?;
        let mut outcomes = Vec::with_capacity(teams.len());

        for team in teams {
            let result = self.sync_team_info(team.id()).await;
            let status = match &result {
                Ok(report) => report.status,
                Err(_) => self
                    .repository
                    .get(team.id())
                    .await?
                    .map(|t| t.status())
                    .unwrap_or(team.status()),
            };

            outcomes.push(SyncOutcome {
                team_id: team.id(),
                email: team.email().to_string(),
                status,
                error: result.err().map(|e| e.to_string()),
            });
        }

        let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
        info!(total = outcomes.len(), failed, "Synced all teams");
        Ok(outcomes)
    }

    async fn count_seats(&self, token: &str, account_id: &str) -> Result<u32, ApiFailure> {
        let members = self.upstream.list_members(token, account_id).await?;
        let invites = self.upstream.list_invites(token, account_id).await?;
        Ok(members.total + invites.total)
    }

    /// Invite an email to the team, taking one seat
    pub async fn add_member(&self, id: TeamId, email: &str) -> Result<Team, DomainError> {
        validate_email(email)?;
        let mut team = self.load(id).await?;

        match team.status() {
            TeamStatus::Full => {
                return Err(DomainError::conflict(format!("{} is full", team.label())))
            }
            TeamStatus::Expired => {
                return Err(DomainError::validation(format!(
                    "{} subscription has expired",
                    team.label()
                )))
            }
            TeamStatus::Banned => {
                return Err(DomainError::account_banned(format!("{} is banned", team.label())))
            }
            TeamStatus::Active | TeamStatus::Error => {}
        }

        let token = self.ensure_access_token(&mut team).await?;

        if let Err(failure) = self
            .upstream
            .send_invite(&token, team.account_id(), email)
            .await
        {
            return Err(self.upstream_failure(&mut team, failure, Counting::TransientOnly).await);
        }

        team.record_success();
        team.member_added(Utc::now());
        let team = self.repository.update(&team).await?;

        info!(team_id = %id, members = team.current_members(), status = %team.status(), "Member invited");
        Ok(team)
    }

    /// Withdraw a pending invite, freeing its seat
    pub async fn revoke_invite(&self, id: TeamId, email: &str) -> Result<Team, DomainError> {
        let mut team = self.load(id).await?;
        let token = self.ensure_access_token(&mut team).await?;

        if let Err(failure) = self
            .upstream
            .delete_invite(&token, team.account_id(), email)
            .await
        {
            return Err(self.upstream_failure(&mut team, failure, Counting::TransientOnly).await);
        }

        team.record_success();
        team.member_removed(Utc::now());
        let team = self.repository.update(&team).await?;

        info!(team_id = %id, members = team.current_members(), "Invite revoked");
        Ok(team)
    }

    /// Remove a joined member, freeing their seat
    pub async fn delete_member(&self, id: TeamId, user_id: &str) -> Result<Team, DomainError> {
        let mut team = self.load(id).await?;
        let token = self.ensure_access_token(&mut team).await?;

        if let Err(failure) = self
            .upstream
            .delete_member(&token, team.account_id(), user_id)
            .await
        {
            return Err(self.upstream_failure(&mut team, failure, Counting::TransientOnly).await);
        }

        team.record_success();
        team.member_removed(Utc::now());
        let team = self.repository.update(&team).await?;

        info!(team_id = %id, members = team.current_members(), "Member removed");
        Ok(team)
    }

    /// Joined members followed by pending invites
    pub async fn list_members(&self, id: TeamId) -> Result<Vec<TeamMemberView>, DomainError> {
        let mut team = self.load(id).await?;
        let token = self.ensure_access_token(&mut team).await?;

        let members = match self.upstream.list_members(&token, team.account_id()).await {
            Ok(members) => members,
            Err(failure) => {
                return Err(self.upstream_failure(&mut team, failure, Counting::TransientOnly).await)
            }
        };
        let invites = match self.upstream.list_invites(&token, team.account_id()).await {
            Ok(invites) => invites,
            Err(failure) => {
                return Err(self.upstream_failure(&mut team, failure, Counting::TransientOnly).await)
            }
        };

        if team.error_count() > 0 || team.status() == TeamStatus::Error {
            team.record_success();
            team.recompute_status(Utc::now());
            self.repository.update(&team).await?;
        }

        let joined = members.items.into_iter().map(|m| TeamMemberView {
            email: m.email,
            user_id: Some(m.id),
            role: m.role,
            state: MemberState::Joined,
            created_time: m.created_time,
        });
        let invited = invites.items.into_iter().map(|i| TeamMemberView {
            email: i.email,
            user_id: None,
            role: i.role,
            state: MemberState::Invited,
            created_time: i.created_time,
        });

        Ok(joined.chain(invited).collect())
    }

    // Administration

    /// Import every usable tenant reachable with the given credentials
    pub async fn import_team(&self, request: ImportTeamRequest) -> Result<ImportReport, DomainError> {
        let (access_token, refresh_token) = self.obtain_import_token(&request).await?;

        let email = match request.email.clone().filter(|e| !e.is_empty()) {
            Some(email) => email,
            None => token_email(&access_token).ok_or_else(|| {
                DomainError::validation("Cannot read the owner email from the token, provide it explicitly")
            })?,
        };

        let (to_import, known) = match request.account_id.as_deref().filter(|a| !a.is_empty()) {
            Some(account_id) => {
                let placeholder = placeholder_account(account_id);
                (vec![placeholder.clone()], vec![placeholder])
            }
            None => {
                let accounts = self
                    .upstream
                    .account_info(&access_token)
                    .await
                    .map_err(|f| DomainError::upstream(f.status, f.code, f.message))?;

                if accounts.is_empty() {
                    return Err(DomainError::not_found("No team account is associated with the token"));
                }

                let mut active: Vec<TeamAccountInfo> = accounts
                    .iter()
                    .filter(|a| a.has_active_subscription)
                    .cloned()
                    .collect();
                if active.is_empty() {
                    active.push(accounts[0].clone());
                }
                (active, accounts)
            }
        };

        let credentials = TeamCredentials {
            access_token: self.vault.encrypt(&access_token)?,
            refresh_token: encrypt_optional(self.vault.as_ref(), refresh_token.as_deref())?,
            session_token: encrypt_optional(self.vault.as_ref(), request.session_token.as_deref())?,
            client_id: encrypt_optional(self.vault.as_ref(), request.client_id.as_deref())?,
        };
        let tenants: Vec<(String, String)> = known
            .iter()
            .map(|a| (a.account_id.clone(), a.name.clone()))
            .collect();

        let mut report = ImportReport {
            imported: Vec::new(),
            skipped: Vec::new(),
        };

        for account in to_import {
            if self.repository.find_by_account_id(&account.account_id).await?.is_some() {
                report.skipped.push(account.account_id);
                continue;
            }

            let seats = self
                .count_seats(&access_token, &account.account_id)
                .await
                .unwrap_or_else(|failure| {
                    warn!(account_id = %account.account_id, error = %failure, "Could not count seats on import");
                    0
                });

            let draft = TeamDraft::new(email.clone(), credentials.clone(), account.subscription())
                .with_members(seats)
                .with_max_members(self.settings.default_max_members);
            let team = self.repository.create(draft, tenants.clone()).await?;

            info!(team_id = %team.id(), account_id = %account.account_id, status = %team.status(), "Team imported");
            report.imported.push(team.id());
        }

        if report.imported.is_empty() {
            return Err(DomainError::conflict(format!(
                "All {} team accounts are already imported",
                report.skipped.len()
            )));
        }

        Ok(report)
    }

    /// Access token usable for import, plus the refresh token to store
    async fn obtain_import_token(
        &self,
        request: &ImportTeamRequest,
    ) -> Result<(String, Option<String>), DomainError> {
        let now = Utc::now();
        let mut refresh_token = request.refresh_token.clone().filter(|t| !t.is_empty());

        if let Some(token) = request.access_token.as_deref().filter(|t| !is_token_expired(t, now)) {
            return Ok((token.to_string(), refresh_token));
        }

        if let Some(session_token) = request.session_token.as_deref().filter(|t| !t.is_empty()) {
            match self.upstream.refresh_with_session_token(session_token).await {
                Ok(tokens) if !is_token_expired(&tokens.access_token, now) => {
                    return Ok((tokens.access_token, refresh_token))
                }
                Ok(_) => warn!("Session token refresh returned an expired token on import"),
                Err(failure) => warn!(error = %failure, "Session token refresh failed on import"),
            }
        }

        if let (Some(rt), Some(client_id)) = (refresh_token.clone(), request.client_id.as_deref()) {
            match self.upstream.refresh_with_refresh_token(&rt, client_id).await {
                Ok(tokens) if !is_token_expired(&tokens.access_token, now) => {
                    if tokens.refresh_token.is_some() {
                        refresh_token = tokens.refresh_token;
                    }
                    return Ok((tokens.access_token, refresh_token));
                }
                Ok(_) => warn!("Refresh token grant returned an expired token on import"),
                Err(failure) => warn!(error = %failure, "Refresh token grant failed on import"),
            }
        }

        Err(DomainError::token_unavailable(
            "No valid access token and none could be obtained from the session or refresh token",
        ))
    }

    /// Apply administrative changes; re-syncs when the token or tenant changed
    pub async fn update_team(&self, id: TeamId, request: UpdateTeamRequest) -> Result<Team, DomainError> {
        let mut team = self.load(id).await?;
        let now = Utc::now();

        if let Some(email) = request.email.filter(|e| !e.is_empty()) {
            team.set_email(email);
        }

        let account_changed = match request.account_id.filter(|a| !a.is_empty()) {
            Some(account_id) => {
                self.repository.set_primary_account(id, &account_id).await?;
                team.set_account_id(account_id);
                true
            }
            None => false,
        };

        let token_changed = match request.access_token.filter(|t| !t.is_empty()) {
            Some(token) => {
                team.replace_access_token(self.vault.encrypt(&token)?);
                true
            }
            None => false,
        };

        if let Some(secret) = encrypt_optional(self.vault.as_ref(), request.refresh_token.as_deref())? {
            team.replace_refresh_token(secret);
        }
        if let Some(secret) = encrypt_optional(self.vault.as_ref(), request.session_token.as_deref())? {
            team.replace_session_token(secret);
        }
        if let Some(secret) = encrypt_optional(self.vault.as_ref(), request.client_id.as_deref())? {
            team.replace_client_id(secret);
        }

        if let Some(max_members) = request.max_members {
            team.set_max_members(max_members, now);
        }

        if let Some(status) = request.status {
            info!(team_id = %id, from = %team.status(), to = %status, "Team status overridden");
            team.override_status(status);
            team.recompute_status(now);
        }

        let team = self.repository.update(&team).await?;

        if token_changed || account_changed {
            if let Err(e) = self.sync_team_info(id).await {
                warn!(team_id = %id, error = %e, "Sync after update failed");
            }
            return self.load(id).await;
        }

        Ok(team)
    }

    /// Delete a team with its tenant associations and redemption records
    pub async fn delete_team(&self, id: TeamId) -> Result<bool, DomainError> {
        let deleted = self.repository.delete(id).await?;
        if deleted {
            info!(team_id = %id, "Team deleted");
        }
        Ok(deleted)
    }

    /// Active teams with free seats
    pub async fn available_teams(&self) -> Result<Vec<AvailableTeam>, DomainError> {
        let query = TeamQuery::new()
            .with_status(TeamStatus::Active)
            .with_free_seats();

        Ok(self
            .repository
            .list(&query)
            .await?
            .into_iter()
            .map(|team| AvailableTeam {
                id: team.id(),
                team_name: team.team_name().map(str::to_string),
                current_members: team.current_members(),
                max_members: team.max_members(),
                expires_at: team.expires_at(),
                subscription_plan: team.subscription_plan().map(str::to_string),
            })
            .collect())
    }

    /// Sum of free seats over active teams
    pub async fn total_available_seats(&self) -> Result<u32, DomainError> {
        Ok(self
            .available_teams()
            .await?
            .iter()
            .map(|team| team.max_members.saturating_sub(team.current_members))
            .sum())
    }
}

/// The tenant the team is bound to, else the first active one, else the first
fn select_account<'a>(accounts: &'a [TeamAccountInfo], current: &str) -> Option<&'a TeamAccountInfo> {
    accounts
        .iter()
        .find(|a| a.account_id == current)
        .or_else(|| accounts.iter().find(|a| a.has_active_subscription))
        .or_else(|| accounts.first())
}

/// Metadata for a tenant given by id; a later sync fills in the details
fn placeholder_account(account_id: &str) -> TeamAccountInfo {
    let short: String = account_id.chars().take(8).collect();

    TeamAccountInfo {
        account_id: account_id.to_string(),
        name: format!("Team-{}", short),
        plan_type: TEAM_PLAN_TYPE.to_string(),
        subscription_plan: "unknown".to_string(),
        expires_at: None,
        has_active_subscription: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credentials::EncryptedSecret;
    use crate::domain::upstream::mock::{account, tokens, MockUpstreamApi};
    use crate::infrastructure::auth::fixtures::{expired_token, valid_token};
    use crate::infrastructure::storage::InMemoryStore;
    use crate::infrastructure::vault::AesGcmVault;

    struct Harness {
        store: Arc<InMemoryStore>,
        upstream: Arc<MockUpstreamApi>,
        vault: Arc<AesGcmVault>,
        service: TeamService,
    }

    fn harness(upstream: MockUpstreamApi) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let upstream = Arc::new(upstream);
        let vault = Arc::new(AesGcmVault::from_secret("test-key").unwrap());
        let service = TeamService::new(
            store.clone(),
            upstream.clone(),
            vault.clone(),
            TeamSettings::default(),
        );
        Harness {
            store,
            upstream,
            vault,
            service,
        }
    }

    async fn seed(h: &Harness, members: u32, token: &str) -> Team {
        let credentials = TeamCredentials {
            access_token: h.vault.encrypt(token).unwrap(),
            refresh_token: None,
            session_token: None,
            client_id: None,
        };
        let draft = TeamDraft::new("owner@example.com", credentials, account("acc-1").subscription())
            .with_members(members);
        h.store.create(draft, vec![]).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_member_fills_last_seat() {
        let h = harness(MockUpstreamApi::new());
        let team = seed(&h, 5, &valid_token("owner@example.com")).await;
        assert_eq!(team.status(), TeamStatus::Active);

        let team = h.service.add_member(team.id(), "new@x.com").await.unwrap();

        assert_eq!(team.current_members(), 6);
        assert_eq!(team.status(), TeamStatus::Full);
        assert_eq!(h.upstream.calls("send_invite"), 1);
    }

    #[tokio::test]
    async fn test_add_member_rejects_full_and_expired() {
        let h = harness(MockUpstreamApi::new());
        let full = seed(&h, 6, &valid_token("o@x.com")).await;
        assert!(matches!(
            h.service.add_member(full.id(), "a@x.com").await,
            Err(DomainError::Conflict { .. })
        ));

        let mut subscription = account("acc-2").subscription();
        subscription.expires_at = Some(Utc::now() - chrono::Duration::days(1));
        let credentials = TeamCredentials {
            access_token: EncryptedSecret::new("x"),
            refresh_token: None,
            session_token: None,
            client_id: None,
        };
        let expired = h
            .store
            .create(TeamDraft::new("o@x.com", credentials, subscription), vec![])
            .await
            .unwrap();
        assert!(matches!(
            h.service.add_member(expired.id(), "a@x.com").await,
            Err(DomainError::Validation { .. })
        ));
        assert_eq!(h.upstream.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_add_member_ban_is_immediate() {
        let h = harness(MockUpstreamApi::new());
        let team = seed(&h, 1, &valid_token("o@x.com")).await;
        let mut stored = h.store.get(team.id()).await.unwrap().unwrap();
        stored.record_failure(3);
        h.store.update(&stored).await.unwrap();

        h.upstream.fail_next(
            "send_invite",
            ApiFailure::new(403, "Forbidden").with_code("account_deactivated"),
        );
        let result = h.service.add_member(team.id(), "a@x.com").await;

        assert!(matches!(result, Err(DomainError::AccountBanned { .. })));
        let stored = h.store.get(team.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), TeamStatus::Banned);
        assert_eq!(stored.current_members(), 1);
    }

    #[tokio::test]
    async fn test_add_member_client_error_not_counted() {
        let h = harness(MockUpstreamApi::new());
        let team = seed(&h, 1, &valid_token("o@x.com")).await;

        h.upstream
            .fail_next("send_invite", ApiFailure::new(409, "User is already a member of this team"));
        let result = h.service.add_member(team.id(), "a@x.com").await;

        assert!(matches!(result, Err(DomainError::Upstream { status: 409, .. })));
        assert_eq!(h.store.get(team.id()).await.unwrap().unwrap().error_count(), 0);
    }

    #[tokio::test]
    async fn test_add_member_with_unrefreshable_token() {
        let h = harness(MockUpstreamApi::new());
        let team = seed(&h, 1, &expired_token("o@x.com")).await;

        let result = h.service.add_member(team.id(), "a@x.com").await;

        assert!(matches!(result, Err(DomainError::TokenUnavailable { .. })));
        assert!(result.unwrap_err().requires_intervention());
        assert_eq!(h.store.get(team.id()).await.unwrap().unwrap().error_count(), 1);
        assert_eq!(h.upstream.calls("send_invite"), 0);
    }

    #[tokio::test]
    async fn test_delete_member_frees_seat() {
        let h = harness(MockUpstreamApi::new().with_members(6));
        let team = seed(&h, 6, &valid_token("o@x.com")).await;

        let team = h.service.delete_member(team.id(), "user-0").await.unwrap();

        assert_eq!(team.current_members(), 5);
        assert_eq!(team.status(), TeamStatus::Active);
    }

    #[tokio::test]
    async fn test_revoke_invite_frees_seat() {
        let h = harness(MockUpstreamApi::new().with_invites(1));
        let team = seed(&h, 6, &valid_token("o@x.com")).await;

        let team = h
            .service
            .revoke_invite(team.id(), "invitee0@example.com")
            .await
            .unwrap();

        assert_eq!(team.current_members(), 5);
        assert_eq!(team.status(), TeamStatus::Active);
    }

    #[tokio::test]
    async fn test_sync_counts_members_and_invites() {
        let h = harness(
            MockUpstreamApi::new()
                .with_account(account("acc-1"))
                .with_members(4)
                .with_invites(2),
        );
        let team = seed(&h, 0, &valid_token("o@x.com")).await;

        let report = h.service.sync_team_info(team.id()).await.unwrap();

        assert_eq!(report.current_members, 6);
        assert_eq!(report.status, TeamStatus::Full);
        let stored = h.store.get(team.id()).await.unwrap().unwrap();
        assert!(stored.last_sync().is_some());
        assert_eq!(stored.team_name(), Some("Team acc-1"));
    }

    #[tokio::test]
    async fn test_sync_failures_reach_error_and_success_restores() {
        let h = harness(MockUpstreamApi::new().with_account(account("acc-1")).with_members(2));
        let team = seed(&h, 0, &valid_token("o@x.com")).await;

        for _ in 0..3 {
            h.upstream
                .fail_next("account_info", ApiFailure::new(500, "server error 500, retried 3 times"));
            assert!(h.service.sync_team_info(team.id()).await.is_err());
        }
        let stored = h.store.get(team.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), TeamStatus::Error);
        assert_eq!(stored.error_count(), 3);

        let report = h.service.sync_team_info(team.id()).await.unwrap();
        assert_eq!(report.status, TeamStatus::Active);
        assert_eq!(h.store.get(team.id()).await.unwrap().unwrap().error_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_keeps_banned_team_banned() {
        let h = harness(MockUpstreamApi::new().with_account(account("acc-1")));
        let team = seed(&h, 0, &valid_token("o@x.com")).await;
        let mut stored = h.store.get(team.id()).await.unwrap().unwrap();
        stored.mark_banned();
        h.store.update(&stored).await.unwrap();

        let report = h.service.sync_team_info(team.id()).await.unwrap();
        assert_eq!(report.status, TeamStatus::Banned);
    }

    #[tokio::test]
    async fn test_sync_without_accounts_marks_error() {
        let h = harness(MockUpstreamApi::new());
        let team = seed(&h, 0, &valid_token("o@x.com")).await;

        assert!(matches!(
            h.service.sync_team_info(team.id()).await,
            Err(DomainError::NotFound { .. })
        ));
        assert_eq!(
            h.store.get(team.id()).await.unwrap().unwrap().status(),
            TeamStatus::Error
        );
    }

    #[tokio::test]
    async fn test_sync_without_accounts_keeps_banned_team_banned() {
        let h = harness(MockUpstreamApi::new());
        let team = seed(&h, 0, &valid_token("o@x.com")).await;
        let mut stored = h.store.get(team.id()).await.unwrap().unwrap();
        stored.mark_banned();
        h.store.update(&stored).await.unwrap();

        assert!(matches!(
            h.service.sync_team_info(team.id()).await,
            Err(DomainError::NotFound { .. })
        ));
        assert_eq!(
            h.store.get(team.id()).await.unwrap().unwrap().status(),
            TeamStatus::Banned
        );
    }

    #[tokio::test]
    async fn test_transient_refresh_failure_is_retryable() {
        let h = harness(
            MockUpstreamApi::new()
                .with_session_refresh(Err(ApiFailure::network("request timed out, retried 3 times"))),
        );
        let credentials = TeamCredentials {
            access_token: h.vault.encrypt(&expired_token("o@x.com")).unwrap(),
            refresh_token: None,
            session_token: Some(h.vault.encrypt("st").unwrap()),
            client_id: None,
        };
        let team = h
            .store
            .create(TeamDraft::new("o@x.com", credentials, account("acc-1").subscription()), vec![])
            .await
            .unwrap();

        let error = h.service.access_token(team.id()).await.unwrap_err();

        assert!(matches!(error, DomainError::Upstream { status: 0, .. }));
        assert!(!error.requires_intervention());
        assert_eq!(h.store.get(team.id()).await.unwrap().unwrap().error_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_grant_requires_intervention() {
        let h = harness(
            MockUpstreamApi::new()
                .with_oauth_refresh(Err(ApiFailure::new(400, "bad").with_code("invalid_grant"))),
        );
        let credentials = TeamCredentials {
            access_token: h.vault.encrypt(&expired_token("o@x.com")).unwrap(),
            refresh_token: Some(h.vault.encrypt("rt").unwrap()),
            session_token: None,
            client_id: Some(h.vault.encrypt("cid").unwrap()),
        };
        let team = h
            .store
            .create(TeamDraft::new("o@x.com", credentials, account("acc-1").subscription()), vec![])
            .await
            .unwrap();

        let error = h.service.access_token(team.id()).await.unwrap_err();

        assert!(matches!(error, DomainError::TokenUnavailable { .. }));
        assert!(error.requires_intervention());
    }

    #[tokio::test]
    async fn test_sync_all_reports_each_team() {
        let h = harness(MockUpstreamApi::new().with_account(account("acc-1")));
        let good = seed(&h, 0, &valid_token("o@x.com")).await;

        let credentials = TeamCredentials {
            access_token: h.vault.encrypt(&expired_token("o@x.com")).unwrap(),
            refresh_token: None,
            session_token: None,
            client_id: None,
        };
        let bad = h
            .store
            .create(TeamDraft::new("b@x.com", credentials, account("acc-9").subscription()), vec![])
            .await
            .unwrap();

        let outcomes = h.service.sync_all_teams().await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().any(|o| o.team_id == good.id() && o.error.is_none()));
        assert!(outcomes.iter().any(|o| o.team_id == bad.id() && o.error.is_some()));
    }

    #[tokio::test]
    async fn test_import_discovers_active_accounts() {
        let mut inactive = account("acc-2");
        inactive.has_active_subscription = false;
        let h = harness(
            MockUpstreamApi::new()
                .with_account(account("acc-1"))
                .with_account(inactive)
                .with_members(2)
                .with_invites(1),
        );

        let report = h
            .service
            .import_team(ImportTeamRequest {
                access_token: Some(valid_token("owner@example.com")),
                refresh_token: Some("rt".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.imported.len(), 1);
        let team = h.store.get(report.imported[0]).await.unwrap().unwrap();
        assert_eq!(team.email(), "owner@example.com");
        assert_eq!(team.account_id(), "acc-1");
        assert_eq!(team.current_members(), 3);
        let rt = team.credentials().refresh_token.as_ref().unwrap();
        assert_eq!(h.vault.decrypt(rt).unwrap(), "rt");

        let accounts = h.store.accounts(team.id()).await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts.iter().filter(|a| a.is_primary).count(), 1);

        let again = h
            .service
            .import_team(ImportTeamRequest {
                access_token: Some(valid_token("owner@example.com")),
                ..Default::default()
            })
            .await;
        assert!(matches!(again, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_import_refreshes_expired_token_with_session() {
        let fresh = valid_token("owner@example.com");
        let h = harness(
            MockUpstreamApi::new()
                .with_session_refresh(Ok(tokens(&fresh, None)))
                .with_account(account("acc-1")),
        );

        let report = h
            .service
            .import_team(ImportTeamRequest {
                access_token: Some(expired_token("owner@example.com")),
                session_token: Some("st".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let team = h.store.get(report.imported[0]).await.unwrap().unwrap();
        assert_eq!(h.vault.decrypt(&team.credentials().access_token).unwrap(), fresh);
    }

    #[tokio::test]
    async fn test_import_with_explicit_account_skips_discovery() {
        let h = harness(MockUpstreamApi::new());

        let report = h
            .service
            .import_team(ImportTeamRequest {
                access_token: Some(valid_token("owner@example.com")),
                account_id: Some("1234567890abcdef".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let team = h.store.get(report.imported[0]).await.unwrap().unwrap();
        assert_eq!(team.team_name(), Some("Team-12345678"));
        assert_eq!(h.upstream.calls("account_info"), 0);
    }

    #[tokio::test]
    async fn test_import_without_usable_token_fails() {
        let h = harness(MockUpstreamApi::new());
        let result = h
            .service
            .import_team(ImportTeamRequest {
                access_token: Some(expired_token("o@x.com")),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(DomainError::TokenUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_update_override_unbans_and_recomputes() {
        let h = harness(MockUpstreamApi::new());
        let team = seed(&h, 6, &valid_token("o@x.com")).await;
        let mut stored = h.store.get(team.id()).await.unwrap().unwrap();
        stored.mark_banned();
        h.store.update(&stored).await.unwrap();

        let team = h
            .service
            .update_team(
                team.id(),
                UpdateTeamRequest {
                    status: Some(TeamStatus::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(team.status(), TeamStatus::Full);

        let team = h
            .service
            .update_team(
                team.id(),
                UpdateTeamRequest {
                    max_members: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(team.status(), TeamStatus::Active);
    }

    #[tokio::test]
    async fn test_available_teams_and_seats() {
        let h = harness(MockUpstreamApi::new());
        seed(&h, 2, "x").await;
        let credentials = TeamCredentials {
            access_token: EncryptedSecret::new("x"),
            refresh_token: None,
            session_token: None,
            client_id: None,
        };
        h.store
            .create(
                TeamDraft::new("o@x.com", credentials, account("acc-2").subscription()).with_members(6),
                vec![],
            )
            .await
            .unwrap();

        let available = h.service.available_teams().await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(h.service.total_available_seats().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_list_members_merges_invites() {
        let h = harness(MockUpstreamApi::new().with_members(2).with_invites(1));
        let team = seed(&h, 3, &valid_token("o@x.com")).await;

        let members = h.service.list_members(team.id()).await.unwrap();

        assert_eq!(members.len(), 3);
        assert_eq!(members.iter().filter(|m| m.state == MemberState::Invited).count(), 1);
        assert_eq!(members[0].user_id.as_deref(), Some("user-0"));
    }

    #[tokio::test]
    async fn test_delete_team() {
        let h = harness(MockUpstreamApi::new());
        let team = seed(&h, 0, "x").await;

        assert!(h.service.delete_team(team.id()).await.unwrap());
        assert!(h.service.get(team.id()).await.unwrap().is_none());
    }
}
