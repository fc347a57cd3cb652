//! Warranty reuse rules and status queries

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::rate_limiter::QueryRateLimiter;
use crate::domain::redemption::{RedemptionCode, RedemptionRecord, RedemptionRepository};
use crate::domain::team::{Team, TeamId, TeamStatus};
use crate::domain::DomainError;
use crate::infrastructure::team::TeamService;

/// Whether a warranty code may be consumed again by an email
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReuseDecision {
    pub can_reuse: bool,
    pub reason: String,
    /// The email has consumed this code before
    pub prior_use: bool,
}

impl ReuseDecision {
    fn allow(reason: impl Into<String>, prior_use: bool) -> Self {
        Self {
            can_reuse: true,
            reason: reason.into(),
            prior_use,
        }
    }

    fn deny(reason: impl Into<String>, prior_use: bool) -> Self {
        Self {
            can_reuse: false,
            reason: reason.into(),
            prior_use,
        }
    }
}

/// Subject of a warranty status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarrantyQuery {
    Email(String),
    Code(String),
}

/// One past redemption and what became of its team
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionStatus {
    pub code: String,
    pub email: String,
    pub team_id: TeamId,
    /// None when the team no longer exists
    pub team_status: Option<TeamStatus>,
    pub team_name: Option<String>,
    pub redeemed_at: DateTime<Utc>,
    pub has_warranty: bool,
    pub warranty_valid: bool,
    pub warranty_expires_at: Option<DateTime<Utc>>,
}

/// Aggregated warranty view for an email or a code
#[derive(Debug, Clone, Serialize)]
pub struct WarrantyReport {
    pub has_warranty: bool,
    pub warranty_valid: bool,
    pub warranty_expires_at: Option<DateTime<Utc>>,
    pub banned_teams: Vec<TeamId>,
    pub can_reuse: bool,
    pub records: Vec<RedemptionStatus>,
}

/// Warranty service: reuse eligibility and rate-limited status queries
#[derive(Debug, Clone)]
pub struct WarrantyService {
    codes: Arc<dyn RedemptionRepository>,
    teams: TeamService,
    limiter: Arc<QueryRateLimiter>,
}

impl WarrantyService {
    pub fn new(
        codes: Arc<dyn RedemptionRepository>,
        teams: TeamService,
        limiter: Arc<QueryRateLimiter>,
    ) -> Self {
        Self {
            codes,
            teams,
            limiter,
        }
    }

    /// Decide whether `email` may redeem the warranty code `code` again
    pub async fn validate_warranty_reuse(
        &self,
        code: &str,
        email: &str,
    ) -> Result<ReuseDecision, DomainError> {
        let now = Utc::now();

        let Some(stored) = self.codes.get_code(code).await? else {
            return Ok(ReuseDecision::deny("Redemption code not found", false));
        };

        if !stored.has_warranty() {
            return Ok(ReuseDecision::deny("Redemption code has no warranty", false));
        }

        if !stored.is_warranty_valid(now) {
            return Ok(ReuseDecision::deny("Warranty period has expired", false));
        }

        let records: Vec<RedemptionRecord> = self
            .codes
            .records_for_code(code)
            .await?
            .into_iter()
            .filter(|record| record.email.eq_ignore_ascii_case(email))
            .collect();

        if records.is_empty() {
            return Ok(ReuseDecision::allow("First use of this code", false));
        }

        let teams = self.teams_of(&records).await?;

        if let Some(team) = teams
            .iter()
            .find(|team| team.status().is_serving() && !team.is_subscription_expired(now))
        {
            return Ok(ReuseDecision::deny(
                format!("Already seated on {} ({})", team.label(), team.status()),
                true,
            ));
        }

        if let Some(team) = teams.iter().find(|team| team.status() == TeamStatus::Banned) {
            debug!(code = %code, team_id = %team.id(), "Warranty reuse qualified by banned team");
            return Ok(ReuseDecision::allow(
                format!("{} was banned, warranty reuse allowed", team.label()),
                true,
            ));
        }

        Ok(ReuseDecision::deny(
            "No banned team found; only a banned team qualifies for warranty reuse",
            true,
        ))
    }

    /// Distinct teams referenced by the records that still exist
    async fn teams_of(&self, records: &[RedemptionRecord]) -> Result<Vec<Team>, DomainError> {
        let mut seen = HashSet::new();
        let mut teams = Vec::new();

        for record in records {
            if !seen.insert(record.team_id) {
                continue;
            }
            if let Some(team) = self.teams.get(record.team_id).await? {
                teams.push(team);
            }
        }

        Ok(teams)
    }

    /// Warranty state of every code used by an email, or of one code
    pub async fn check_warranty_status(
        &self,
        query: WarrantyQuery,
    ) -> Result<WarrantyReport, DomainError> {
        let records = match &query {
            WarrantyQuery::Email(email) => {
                self.limiter.check(&QueryRateLimiter::email_key(email)).await?;
                latest_per_code(self.codes.records_for_email(email).await?)
            }
            WarrantyQuery::Code(code) => {
                self.limiter.check(&QueryRateLimiter::code_key(code)).await?;
                let stored = self.codes.get_code(code).await?.ok_or_else(|| {
                    DomainError::not_found(format!("Redemption code '{}' not found", code))
                })?;

                let records = self.codes.records_for_code(code).await?;
                if records.is_empty() {
                    return Ok(unused_report(&stored));
                }
                records.into_iter().take(1).collect()
            }
        };

        let now = Utc::now();
        self.resync(&records).await?;

        let mut statuses = Vec::with_capacity(records.len());
        let mut banned_teams = Vec::new();
        let mut primary: Option<RedemptionCode> = None;

        for record in &records {
            let code = self.codes.get_code(&record.code).await?;
            let team = self.teams.get(record.team_id).await?;

            if team.as_ref().is_some_and(|t| t.status() == TeamStatus::Banned)
                && !banned_teams.contains(&record.team_id)
            {
                banned_teams.push(record.team_id);
            }

            if primary.is_none() {
                primary = code.clone().filter(|c| c.has_warranty());
            }

            statuses.push(RedemptionStatus {
                code: record.code.clone(),
                email: record.email.clone(),
                team_id: record.team_id,
                team_status: team.as_ref().map(|t| t.status()),
                team_name: team.as_ref().and_then(|t| t.team_name().map(str::to_string)),
                redeemed_at: record.redeemed_at,
                has_warranty: code.as_ref().is_some_and(|c| c.has_warranty()),
                warranty_valid: code
                    .as_ref()
                    .is_some_and(|c| c.has_warranty() && c.is_warranty_valid(now)),
                warranty_expires_at: code.as_ref().and_then(|c| c.warranty_expires_at()),
            });
        }

        let warranty_valid = primary.as_ref().is_some_and(|c| c.is_warranty_valid(now));
        let can_reuse = warranty_valid && !banned_teams.is_empty();

        info!(
            query = ?query,
            records = statuses.len(),
            banned = banned_teams.len(),
            can_reuse,
            "Warranty status checked"
        );

        Ok(WarrantyReport {
            has_warranty: primary.is_some(),
            warranty_valid,
            warranty_expires_at: primary.as_ref().and_then(|c| c.warranty_expires_at()),
            banned_teams,
            can_reuse,
            records: statuses,
        })
    }

    /// Refresh live status of referenced teams that are not already banned or in error
    async fn resync(&self, records: &[RedemptionRecord]) -> Result<(), DomainError> {
        for team in self.teams_of(records).await? {
            if matches!(team.status(), TeamStatus::Banned | TeamStatus::Error) {
                continue;
            }

            if let Err(e) = self.teams.sync_team_info(team.id()).await {
                warn!(team_id = %team.id(), error = %e, "Sync before warranty check failed");
            }
        }

        Ok(())
    }
}

/// Newest record of each distinct code; input is newest first
fn latest_per_code(records: Vec<RedemptionRecord>) -> Vec<RedemptionRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.code.clone()))
        .collect()
}

fn unused_report(code: &RedemptionCode) -> WarrantyReport {
    WarrantyReport {
        has_warranty: code.has_warranty(),
        warranty_valid: code.has_warranty() && code.is_warranty_valid(Utc::now()),
        warranty_expires_at: code.warranty_expires_at(),
        banned_teams: Vec::new(),
        can_reuse: false,
        records: Vec::new(),
    }
}
