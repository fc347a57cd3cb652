//! Team entity and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lifecycle::{capacity_status, DEFAULT_MAX_MEMBERS};
use crate::domain::credentials::EncryptedSecret;

/// Team identifier - surrogate key assigned by the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(u64);

impl TeamId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    /// Seats available and subscription current
    #[default]
    Active,
    /// All seats taken
    Full,
    /// Upstream subscription has lapsed
    Expired,
    /// Repeated upstream or refresh failures
    Error,
    /// Upstream account deactivated or token invalidated
    Banned,
}

impl TeamStatus {
    /// Statuses whose value is derived from membership and expiry
    pub fn is_capacity_driven(&self) -> bool {
        matches!(self, Self::Active | Self::Full | Self::Expired)
    }

    /// Whether the team currently gives its members access
    pub fn is_serving(&self) -> bool {
        matches!(self, Self::Active | Self::Full)
    }
}

impl std::fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Full => write!(f, "full"),
            Self::Expired => write!(f, "expired"),
            Self::Error => write!(f, "error"),
            Self::Banned => write!(f, "banned"),
        }
    }
}

impl std::str::FromStr for TeamStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "full" => Ok(Self::Full),
            "expired" => Ok(Self::Expired),
            "error" => Ok(Self::Error),
            "banned" => Ok(Self::Banned),
            other => Err(format!("Unknown team status '{}'", other)),
        }
    }
}

/// Encrypted upstream credentials of a team
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamCredentials {
    pub access_token: EncryptedSecret,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<EncryptedSecret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<EncryptedSecret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<EncryptedSecret>,
}

/// Subscription metadata reported by the upstream account lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionInfo {
    pub account_id: String,
    pub team_name: String,
    pub plan_type: String,
    pub subscription_plan: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Data required to create a team; the repository assigns the id
#[derive(Debug, Clone)]
pub struct TeamDraft {
    pub email: String,
    pub credentials: TeamCredentials,
    pub subscription: SubscriptionInfo,
    pub current_members: u32,
    pub max_members: u32,
}

impl TeamDraft {
    pub fn new(
        email: impl Into<String>,
        credentials: TeamCredentials,
        subscription: SubscriptionInfo,
    ) -> Self {
        Self {
            email: email.into(),
            credentials,
            subscription,
            current_members: 0,
            max_members: DEFAULT_MAX_MEMBERS,
        }
    }

    pub fn with_members(mut self, current_members: u32) -> Self {
        self.current_members = current_members;
        self
    }

    pub fn with_max_members(mut self, max_members: u32) -> Self {
        self.max_members = max_members;
        self
    }
}

/// Team entity - one managed upstream seat holder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    id: TeamId,
    email: String,
    account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    team_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subscription_plan: Option<String>,
    credentials: TeamCredentials,
    current_members: u32,
    max_members: u32,
    status: TeamStatus,
    error_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_sync: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Team {
    /// Materialize a draft under the given id
    pub fn from_draft(id: TeamId, draft: TeamDraft) -> Self {
        let now = Utc::now();
        let subscription = draft.subscription;

        let mut team = Self {
            id,
            email: draft.email,
            account_id: subscription.account_id,
            team_name: non_empty(subscription.team_name),
            plan_type: non_empty(subscription.plan_type),
            subscription_plan: non_empty(subscription.subscription_plan),
            credentials: draft.credentials,
            current_members: draft.current_members,
            max_members: draft.max_members,
            status: TeamStatus::Active,
            error_count: 0,
            expires_at: subscription.expires_at,
            last_sync: Some(now),
            created_at: now,
        };
        team.recompute_status(now);
        team
    }

    // Getters

    pub fn id(&self) -> TeamId {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn team_name(&self) -> Option<&str> {
        self.team_name.as_deref()
    }

    pub fn plan_type(&self) -> Option<&str> {
        self.plan_type.as_deref()
    }

    pub fn subscription_plan(&self) -> Option<&str> {
        self.subscription_plan.as_deref()
    }

    pub fn credentials(&self) -> &TeamCredentials {
        &self.credentials
    }

    pub fn current_members(&self) -> u32 {
        self.current_members
    }

    pub fn max_members(&self) -> u32 {
        self.max_members
    }

    pub fn available_seats(&self) -> u32 {
        self.max_members.saturating_sub(self.current_members)
    }

    pub fn status(&self) -> TeamStatus {
        self.status
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the upstream subscription expiry has passed
    pub fn is_subscription_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    /// Display label used in messages
    pub fn label(&self) -> String {
        self.team_name
            .clone()
            .unwrap_or_else(|| format!("team {}", self.id))
    }

    // Lifecycle

    /// Re-derive active/full/expired from membership and expiry.
    ///
    /// Error and banned are left untouched.
    pub fn recompute_status(&mut self, now: DateTime<Utc>) {
        if self.status.is_capacity_driven() {
            self.status = capacity_status(
                self.current_members,
                self.max_members,
                self.expires_at,
                now,
            );
        }
    }

    /// Reset the failure counter after a successful upstream operation
    pub fn record_success(&mut self) {
        self.error_count = 0;

        if self.status == TeamStatus::Error {
            self.status = TeamStatus::Active;
        }
    }

    /// Count a non-fatal failure, moving to error once the threshold is reached.
    ///
    /// Returns true when this failure moved the team into error.
    pub fn record_failure(&mut self, threshold: u32) -> bool {
        if self.status == TeamStatus::Banned {
            return false;
        }

        self.error_count = self.error_count.saturating_add(1);

        if self.error_count >= threshold && self.status != TeamStatus::Error {
            self.status = TeamStatus::Error;
            return true;
        }

        false
    }

    pub fn mark_banned(&mut self) {
        self.status = TeamStatus::Banned;
    }

    /// Move to error without a threshold; a banned team stays banned
    pub fn mark_error(&mut self) {
        if self.status != TeamStatus::Banned {
            self.status = TeamStatus::Error;
        }
    }

    /// Administrative override; the only way out of banned
    pub fn override_status(&mut self, status: TeamStatus) {
        self.status = status;

        if status != TeamStatus::Error {
            self.error_count = 0;
        }
    }

    // Membership

    pub fn member_added(&mut self, now: DateTime<Utc>) {
        self.current_members = self.current_members.saturating_add(1);
        self.recompute_status(now);
    }

    pub fn member_removed(&mut self, now: DateTime<Utc>) {
        self.current_members = self.current_members.saturating_sub(1);
        self.recompute_status(now);
    }

    pub fn set_max_members(&mut self, max_members: u32, now: DateTime<Utc>) {
        self.max_members = max_members;
        self.recompute_status(now);
    }

    /// Apply the result of a full sync and recompute status
    pub fn apply_sync(
        &mut self,
        subscription: SubscriptionInfo,
        current_members: u32,
        now: DateTime<Utc>,
    ) {
        self.account_id = subscription.account_id;
        self.team_name = non_empty(subscription.team_name);
        self.plan_type = non_empty(subscription.plan_type);
        self.subscription_plan = non_empty(subscription.subscription_plan);
        self.expires_at = subscription.expires_at;
        self.current_members = current_members;
        self.last_sync = Some(now);
        self.record_success();
        self.recompute_status(now);
    }

    // Credentials and identity

    pub fn replace_access_token(&mut self, token: EncryptedSecret) {
        self.credentials.access_token = token;
    }

    pub fn replace_refresh_token(&mut self, token: EncryptedSecret) {
        self.credentials.refresh_token = Some(token);
    }

    pub fn replace_session_token(&mut self, token: EncryptedSecret) {
        self.credentials.session_token = Some(token);
    }

    pub fn replace_client_id(&mut self, client_id: EncryptedSecret) {
        self.credentials.client_id = Some(client_id);
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = email.into();
    }

    pub fn set_account_id(&mut self, account_id: impl Into<String>) {
        self.account_id = account_id.into();
    }
}

/// Tenant visible to a team's credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamAccount {
    pub team_id: TeamId,
    pub account_id: String,
    pub account_name: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl TeamAccount {
    pub fn new(
        team_id: TeamId,
        account_id: impl Into<String>,
        account_name: impl Into<String>,
        is_primary: bool,
    ) -> Self {
        Self {
            team_id,
            account_id: account_id.into(),
            account_name: account_name.into(),
            is_primary,
            created_at: Utc::now(),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn credentials() -> TeamCredentials {
        TeamCredentials {
            access_token: EncryptedSecret::new("at"),
            refresh_token: None,
            session_token: None,
            client_id: None,
        }
    }

    pub fn subscription(account_id: &str) -> SubscriptionInfo {
        SubscriptionInfo {
            account_id: account_id.to_string(),
            team_name: format!("Team {}", account_id),
            plan_type: "team".to_string(),
            subscription_plan: "chatgptteamplan".to_string(),
            expires_at: Some(Utc::now() + chrono::Duration::days(30)),
        }
    }

    pub fn team(id: u64, current_members: u32) -> Team {
        let draft = TeamDraft::new("owner@example.com", credentials(), subscription("acc-1"))
            .with_members(current_members);
        Team::from_draft(TeamId::new(id), draft)
    }
}
