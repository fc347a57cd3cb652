use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use super::response::ApiFailure;
use crate::domain::team::SubscriptionInfo;

/// Plan type of the accounts managed as teams
pub const TEAM_PLAN_TYPE: &str = "team";

/// Team-plan tenant visible to an access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamAccountInfo {
    pub account_id: String,
    pub name: String,
    pub plan_type: String,
    pub subscription_plan: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub has_active_subscription: bool,
}

impl TeamAccountInfo {
    pub fn subscription(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            account_id: self.account_id.clone(),
            team_name: self.name.clone(),
            plan_type: self.plan_type.clone(),
            subscription_plan: self.subscription_plan.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Joined member of a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub created_time: Option<String>,
}

/// Pending invitation of a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invite {
    #[serde(rename = "email_address", default)]
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub created_time: Option<String>,
}

/// Items plus the total reported upstream
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: u32,
}

impl<T> Listing<T> {
    pub fn new(items: Vec<T>, total: u32) -> Self {
        Self { items, total }
    }
}

/// Tokens returned by a refresh grant
#[derive(Clone, PartialEq)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// Rotated refresh token, when the grant returned one
    pub refresh_token: Option<String>,
}

impl Debug for RefreshedTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Operations the upstream provider exposes for managing team tenants
#[async_trait]
pub trait UpstreamApi: Send + Sync + Debug {
    /// Team-plan accounts visible to the token
    async fn account_info(&self, access_token: &str) -> Result<Vec<TeamAccountInfo>, ApiFailure>;

    /// All joined members, following pagination
    async fn list_members(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Listing<Member>, ApiFailure>;

    async fn list_invites(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Listing<Invite>, ApiFailure>;

    async fn send_invite(
        &self,
        access_token: &str,
        account_id: &str,
        email: &str,
    ) -> Result<(), ApiFailure>;

    async fn delete_invite(
        &self,
        access_token: &str,
        account_id: &str,
        email: &str,
    ) -> Result<(), ApiFailure>;

    async fn delete_member(
        &self,
        access_token: &str,
        account_id: &str,
        user_id: &str,
    ) -> Result<(), ApiFailure>;

    /// Exchange a browser session token for a fresh access token
    async fn refresh_with_session_token(
        &self,
        session_token: &str,
    ) -> Result<RefreshedTokens, ApiFailure>;

    /// OAuth refresh-token grant
    async fn refresh_with_refresh_token(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> Result<RefreshedTokens, ApiFailure>;
}
