//! Upstream provider endpoints

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::info;

use super::client::ExternalApiClient;
use crate::domain::upstream::{
    ApiFailure, Invite, Listing, Member, RefreshedTokens, TeamAccountInfo, UpstreamApi,
    TEAM_PLAN_TYPE,
};

pub const DEFAULT_BASE_URL: &str = "https://chatgpt.com/backend-api";
pub const DEFAULT_SESSION_REFRESH_URL: &str = "https://chatgpt.com/api/auth/session";
pub const DEFAULT_OAUTH_TOKEN_URL: &str = "https://auth.openai.com/oauth/token";

const ACCOUNT_HEADER: &str = "chatgpt-account-id";
const SESSION_COOKIE: &str = "__Secure-next-auth.session-token";
const MEMBER_PAGE_SIZE: u32 = 50;
const INVITE_ROLE: &str = "standard-user";

/// Endpoint locations of the provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEndpoints {
    pub base_url: String,
    pub session_refresh_url: String,
    pub oauth_token_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_refresh_url: DEFAULT_SESSION_REFRESH_URL.to_string(),
            oauth_token_url: DEFAULT_OAUTH_TOKEN_URL.to_string(),
        }
    }
}

/// [`UpstreamApi`] over HTTP
#[derive(Debug, Clone)]
pub struct ProviderApi {
    client: ExternalApiClient,
    endpoints: ProviderEndpoints,
}

#[derive(serde::Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    total: u32,
}

impl ProviderApi {
    pub fn new(client: ExternalApiClient, endpoints: ProviderEndpoints) -> Self {
        Self { client, endpoints }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoints.base_url.trim_end_matches('/'), path)
    }

    fn headers(access_token: &str, account_id: Option<&str>) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Authorization".to_string(), format!("Bearer {}", access_token)),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];

        if let Some(account_id) = account_id {
            headers.push((ACCOUNT_HEADER.to_string(), account_id.to_string()));
        }

        headers
    }

    fn parse<T: DeserializeOwned>(data: Value, what: &str) -> Result<T, ApiFailure> {
        serde_json::from_value(data)
            .map_err(|e| ApiFailure::new(200, format!("Unexpected {} response: {}", what, e)))
    }

    fn parse_tokens(data: &Value, access_key: &str) -> Result<RefreshedTokens, ApiFailure> {
        let access_token = data
            .get(access_key)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiFailure::new(200, "Refresh response carried no access token"))?;

        let refresh_token = data
            .get("refresh_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(RefreshedTokens {
            access_token: access_token.to_string(),
            refresh_token,
        })
    }
}

fn parse_account(account_id: &str, entry: &Value) -> Option<TeamAccountInfo> {
    let account = entry.get("account")?;
    let plan_type = account.get("plan_type").and_then(Value::as_str)?;

    if plan_type != TEAM_PLAN_TYPE {
        return None;
    }

    let entitlement = entry.get("entitlement").cloned().unwrap_or_default();
    let text = |value: &Value, key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let expires_at = entitlement
        .get("expires_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|at| at.with_timezone(&Utc));

    Some(TeamAccountInfo {
        account_id: account_id.to_string(),
        name: text(account, "name"),
        plan_type: plan_type.to_string(),
        subscription_plan: text(&entitlement, "subscription_plan"),
        expires_at,
        has_active_subscription: entitlement
            .get("has_active_subscription")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

#[async_trait]
impl UpstreamApi for ProviderApi {
    async fn account_info(&self, access_token: &str) -> Result<Vec<TeamAccountInfo>, ApiFailure> {
        let response = self
            .client
            .get(&self.url("/accounts/check/v4-2023-04-27"), Self::headers(access_token, None))
            .await?;

        let accounts: Vec<TeamAccountInfo> = response
            .data
            .get("accounts")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(id, entry)| parse_account(id, entry))
                    .collect()
            })
            .unwrap_or_default();

        info!(count = accounts.len(), "Fetched team accounts");
        Ok(accounts)
    }

    async fn list_members(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Listing<Member>, ApiFailure> {
        let mut members = Vec::new();
        let mut offset = 0;

        loop {
            let url = self.url(&format!(
                "/accounts/{}/users?limit={}&offset={}",
                account_id, MEMBER_PAGE_SIZE, offset
            ));
            let response = self
                .client
                .get(&url, Self::headers(access_token, Some(account_id)))
                .await?;
            let page: Page<Member> = Self::parse(response.data, "member list")?;

            let received = page.items.len();
            members.extend(page.items);

            if received == 0 || members.len() >= page.total as usize {
                break;
            }
            offset += MEMBER_PAGE_SIZE;
        }

        let total = members.len() as u32;
        Ok(Listing::new(members, total))
    }

    async fn list_invites(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Listing<Invite>, ApiFailure> {
        let response = self
            .client
            .get(
                &self.url(&format!("/accounts/{}/invites", account_id)),
                Self::headers(access_token, Some(account_id)),
            )
            .await?;
        let page: Page<Invite> = Self::parse(response.data, "invite list")?;

        Ok(Listing::new(page.items, page.total))
    }

    async fn send_invite(
        &self,
        access_token: &str,
        account_id: &str,
        email: &str,
    ) -> Result<(), ApiFailure> {
        let body = json!({
            "email_addresses": [email],
            "role": INVITE_ROLE,
            "resend_emails": true,
        });

        self.client
            .post(
                &self.url(&format!("/accounts/{}/invites", account_id)),
                Self::headers(access_token, Some(account_id)),
                body,
            )
            .await
            .map(|_| ())
            .map_err(|failure| {
                failure
                    .describe_status(409, "User is already a member of this team")
                    .describe_status(422, "Team is full or the email address is invalid")
            })
    }

    async fn delete_invite(
        &self,
        access_token: &str,
        account_id: &str,
        email: &str,
    ) -> Result<(), ApiFailure> {
        self.client
            .delete(
                &self.url(&format!("/accounts/{}/invites", account_id)),
                Self::headers(access_token, Some(account_id)),
                Some(json!({ "email_address": email })),
            )
            .await
            .map(|_| ())
    }

    async fn delete_member(
        &self,
        access_token: &str,
        account_id: &str,
        user_id: &str,
    ) -> Result<(), ApiFailure> {
        self.client
            .delete(
                &self.url(&format!("/accounts/{}/users/{}", account_id, user_id)),
                Self::headers(access_token, Some(account_id)),
                None,
            )
            .await
            .map(|_| ())
            .map_err(|failure| {
                failure
                    .describe_status(403, "Cannot remove the team owner")
                    .describe_status(404, "User not found")
            })
    }

    async fn refresh_with_session_token(
        &self,
        session_token: &str,
    ) -> Result<RefreshedTokens, ApiFailure> {
        let headers = vec![(
            "Cookie".to_string(),
            format!("{}={}", SESSION_COOKIE, session_token),
        )];
        let response = self
            .client
            .get(&self.endpoints.session_refresh_url, headers)
            .await?;

        Self::parse_tokens(&response.data, "accessToken")
    }

    async fn refresh_with_refresh_token(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> Result<RefreshedTokens, ApiFailure> {
        let body = json!({
            "grant_type": "refresh_token",
            "client_id": client_id,
            "refresh_token": refresh_token,
        });
        let headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        let response = self
            .client
            .post(&self.endpoints.oauth_token_url, headers, body)
            .await?;

        Self::parse_tokens(&response.data, "access_token")
    }
}
