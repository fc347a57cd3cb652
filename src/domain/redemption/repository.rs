//! Redemption repository trait

use async_trait::async_trait;

use super::entity::{RedemptionCode, RedemptionRecord};
use crate::domain::team::TeamId;
use crate::domain::DomainError;

/// Filter for listing redemption records; string filters match substrings
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub email: Option<String>,
    pub code: Option<String>,
    pub team_id: Option<TeamId>,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_team(mut self, team_id: TeamId) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub fn matches(&self, record: &RedemptionRecord) -> bool {
        let contains = |haystack: &str, needle: &Option<String>| {
            needle
                .as_ref()
                .is_none_or(|n| haystack.to_lowercase().contains(&n.to_lowercase()))
        };

        contains(&record.email, &self.email)
            && contains(&record.code, &self.code)
            && self.team_id.is_none_or(|id| record.team_id == id)
    }
}

/// Repository for redemption codes and their append-only usage ledger
#[async_trait]
pub trait RedemptionRepository: Send + Sync + std::fmt::Debug {
    /// Get a code by its value
    async fn get_code(&self, code: &str) -> Result<Option<RedemptionCode>, DomainError>;

    /// Check whether a code value is taken
    async fn code_exists(&self, code: &str) -> Result<bool, DomainError> {
        Ok(self.get_code(code).await?.is_some())
    }

    /// Insert codes all-or-nothing; any duplicate rejects the whole batch
    async fn insert_codes(&self, codes: Vec<RedemptionCode>) -> Result<(), DomainError>;

    /// Update an existing code
    async fn update_code(&self, code: &RedemptionCode) -> Result<RedemptionCode, DomainError>;

    /// Persist a consumed code and its record in one atomic step.
    ///
    /// Fails without writing anything when the stored code is no longer
    /// redeemable, so concurrent consumers cannot both succeed.
    async fn consume(
        &self,
        code: &RedemptionCode,
        record: RedemptionRecord,
    ) -> Result<(), DomainError>;

    /// Delete a code together with its records
    async fn delete_code(&self, code: &str) -> Result<bool, DomainError>;

    /// List codes, newest first
    async fn list_codes(&self) -> Result<Vec<RedemptionCode>, DomainError>;

    /// List records matching a query, newest first
    async fn list_records(&self, query: &RecordQuery) -> Result<Vec<RedemptionRecord>, DomainError>;

    /// Records with an exact email, newest first
    async fn records_for_email(&self, email: &str) -> Result<Vec<RedemptionRecord>, DomainError>;

    /// Records with an exact code, newest first
    async fn records_for_code(&self, code: &str) -> Result<Vec<RedemptionRecord>, DomainError>;
}
