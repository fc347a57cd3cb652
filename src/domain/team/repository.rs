//! Team repository trait

use async_trait::async_trait;

use super::entity::{Team, TeamAccount, TeamDraft, TeamId, TeamStatus};
use crate::domain::DomainError;

/// Query parameters for listing teams
#[derive(Debug, Clone, Default)]
pub struct TeamQuery {
    /// Filter by status
    pub status: Option<TeamStatus>,
    /// Only teams with at least one free seat
    pub with_free_seats: bool,
}

impl TeamQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: TeamStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_free_seats(mut self) -> Self {
        self.with_free_seats = true;
        self
    }

    pub fn matches(&self, team: &Team) -> bool {
        if let Some(status) = self.status {
            if team.status() != status {
                return false;
            }
        }

        if self.with_free_seats && team.available_seats() == 0 {
            return false;
        }

        true
    }
}

/// Repository for managing teams and their tenant associations
#[async_trait]
pub trait TeamRepository: Send + Sync + std::fmt::Debug {
    /// Get a team by ID
    async fn get(&self, id: TeamId) -> Result<Option<Team>, DomainError>;

    /// Find the team bound to an upstream tenant
    async fn find_by_account_id(&self, account_id: &str) -> Result<Option<Team>, DomainError>;

    /// Create a team together with its tenant associations
    async fn create(
        &self,
        draft: TeamDraft,
        accounts: Vec<(String, String)>,
    ) -> Result<Team, DomainError>;

    /// Update an existing team
    async fn update(&self, team: &Team) -> Result<Team, DomainError>;

    /// Delete a team, its tenant associations and its redemption records
    async fn delete(&self, id: TeamId) -> Result<bool, DomainError>;

    /// List teams ordered by id
    async fn list(&self, query: &TeamQuery) -> Result<Vec<Team>, DomainError>;

    /// Tenant associations of a team
    async fn accounts(&self, id: TeamId) -> Result<Vec<TeamAccount>, DomainError>;

    /// Mark one tenant association as primary and clear the others
    async fn set_primary_account(&self, id: TeamId, account_id: &str) -> Result<(), DomainError>;
}
