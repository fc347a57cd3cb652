//! In-memory storage implementation

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::domain::redemption::{RecordQuery, RedemptionCode, RedemptionRecord, RedemptionRepository};
use crate::domain::team::{Team, TeamAccount, TeamDraft, TeamId, TeamQuery, TeamRepository};
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct StoreState {
    last_team_id: u64,
    teams: BTreeMap<TeamId, Team>,
    accounts: Vec<TeamAccount>,
    codes: HashMap<String, RedemptionCode>,
    records: Vec<RedemptionRecord>,
}

/// Thread-safe in-memory store for teams, codes and the redemption ledger
///
/// All entities live under one lock, so multi-entity writes (code consumption,
/// cascading deletes) are atomic. Data is lost when the process terminates.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    /// Creates a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, DomainError> {
        self.state
            .read()
            .map_err(|e| DomainError::storage(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, DomainError> {
        self.state
            .write()
            .map_err(|e| DomainError::storage(format!("Failed to acquire write lock: {}", e)))
    }
}

/// Expects records in reverse insertion order so ties keep the latest append first
fn newest_first(records: &mut [RedemptionRecord]) {
    records.sort_by(|a, b| b.redeemed_at.cmp(&a.redeemed_at));
}

#[async_trait]
impl TeamRepository for InMemoryStore {
    async fn get(&self, id: TeamId) -> Result<Option<Team>, DomainError> {
        Ok(self.read()?.teams.get(&id).cloned())
    }

    async fn find_by_account_id(&self, account_id: &str) -> Result<Option<Team>, DomainError> {
        Ok(self
            .read()?
            .teams
            .values()
            .find(|team| team.account_id() == account_id)
            .cloned())
    }

    async fn create(
        &self,
        draft: TeamDraft,
        accounts: Vec<(String, String)>,
    ) -> Result<Team, DomainError> {
        let mut state = self.write()?;
        let account_id = draft.subscription.account_id.clone();

        if state.teams.values().any(|team| team.account_id() == account_id) {
            return Err(DomainError::conflict(format!(
                "Team for account '{}' already exists",
                account_id
            )));
        }

        state.last_team_id += 1;
        let id = TeamId::new(state.last_team_id);
        let team = Team::from_draft(id, draft);

        let mut seen = Vec::new();
        for (tenant_id, name) in accounts {
            if seen.contains(&tenant_id) {
                continue;
            }
            let is_primary = tenant_id == account_id;
            state
                .accounts
                .push(TeamAccount::new(id, tenant_id.clone(), name, is_primary));
            seen.push(tenant_id);
        }

        state.teams.insert(id, team.clone());
        Ok(team)
    }

    async fn update(&self, team: &Team) -> Result<Team, DomainError> {
        let mut state = self.write()?;

        match state.teams.get_mut(&team.id()) {
            Some(stored) => {
                *stored = team.clone();
                Ok(team.clone())
            }
            None => Err(DomainError::not_found(format!("Team {} not found", team.id()))),
        }
    }

    async fn delete(&self, id: TeamId) -> Result<bool, DomainError> {
        let mut state = self.write()?;

        if state.teams.remove(&id).is_none() {
            return Ok(false);
        }

        state.accounts.retain(|account| account.team_id != id);
        state.records.retain(|record| record.team_id != id);
        Ok(true)
    }

    async fn list(&self, query: &TeamQuery) -> Result<Vec<Team>, DomainError> {
        Ok(self
            .read()?
            .teams
            .values()
            .filter(|team| query.matches(team))
            .cloned()
            .collect())
    }

    async fn accounts(&self, id: TeamId) -> Result<Vec<TeamAccount>, DomainError> {
        Ok(self
            .read()?
            .accounts
            .iter()
            .filter(|account| account.team_id == id)
            .cloned()
            .collect())
    }

    async fn set_primary_account(&self, id: TeamId, account_id: &str) -> Result<(), DomainError> {
        let mut state = self.write()?;

        for account in state.accounts.iter_mut().filter(|a| a.team_id == id) {
            account.is_primary = account.account_id == account_id;
        }

        Ok(())
    }
}

#[async_trait]
impl RedemptionRepository for InMemoryStore {
    async fn get_code(&self, code: &str) -> Result<Option<RedemptionCode>, DomainError> {
        Ok(self.read()?.codes.get(code).cloned())
    }

    async fn insert_codes(&self, codes: Vec<RedemptionCode>) -> Result<(), DomainError> {
        let mut state = self.write()?;

        let mut batch = std::collections::HashSet::new();
        for code in &codes {
            if state.codes.contains_key(code.code()) || !batch.insert(code.code()) {
                return Err(DomainError::conflict(format!(
                    "Redemption code '{}' already exists",
                    code.code()
                )));
            }
        }

        for code in codes {
            state.codes.insert(code.code().to_string(), code);
        }

        Ok(())
    }

    async fn update_code(&self, code: &RedemptionCode) -> Result<RedemptionCode, DomainError> {
        let mut state = self.write()?;

        match state.codes.get_mut(code.code()) {
            Some(stored) => {
                *stored = code.clone();
                Ok(code.clone())
            }
            None => Err(DomainError::not_found(format!(
                "Redemption code '{}' not found",
                code.code()
            ))),
        }
    }

    async fn consume(
        &self,
        code: &RedemptionCode,
        record: RedemptionRecord,
    ) -> Result<(), DomainError> {
        let mut state = self.write()?;

        let stored = state.codes.get_mut(code.code()).ok_or_else(|| {
            DomainError::not_found(format!("Redemption code '{}' not found", code.code()))
        })?;

        if !stored.status().is_redeemable() {
            return Err(DomainError::conflict(format!(
                "Redemption code is not unused: {}",
                stored.status()
            )));
        }

        *stored = code.clone();
        state.records.push(record);
        Ok(())
    }

    async fn delete_code(&self, code: &str) -> Result<bool, DomainError> {
        let mut state = self.write()?;

        if state.codes.remove(code).is_none() {
            return Ok(false);
        }

        state.records.retain(|record| record.code != code);
        Ok(true)
    }

    async fn list_codes(&self) -> Result<Vec<RedemptionCode>, DomainError> {
        let mut codes: Vec<RedemptionCode> = self.read()?.codes.values().cloned().collect();
        codes.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.code().cmp(b.code()))
        });
        Ok(codes)
    }

    async fn list_records(&self, query: &RecordQuery) -> Result<Vec<RedemptionRecord>, DomainError> {
        let mut records: Vec<RedemptionRecord> = self
            .read()?
            .records
            .iter()
            .rev()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn records_for_email(&self, email: &str) -> Result<Vec<RedemptionRecord>, DomainError> {
        let mut records: Vec<RedemptionRecord> = self
            .read()?
            .records
            .iter()
            .rev()
            .filter(|record| record.email == email)
            .cloned()
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn records_for_code(&self, code: &str) -> Result<Vec<RedemptionRecord>, DomainError> {
        let mut records: Vec<RedemptionRecord> = self
            .read()?
            .records
            .iter()
            .rev()
            .filter(|record| record.code == code)
            .cloned()
            .collect();
        newest_first(&mut records);
        Ok(records)
    }
}
