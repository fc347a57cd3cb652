//! End-user redeem flow: code check, warranty reuse, seat allocation and consumption

use serde::Serialize;
use tracing::{info, warn};

use super::service::RedemptionService;
use crate::domain::redemption::{
    validate_email, CodeCheck, CodeStatus, InvalidCodeReason, RedemptionRecord,
};
use crate::domain::team::TeamId;
use crate::domain::DomainError;
use crate::infrastructure::team::TeamService;
use crate::infrastructure::warranty::WarrantyService;

/// Result of a successful redemption
#[derive(Debug, Clone, Serialize)]
pub struct RedeemOutcome {
    pub record: RedemptionRecord,
    pub team_name: Option<String>,
    /// The code was consumed again under its warranty
    pub warranty_reuse: bool,
}

/// Orchestrates a redemption across codes, warranty rules and teams
#[derive(Debug, Clone)]
pub struct RedeemService {
    codes: RedemptionService,
    teams: TeamService,
    warranty: WarrantyService,
}

impl RedeemService {
    pub fn new(codes: RedemptionService, teams: TeamService, warranty: WarrantyService) -> Self {
        Self {
            codes,
            teams,
            warranty,
        }
    }

    /// Redeem `code` for `email`, on `team_id` when given, else on the team with most free seats.
    ///
    /// The invite is sent before the code is consumed; when consumption fails
    /// afterwards the seat stays taken upstream and the error is returned as-is.
    pub async fn redeem(
        &self,
        code: &str,
        email: &str,
        team_id: Option<TeamId>,
    ) -> Result<RedeemOutcome, DomainError> {
        validate_email(email)?;

        let warranty_reuse = match self.codes.validate_code(code).await? {
            CodeCheck::Valid(stored) => stored.status() == CodeStatus::WarrantyActive,
            CodeCheck::Invalid(InvalidCodeReason::AlreadyUsed) => {
                self.approve_reuse(code, email).await?;
                true
            }
            CodeCheck::Invalid(InvalidCodeReason::NotFound) => {
                return Err(DomainError::not_found(InvalidCodeReason::NotFound.to_string()))
            }
            CodeCheck::Invalid(reason) => return Err(DomainError::validation(reason.to_string())),
        };

        let team_id = match team_id {
            Some(id) => id,
            None => self.pick_team().await?,
        };

        let team = self.teams.add_member(team_id, email).await?;

        let record = match self
            .codes
            .use_code(code, email, team.id(), team.account_id())
            .await
        {
            Ok(record) => record,
            Err(e) => {
                warn!(code = %code, team_id = %team.id(), error = %e, "Invite sent but code consumption failed");
                return Err(e);
            }
        };

        info!(code = %code, team_id = %team.id(), warranty_reuse, "Code redeemed");
        Ok(RedeemOutcome {
            record,
            team_name: team.team_name().map(str::to_string),
            warranty_reuse,
        })
    }

    /// Flip a used warranty code back to redeemable when the rules allow it
    async fn approve_reuse(&self, code: &str, email: &str) -> Result<(), DomainError> {
        let stored = self
            .codes
            .get_code(code)
            .await?
            .ok_or_else(|| DomainError::not_found(InvalidCodeReason::NotFound.to_string()))?;

        if !stored.has_warranty() {
            return Err(DomainError::conflict(InvalidCodeReason::AlreadyUsed.to_string()));
        }

        let decision = self.warranty.validate_warranty_reuse(code, email).await?;
        if !decision.can_reuse || !decision.prior_use {
            return Err(DomainError::conflict(format!(
                "{}: {}",
                InvalidCodeReason::AlreadyUsed,
                decision.reason
            )));
        }

        self.codes.activate_warranty(code).await?;
        Ok(())
    }

    async fn pick_team(&self) -> Result<TeamId, DomainError> {
        self.teams
            .available_teams()
            .await?
            .into_iter()
            .max_by_key(|team| team.max_members.saturating_sub(team.current_members))
            .map(|team| team.id)
            .ok_or_else(|| DomainError::conflict("No active team has a free seat"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credentials::CredentialVault;
    use crate::domain::redemption::RedemptionRepository;
    use crate::domain::team::{Team, TeamCredentials, TeamDraft, TeamRepository};
    use crate::domain::upstream::mock::{account, MockUpstreamApi};
    use crate::infrastructure::auth::fixtures::valid_token;
    use crate::infrastructure::redemption::CodeOptions;
    use crate::infrastructure::storage::InMemoryStore;
    use crate::infrastructure::team::TeamSettings;
    use crate::infrastructure::vault::AesGcmVault;
    use crate::infrastructure::warranty::QueryRateLimiter;
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryStore>,
        upstream: Arc<MockUpstreamApi>,
        codes: RedemptionService,
        redeem: RedeemService,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let upstream = Arc::new(MockUpstreamApi::new());
        let vault = Arc::new(AesGcmVault::from_secret("test-key").unwrap());
        let teams = TeamService::new(store.clone(), upstream.clone(), vault, TeamSettings::default());
        let codes = RedemptionService::new(store.clone());
        let warranty = WarrantyService::new(
            store.clone(),
            teams.clone(),
            Arc::new(QueryRateLimiter::new(Duration::ZERO, 16)),
        );

        Harness {
            redeem: RedeemService::new(codes.clone(), teams, warranty),
            store,
            upstream,
            codes,
        }
    }

    async fn team(h: &Harness, account_id: &str, members: u32) -> Team {
        let vault = AesGcmVault::from_secret("test-key").unwrap();
        let credentials = TeamCredentials {
            access_token: vault.encrypt(&valid_token("owner@x.com")).unwrap(),
            refresh_token: None,
            session_token: None,
            client_id: None,
        };
        h.store
            .create(
                TeamDraft::new("owner@x.com", credentials, account(account_id).subscription())
                    .with_members(members),
                vec![],
            )
            .await
            .unwrap()
    }

    fn warranty() -> CodeOptions {
        CodeOptions {
            has_warranty: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_redeem_picks_team_with_most_free_seats() {
        let h = harness();
        team(&h, "acc-1", 4).await;
        let roomy = team(&h, "acc-2", 1).await;
        let code = h.codes.generate_code(None, &CodeOptions::default()).await.unwrap();

        let outcome = h.redeem.redeem(code.code(), "user@x.com", None).await.unwrap();

        assert_eq!(outcome.record.team_id, roomy.id());
        assert!(!outcome.warranty_reuse);
        let stored = h.store.get(roomy.id()).await.unwrap().unwrap();
        assert_eq!(stored.current_members(), 2);
        assert_eq!(h.upstream.calls("send_invite"), 1);
    }

    #[tokio::test]
    async fn test_redeem_used_code_without_warranty_fails() {
        let h = harness();
        let target = team(&h, "acc-1", 0).await;
        let code = h.codes.generate_code(None, &CodeOptions::default()).await.unwrap();
        h.redeem.redeem(code.code(), "user@x.com", Some(target.id())).await.unwrap();

        assert!(matches!(
            h.redeem.redeem(code.code(), "user@x.com", Some(target.id())).await,
            Err(DomainError::Conflict { .. })
        ));
        assert_eq!(h.upstream.calls("send_invite"), 1);
    }

    #[tokio::test]
    async fn test_redeem_warranty_reuse_after_ban() {
        let h = harness();
        let first = team(&h, "acc-1", 0).await;
        let second = team(&h, "acc-2", 0).await;
        let code = h.codes.generate_code(None, &warranty()).await.unwrap();
        h.redeem.redeem(code.code(), "user@x.com", Some(first.id())).await.unwrap();

        let mut banned = h.store.get(first.id()).await.unwrap().unwrap();
        banned.mark_banned();
        h.store.update(&banned).await.unwrap();

        let outcome = h.redeem.redeem(code.code(), "user@x.com", None).await.unwrap();

        assert!(outcome.warranty_reuse);
        assert_eq!(outcome.record.team_id, second.id());
        let stored = h.store.get_code(code.code()).await.unwrap().unwrap();
        assert_eq!(stored.status(), CodeStatus::Used);
        assert_eq!(h.store.records_for_code(code.code()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_redeem_approved_reuse_survives_failed_allocation() {
        let h = harness();
        let first = team(&h, "acc-1", 0).await;
        let code = h.codes.generate_code(None, &warranty()).await.unwrap();
        h.redeem.redeem(code.code(), "user@x.com", Some(first.id())).await.unwrap();
        let mut banned = h.store.get(first.id()).await.unwrap().unwrap();
        banned.mark_banned();
        h.store.update(&banned).await.unwrap();

        assert!(matches!(
            h.redeem.redeem(code.code(), "user@x.com", None).await,
            Err(DomainError::Conflict { .. })
        ));
        let stored = h.store.get_code(code.code()).await.unwrap().unwrap();
        assert_eq!(stored.status(), CodeStatus::WarrantyActive);

        let second = team(&h, "acc-2", 0).await;
        let outcome = h.redeem.redeem(code.code(), "user@x.com", None).await.unwrap();

        assert!(outcome.warranty_reuse);
        assert_eq!(outcome.record.team_id, second.id());
    }

    #[tokio::test]
    async fn test_redeem_warranty_refused_for_other_email() {
        let h = harness();
        let first = team(&h, "acc-1", 0).await;
        let code = h.codes.generate_code(None, &warranty()).await.unwrap();
        h.redeem.redeem(code.code(), "user@x.com", Some(first.id())).await.unwrap();
        let mut banned = h.store.get(first.id()).await.unwrap().unwrap();
        banned.mark_banned();
        h.store.update(&banned).await.unwrap();
        team(&h, "acc-2", 0).await;

        assert!(matches!(
            h.redeem.redeem(code.code(), "other@x.com", None).await,
            Err(DomainError::Conflict { .. })
        ));
        let stored = h.store.get_code(code.code()).await.unwrap().unwrap();
        assert_eq!(stored.status(), CodeStatus::Used);
    }

    #[tokio::test]
    async fn test_redeem_without_seats() {
        let h = harness();
        team(&h, "acc-1", 6).await;
        let code = h.codes.generate_code(None, &CodeOptions::default()).await.unwrap();

        assert!(matches!(
            h.redeem.redeem(code.code(), "user@x.com", None).await,
            Err(DomainError::Conflict { .. })
        ));
        let stored = h.store.get_code(code.code()).await.unwrap().unwrap();
        assert_eq!(stored.status(), CodeStatus::Unused);
    }

    #[tokio::test]
    async fn test_redeem_unknown_code() {
        let h = harness();
        assert!(matches!(
            h.redeem.redeem("MISSING", "user@x.com", None).await,
            Err(DomainError::NotFound { .. })
        ));
    }
}
