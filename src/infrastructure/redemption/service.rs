//! Redemption code service
//!
//! Generation, validation and atomic consumption of redemption codes.

use chrono::{Duration, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::generator::CodeGenerator;
use crate::domain::redemption::{
    validate_code, validate_email, CodeCheck, CodeStatus, CodeValidationError, InvalidCodeReason,
    RecordQuery, RedemptionCode, RedemptionRecord, RedemptionRepository, DEFAULT_WARRANTY_DAYS,
};
use crate::domain::team::TeamId;
use crate::domain::DomainError;

/// Upper bound of codes generated in one batch
pub const MAX_BATCH_SIZE: usize = 1000;

/// Attempts at drawing a code that is not taken yet
const MAX_GENERATION_ATTEMPTS: usize = 10;

/// Options shared by single and batch generation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodeOptions {
    /// Days until the first-use deadline; none means no deadline
    #[serde(default)]
    pub expires_days: Option<u32>,
    #[serde(default)]
    pub has_warranty: bool,
    #[serde(default)]
    pub warranty_days: Option<u32>,
}

impl CodeOptions {
    fn build(&self, code: String) -> RedemptionCode {
        let expires_at = self
            .expires_days
            .map(|days| Utc::now() + Duration::days(i64::from(days)));
        let code = RedemptionCode::new(code, expires_at);

        if self.has_warranty {
            code.with_warranty(self.warranty_days.unwrap_or(DEFAULT_WARRANTY_DAYS))
        } else {
            code
        }
    }
}

/// Redemption code service
#[derive(Debug, Clone)]
pub struct RedemptionService {
    repository: Arc<dyn RedemptionRepository>,
    generator: CodeGenerator,
}

impl RedemptionService {
    pub fn new(repository: Arc<dyn RedemptionRepository>) -> Self {
        Self {
            repository,
            generator: CodeGenerator::default(),
        }
    }

    /// Create with a custom generator
    pub fn with_generator(mut self, generator: CodeGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Draw a code that is neither stored nor in `taken`
    async fn unique_code(&self, taken: &HashSet<String>) -> Result<String, DomainError> {
        for attempt in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = self.generator.generate();

            if !taken.contains(&candidate) && !self.repository.code_exists(&candidate).await? {
                return Ok(candidate);
            }

            debug!(attempt, "Generated code collided, drawing again");
        }

        Err(DomainError::internal(format!(
            "Could not generate a unique code in {} attempts",
            MAX_GENERATION_ATTEMPTS
        )))
    }

    /// Create one code, random unless `custom` is given
    pub async fn generate_code(
        &self,
        custom: Option<&str>,
        options: &CodeOptions,
    ) -> Result<RedemptionCode, DomainError> {
        let value = match custom.map(str::trim).filter(|c| !c.is_empty()) {
            Some(custom) => {
                validate_code(custom)?;
                if self.repository.code_exists(custom).await? {
                    return Err(DomainError::conflict(format!(
                        "Redemption code '{}' already exists",
                        custom
                    )));
                }
                custom.to_string()
            }
            None => self.unique_code(&HashSet::new()).await?,
        };

        let code = options.build(value);
        self.repository.insert_codes(vec![code.clone()]).await?;

        info!(code = %code.code(), warranty = code.has_warranty(), "Redemption code created");
        Ok(code)
    }

    /// Create `count` distinct random codes in one all-or-nothing insert
    pub async fn generate_batch(
        &self,
        count: usize,
        options: &CodeOptions,
    ) -> Result<Vec<RedemptionCode>, DomainError> {
        if count == 0 || count > MAX_BATCH_SIZE {
            return Err(CodeValidationError::InvalidBatchSize {
                got: count,
                max: MAX_BATCH_SIZE,
            }
            .into());
        }

        let mut taken = HashSet::with_capacity(count);
        let mut codes = Vec::with_capacity(count);

        for _ in 0..count {
            let value = self.unique_code(&taken).await?;
            taken.insert(value.clone());
            codes.push(options.build(value));
        }

        self.repository.insert_codes(codes.clone()).await?;

        info!(count, warranty = options.has_warranty, "Redemption codes created");
        Ok(codes)
    }

    /// Check whether a code can be redeemed; an unused code past its deadline is expired on read
    pub async fn validate_code(&self, code: &str) -> Result<CodeCheck, DomainError> {
        let Some(mut stored) = self.repository.get_code(code).await? else {
            return Ok(CodeCheck::Invalid(InvalidCodeReason::NotFound));
        };

        match stored.status() {
            CodeStatus::Used => return Ok(CodeCheck::Invalid(InvalidCodeReason::AlreadyUsed)),
            CodeStatus::Expired => return Ok(CodeCheck::Invalid(InvalidCodeReason::Expired)),
            CodeStatus::Unused | CodeStatus::WarrantyActive => {}
        }

        if stored.is_past_deadline(Utc::now()) {
            stored.expire();
            self.repository.update_code(&stored).await?;
            info!(code = %code, "Redemption code expired at first-use deadline");
            return Ok(CodeCheck::Invalid(InvalidCodeReason::DeadlinePassed));
        }

        Ok(CodeCheck::Valid(stored))
    }

    /// Consume a code for `email` on a team, appending the audit record atomically
    pub async fn use_code(
        &self,
        code: &str,
        email: &str,
        team_id: TeamId,
        account_id: &str,
    ) -> Result<RedemptionRecord, DomainError> {
        validate_email(email)?;

        let mut stored = match self.validate_code(code).await? {
            CodeCheck::Valid(stored) => stored,
            CodeCheck::Invalid(InvalidCodeReason::NotFound) => {
                return Err(DomainError::not_found(InvalidCodeReason::NotFound.to_string()))
            }
            CodeCheck::Invalid(reason) => return Err(DomainError::conflict(reason.to_string())),
        };

        let now = Utc::now();
        let reuse = stored.status() == CodeStatus::WarrantyActive;
        stored.consume(email, team_id, now);
        let record = RedemptionRecord::new(email, code, team_id, account_id, now);

        self.repository.consume(&stored, record.clone()).await?;

        info!(code = %code, team_id = %team_id, reuse, "Redemption code consumed");
        Ok(record)
    }

    /// Re-open a used warranty code for one more consumption
    pub async fn activate_warranty(&self, code: &str) -> Result<RedemptionCode, DomainError> {
        let mut stored = self.get_existing(code).await?;

        if !stored.activate_warranty() {
            warn!(code = %code, status = %stored.status(), "Warranty activation refused");
            return Err(DomainError::conflict(format!(
                "Redemption code '{}' cannot enter warranty reuse from status {}",
                code,
                stored.status()
            )));
        }

        let stored = self.repository.update_code(&stored).await?;
        info!(code = %code, "Warranty reuse activated");
        Ok(stored)
    }

    async fn get_existing(&self, code: &str) -> Result<RedemptionCode, DomainError> {
        self.repository
            .get_code(code)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Redemption code '{}' not found", code)))
    }

    pub async fn get_code(&self, code: &str) -> Result<Option<RedemptionCode>, DomainError> {
        self.repository.get_code(code).await
    }

    pub async fn list_codes(&self) -> Result<Vec<RedemptionCode>, DomainError> {
        self.repository.list_codes().await
    }

    pub async fn list_records(&self, query: &RecordQuery) -> Result<Vec<RedemptionRecord>, DomainError> {
        self.repository.list_records(query).await
    }

    /// Delete a code and its records
    pub async fn delete_code(&self, code: &str) -> Result<bool, DomainError> {
        let deleted = self.repository.delete_code(code).await?;
        if deleted {
            info!(code = %code, "Redemption code deleted");
        }
        Ok(deleted)
    }

    /// Change warranty settings of several codes; returns how many were updated
    pub async fn update_warranty(
        &self,
        codes: &[String],
        has_warranty: Option<bool>,
        warranty_days: Option<u32>,
    ) -> Result<usize, DomainError> {
        let mut updated = 0;

        for code in codes {
            let Some(mut stored) = self.repository.get_code(code).await? else {
                debug!(code = %code, "Skipping unknown code in warranty update");
                continue;
            };

            stored.set_warranty(has_warranty, warranty_days);
            self.repository.update_code(&stored).await?;
            updated += 1;
        }

        info!(updated, requested = codes.len(), "Warranty settings updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::redemption::is_unambiguous;
    use crate::infrastructure::storage::InMemoryStore;

    fn service() -> (Arc<InMemoryStore>, RedemptionService) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), RedemptionService::new(store))
    }

    #[tokio::test]
    async fn test_batch_of_five_unique_codes() {
        let (_, service) = service();

        let codes = service.generate_batch(5, &CodeOptions::default()).await.unwrap();

        let unique: HashSet<&str> = codes.iter().map(|c| c.code()).collect();
        assert_eq!(unique.len(), 5);
        for code in &codes {
            assert_eq!(code.code().len(), 19);
            assert_eq!(code.code().split('-').count(), 4);
            assert!(is_unambiguous(code.code()));
            assert_eq!(code.status(), CodeStatus::Unused);
        }
        assert_eq!(service.list_codes().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_batch_size_bounds() {
        let (_, service) = service();

        assert!(matches!(
            service.generate_batch(0, &CodeOptions::default()).await,
            Err(DomainError::Validation { .. })
        ));
        assert!(matches!(
            service.generate_batch(1001, &CodeOptions::default()).await,
            Err(DomainError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_custom_code_rejects_duplicates() {
        let (_, service) = service();
        let options = CodeOptions {
            has_warranty: true,
            ..Default::default()
        };

        let code = service.generate_code(Some("VIP-2024"), &options).await.unwrap();
        assert!(code.has_warranty());
        assert_eq!(code.warranty_days(), DEFAULT_WARRANTY_DAYS);

        assert!(matches!(
            service.generate_code(Some("VIP-2024"), &options).await,
            Err(DomainError::Conflict { .. })
        ));
        assert!(matches!(
            service.generate_code(Some("bad code!"), &options).await,
            Err(DomainError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_flips_past_deadline_to_expired() {
        let (store, service) = service();
        let past = Utc::now() - Duration::days(1);
        store
            .insert_codes(vec![RedemptionCode::new("ABCD-EFGH-IJKL-MNOP", Some(past))])
            .await
            .unwrap();

        let check = service.validate_code("ABCD-EFGH-IJKL-MNOP").await.unwrap();

        assert_eq!(check, CodeCheck::Invalid(InvalidCodeReason::DeadlinePassed));
        let stored = store.get_code("ABCD-EFGH-IJKL-MNOP").await.unwrap().unwrap();
        assert_eq!(stored.status(), CodeStatus::Expired);
        assert_eq!(
            service.validate_code("ABCD-EFGH-IJKL-MNOP").await.unwrap(),
            CodeCheck::Invalid(InvalidCodeReason::Expired)
        );
    }

    #[tokio::test]
    async fn test_validate_unknown_code() {
        let (_, service) = service();
        assert_eq!(
            service.validate_code("NOPE").await.unwrap(),
            CodeCheck::Invalid(InvalidCodeReason::NotFound)
        );
    }

    #[tokio::test]
    async fn test_use_code_succeeds_once() {
        let (store, service) = service();
        let code = service.generate_code(None, &CodeOptions::default()).await.unwrap();
        let team = TeamId::new(1);

        let record = service
            .use_code(code.code(), "user@x.com", team, "acc-1")
            .await
            .unwrap();
        assert_eq!(record.email, "user@x.com");

        let second = service.use_code(code.code(), "user@x.com", team, "acc-1").await;
        match second {
            Err(DomainError::Conflict { message }) => assert!(message.contains("not unused")),
            other => panic!("expected conflict, got {:?}", other),
        }

        let records = store.records_for_code(code.code()).await.unwrap();
        assert_eq!(records.len(), 1);
        let stored = store.get_code(code.code()).await.unwrap().unwrap();
        assert_eq!(stored.status(), CodeStatus::Used);
        assert_eq!(stored.used_by_email(), Some("user@x.com"));
        assert_eq!(stored.used_team_id(), Some(team));
    }

    #[tokio::test]
    async fn test_use_code_rejects_invalid_email() {
        let (store, service) = service();
        let code = service.generate_code(None, &CodeOptions::default()).await.unwrap();

        assert!(matches!(
            service.use_code(code.code(), "not-an-email", TeamId::new(1), "acc").await,
            Err(DomainError::Validation { .. })
        ));
        assert!(store.records_for_code(code.code()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_warranty_window_opens_on_first_use_only() {
        let (_, service) = service();
        let options = CodeOptions {
            has_warranty: true,
            warranty_days: Some(7),
            ..Default::default()
        };
        let code = service.generate_code(None, &options).await.unwrap();
        service
            .use_code(code.code(), "u@x.com", TeamId::new(1), "acc-1")
            .await
            .unwrap();
        let first = service.get_code(code.code()).await.unwrap().unwrap();
        let window = first.warranty_expires_at().unwrap();
        assert!(window > Utc::now() + Duration::days(6));

        let reopened = service.activate_warranty(code.code()).await.unwrap();
        assert_eq!(reopened.status(), CodeStatus::WarrantyActive);
        assert!(service.validate_code(code.code()).await.unwrap().is_valid());

        service
            .use_code(code.code(), "u@x.com", TeamId::new(2), "acc-2")
            .await
            .unwrap();
        let second = service.get_code(code.code()).await.unwrap().unwrap();
        assert_eq!(second.warranty_expires_at(), Some(window));
        assert_eq!(second.used_team_id(), Some(TeamId::new(2)));
    }

    #[tokio::test]
    async fn test_activate_warranty_requires_used_warranty_code() {
        let (_, service) = service();
        let plain = service.generate_code(None, &CodeOptions::default()).await.unwrap();

        assert!(matches!(
            service.activate_warranty(plain.code()).await,
            Err(DomainError::Conflict { .. })
        ));
        assert!(matches!(
            service.activate_warranty("MISSING").await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_warranty_in_bulk() {
        let (_, service) = service();
        let codes = service.generate_batch(3, &CodeOptions::default()).await.unwrap();
        let mut values: Vec<String> = codes.iter().map(|c| c.code().to_string()).collect();
        values.push("UNKNOWN".to_string());

        let updated = service
            .update_warranty(&values, Some(true), Some(90))
            .await
            .unwrap();

        assert_eq!(updated, 3);
        let stored = service.get_code(&values[0]).await.unwrap().unwrap();
        assert!(stored.has_warranty());
        assert_eq!(stored.warranty_days(), 90);
    }

    #[tokio::test]
    async fn test_delete_code_removes_records() {
        let (_, service) = service();
        let code = service.generate_code(None, &CodeOptions::default()).await.unwrap();
        service
            .use_code(code.code(), "u@x.com", TeamId::new(1), "acc-1")
            .await
            .unwrap();

        assert!(service.delete_code(code.code()).await.unwrap());
        assert!(service
            .list_records(&RecordQuery::new().with_code(code.code()))
            .await
            .unwrap()
            .is_empty());
        assert!(!service.delete_code(code.code()).await.unwrap());
    }
}
