//! Redemption code and record entities

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::team::TeamId;

/// Default warranty period for warranty-backed codes
pub const DEFAULT_WARRANTY_DAYS: u32 = 30;

/// Status of a redemption code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CodeStatus {
    #[default]
    Unused,
    Used,
    /// First-use deadline passed while unused
    Expired,
    /// Warranty reuse approved and awaiting consumption
    WarrantyActive,
}

impl CodeStatus {
    /// Whether a code in this status may be consumed
    pub fn is_redeemable(&self) -> bool {
        matches!(self, Self::Unused | Self::WarrantyActive)
    }
}

impl std::fmt::Display for CodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unused => write!(f, "unused"),
            Self::Used => write!(f, "used"),
            Self::Expired => write!(f, "expired"),
            Self::WarrantyActive => write!(f, "warranty_active"),
        }
    }
}

/// Single-use (or warranty-reusable) voucher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionCode {
    code: String,
    status: CodeStatus,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    used_by_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    used_team_id: Option<TeamId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    used_at: Option<DateTime<Utc>>,
    has_warranty: bool,
    warranty_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    warranty_expires_at: Option<DateTime<Utc>>,
}

impl RedemptionCode {
    /// Create an unused code
    pub fn new(code: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            code: code.into(),
            status: CodeStatus::Unused,
            created_at: Utc::now(),
            expires_at,
            used_by_email: None,
            used_team_id: None,
            used_at: None,
            has_warranty: false,
            warranty_days: DEFAULT_WARRANTY_DAYS,
            warranty_expires_at: None,
        }
    }

    /// Attach a warranty (builder pattern)
    pub fn with_warranty(mut self, warranty_days: u32) -> Self {
        self.has_warranty = true;
        self.warranty_days = warranty_days;
        self
    }

    // Getters

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn status(&self) -> CodeStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn used_by_email(&self) -> Option<&str> {
        self.used_by_email.as_deref()
    }

    pub fn used_team_id(&self) -> Option<TeamId> {
        self.used_team_id
    }

    pub fn used_at(&self) -> Option<DateTime<Utc>> {
        self.used_at
    }

    pub fn has_warranty(&self) -> bool {
        self.has_warranty
    }

    pub fn warranty_days(&self) -> u32 {
        self.warranty_days
    }

    pub fn warranty_expires_at(&self) -> Option<DateTime<Utc>> {
        self.warranty_expires_at
    }

    /// Unused and past its first-use deadline
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.status == CodeStatus::Unused && self.expires_at.is_some_and(|at| at < now)
    }

    /// Warranty window still open (an unset window counts as open)
    pub fn is_warranty_valid(&self, now: DateTime<Utc>) -> bool {
        self.warranty_expires_at.is_none_or(|at| at > now)
    }

    // Transitions

    pub fn expire(&mut self) {
        if self.status == CodeStatus::Unused {
            self.status = CodeStatus::Expired;
        }
    }

    /// Mark as used by `email` on `team_id`; opens the warranty window on first use
    pub fn consume(&mut self, email: impl Into<String>, team_id: TeamId, now: DateTime<Utc>) {
        self.status = CodeStatus::Used;
        self.used_by_email = Some(email.into());
        self.used_team_id = Some(team_id);
        self.used_at = Some(now);

        if self.has_warranty && self.warranty_expires_at.is_none() {
            self.warranty_expires_at = Some(now + Duration::days(i64::from(self.warranty_days)));
        }
    }

    /// Re-open a used warranty code for one more consumption
    pub fn activate_warranty(&mut self) -> bool {
        if self.has_warranty && self.status == CodeStatus::Used {
            self.status = CodeStatus::WarrantyActive;
            return true;
        }

        false
    }

    pub fn set_warranty(&mut self, has_warranty: Option<bool>, warranty_days: Option<u32>) {
        if let Some(has_warranty) = has_warranty {
            self.has_warranty = has_warranty;
        }

        if let Some(days) = warranty_days {
            self.warranty_days = days;
        }
    }
}

/// Why a code cannot be redeemed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidCodeReason {
    NotFound,
    AlreadyUsed,
    Expired,
    /// Flipped to expired by this check
    DeadlinePassed,
}

impl std::fmt::Display for InvalidCodeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "Redemption code not found"),
            Self::AlreadyUsed => write!(f, "Redemption code is not unused: already used"),
            Self::Expired => write!(f, "Redemption code is not unused: expired"),
            Self::DeadlinePassed => write!(f, "Redemption code passed its first-use deadline"),
        }
    }
}

/// Outcome of validating a code
#[derive(Debug, Clone, PartialEq)]
pub enum CodeCheck {
    Valid(RedemptionCode),
    Invalid(InvalidCodeReason),
}

impl CodeCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Append-only audit row written on each consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionRecord {
    pub id: Uuid,
    pub email: String,
    pub code: String,
    pub team_id: TeamId,
    pub account_id: String,
    pub redeemed_at: DateTime<Utc>,
}

impl RedemptionRecord {
    pub fn new(
        email: impl Into<String>,
        code: impl Into<String>,
        team_id: TeamId,
        account_id: impl Into<String>,
        redeemed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            code: code.into(),
            team_id,
            account_id: account_id.into(),
            redeemed_at,
        }
    }
}
