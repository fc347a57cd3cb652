//! Domain layer - Core business logic and entities

pub mod credentials;
pub mod error;
pub mod redemption;
pub mod team;
pub mod upstream;

pub use credentials::{CredentialVault, EncryptedSecret};
pub use error::DomainError;
pub use redemption::{
    CodeCheck, CodeStatus, InvalidCodeReason, RecordQuery, RedemptionCode, RedemptionRecord,
    RedemptionRepository,
};
pub use team::{
    SubscriptionInfo, Team, TeamAccount, TeamCredentials, TeamDraft, TeamId, TeamQuery,
    TeamRepository, TeamStatus,
};
pub use upstream::{classify, ApiFailure, ApiResult, ApiSuccess, FailureKind, UpstreamApi};
