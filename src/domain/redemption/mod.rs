//! Redemption domain module
//!
//! Codes are vouchers that hand out one seat on a team. Every consumption is
//! written to an append-only record ledger which the warranty rules read back.

mod entity;
mod repository;
mod validation;

pub use entity::{
    CodeCheck, CodeStatus, InvalidCodeReason, RedemptionCode, RedemptionRecord,
    DEFAULT_WARRANTY_DAYS,
};
pub use repository::{RecordQuery, RedemptionRepository};
pub use validation::{
    is_unambiguous, validate_code, validate_email, CodeValidationError, CODE_ALPHABET,
    MAX_CODE_LENGTH,
};
