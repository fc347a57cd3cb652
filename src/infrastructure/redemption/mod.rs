//! Redemption infrastructure implementations

mod generator;
mod redeem;
mod service;

pub use generator::CodeGenerator;
pub use redeem::{RedeemOutcome, RedeemService};
pub use service::{CodeOptions, RedemptionService, MAX_BATCH_SIZE};
