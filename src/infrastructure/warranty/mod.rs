//! Warranty reuse infrastructure

mod rate_limiter;
mod service;

pub use rate_limiter::{QueryRateLimiter, DEFAULT_LIMITER_CAPACITY, DEFAULT_QUERY_INTERVAL};
pub use service::{RedemptionStatus, ReuseDecision, WarrantyQuery, WarrantyReport, WarrantyService};
