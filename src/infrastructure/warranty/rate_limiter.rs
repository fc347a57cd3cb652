//! Per-subject query limiter
//!
//! Allows one warranty status query per subject within the interval. Entries
//! expire with the interval, so the map never outgrows its capacity.

use moka::future::Cache;
use std::time::{Duration, Instant};

use crate::domain::DomainError;

/// Default spacing between two queries for the same subject
pub const DEFAULT_QUERY_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of tracked subjects
pub const DEFAULT_LIMITER_CAPACITY: u64 = 10_000;

/// One-query-per-interval limiter keyed by query subject
#[derive(Debug, Clone)]
pub struct QueryRateLimiter {
    interval: Duration,
    last_query: Cache<String, Instant>,
}

impl QueryRateLimiter {
    pub fn new(interval: Duration, capacity: u64) -> Self {
        let last_query = Cache::builder()
            .time_to_live(interval.max(Duration::from_millis(1)))
            .max_capacity(capacity)
            .build();

        Self {
            interval,
            last_query,
        }
    }

    /// Record a query for `key`, rejecting it when the previous one is too recent
    pub async fn check(&self, key: &str) -> Result<(), DomainError> {
        if self.interval.is_zero() {
            return Ok(());
        }

        let entry = self
            .last_query
            .entry(key.to_string())
            .or_insert_with(async { Instant::now() })
            .await;

        if entry.is_fresh() {
            return Ok(());
        }

        let elapsed = entry.value().elapsed();
        if elapsed >= self.interval {
            self.last_query.insert(key.to_string(), Instant::now()).await;
            return Ok(());
        }

        let remaining = self.interval - elapsed;
        let retry_after_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        tracing::debug!(key, retry_after_secs, "Warranty query rate limited");

        Err(DomainError::rate_limited(retry_after_secs.max(1)))
    }

    /// Subject key for email queries
    pub fn email_key(email: &str) -> String {
        format!("email:{}", email.trim().to_lowercase())
    }

    /// Subject key for code queries
    pub fn code_key(code: &str) -> String {
        format!("code:{}", code.trim())
    }
}

impl Default for QueryRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_INTERVAL, DEFAULT_LIMITER_CAPACITY)
    }
}
