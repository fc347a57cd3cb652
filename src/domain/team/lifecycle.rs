//! Team lifecycle rules

use chrono::{DateTime, Utc};

use super::entity::TeamStatus;

/// Seats per team unless configured otherwise
pub const DEFAULT_MAX_MEMBERS: u32 = 6;

/// Consecutive failures after which a team is marked as error
pub const DEFAULT_ERROR_THRESHOLD: u32 = 3;

/// Derive the capacity-driven status: full beats expired, expired beats active
pub fn capacity_status(
    current_members: u32,
    max_members: u32,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> TeamStatus {
    if current_members >= max_members {
        TeamStatus::Full
    } else if expires_at.is_some_and(|at| at < now) {
        TeamStatus::Expired
    } else {
        TeamStatus::Active
    }
}
