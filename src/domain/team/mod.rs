//! Team domain module
//!
//! A team is one upstream subscription account whose seats are handed out to
//! end users. Its status follows membership counts, subscription expiry and
//! classified upstream failures.

mod entity;
mod lifecycle;
mod repository;

pub use entity::{
    SubscriptionInfo, Team, TeamAccount, TeamCredentials, TeamDraft, TeamId, TeamStatus,
};
pub use lifecycle::{capacity_status, DEFAULT_ERROR_THRESHOLD, DEFAULT_MAX_MEMBERS};
pub use repository::{TeamQuery, TeamRepository};

#[cfg(test)]
pub(crate) use entity::fixtures;
