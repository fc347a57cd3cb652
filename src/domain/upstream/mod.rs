//! Upstream provider domain module
//!
//! Structured call outcomes, the failure classifier and the trait the
//! lifecycle services use to reach the provider.

mod api;
mod classification;
mod response;

pub use api::{
    Invite, Listing, Member, RefreshedTokens, TeamAccountInfo, UpstreamApi, TEAM_PLAN_TYPE,
};
pub use classification::{classify, FailureKind};
pub use response::{parse_error_body, ApiFailure, ApiResult, ApiSuccess};

#[cfg(test)]
pub use api::mock;
