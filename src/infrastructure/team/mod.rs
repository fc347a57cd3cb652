//! Team infrastructure implementations

mod service;
mod token_refresher;

pub use service::{
    AvailableTeam, ImportReport, ImportTeamRequest, MemberState, SyncOutcome, SyncReport,
    TeamMemberView, TeamService, TeamSettings, UpdateTeamRequest,
};
pub use token_refresher::{TokenOutcome, TokenRefresher};
