//! Classification of failed upstream calls

use super::response::ApiFailure;

const BANNED_CODES: &[&str] = &["account_deactivated", "token_invalidated"];
const BANNED_PHRASES: &[&str] = &["token has been invalidated", "account_deactivated"];
const INVALID_GRANT: &str = "invalid_grant";

/// Kind of an upstream failure, driving team lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Network error or 5xx after retries
    Transient,
    /// Terminal 4xx with no lifecycle meaning
    ClientError,
    /// Account deactivated or token invalidated upstream
    AccountBanned,
    /// Refresh credential rejected
    GrantInvalid,
}

impl FailureKind {
    /// Whether the failure counts towards the error threshold of a team
    pub fn counts_as_error(&self) -> bool {
        matches!(self, Self::Transient | Self::GrantInvalid)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::ClientError => write!(f, "client_error"),
            Self::AccountBanned => write!(f, "account_banned"),
            Self::GrantInvalid => write!(f, "grant_invalid"),
        }
    }
}

/// Classify a failed call.
///
/// The message text is checked as well as the code, since the provider does
/// not report errors in one consistent shape.
pub fn classify(failure: &ApiFailure) -> FailureKind {
    let code = failure.code.as_deref().unwrap_or_default();
    let text = failure.message.to_lowercase();

    if BANNED_CODES.contains(&code) || BANNED_PHRASES.iter().any(|p| text.contains(p)) {
        return FailureKind::AccountBanned;
    }

    if code == INVALID_GRANT || text.contains(INVALID_GRANT) {
        return FailureKind::GrantInvalid;
    }

    if failure.is_network() || failure.is_server_error() {
        FailureKind::Transient
    } else {
        FailureKind::ClientError
    }
}
