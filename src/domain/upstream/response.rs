//! Structured outcome of an upstream call

use serde_json::Value;

use super::classification::{classify, FailureKind};

/// Successful upstream response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiSuccess {
    pub status: u16,
    /// Parsed JSON body, an empty object when the body was not JSON
    pub data: Value,
}

/// Failed upstream call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFailure {
    /// HTTP status, 0 when no response was received
    pub status: u16,
    pub message: String,
    /// Provider error code from `error.code` or top-level `code`
    pub code: Option<String>,
}

impl ApiFailure {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Failure without an HTTP response (timeout, connection error)
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }

    pub fn is_network(&self) -> bool {
        self.status == 0
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// Replace the message for a known status with a friendlier one.
    ///
    /// Ban signals carried only in the provider text are kept as they are.
    pub fn describe_status(mut self, status: u16, message: &str) -> Self {
        if self.status == status && classify(&self) != FailureKind::AccountBanned {
            self.message = message.to_string();
        }
        self
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} (status {}, code {})", self.message, self.status, code),
            None => write!(f, "{} (status {})", self.message, self.status),
        }
    }
}

/// Result of an upstream call
pub type ApiResult = Result<ApiSuccess, ApiFailure>;

/// Extract `detail` and the provider error code from a 4xx body
pub fn parse_error_body(body: &str) -> (String, Option<String>) {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return (body.to_string(), None);
    };

    let message = match json.get("detail") {
        Some(Value::String(detail)) => detail.clone(),
        Some(other) => other.to_string(),
        None => body.to_string(),
    };

    let code = match json.get("error") {
        Some(Value::Object(error)) => error.get("code").and_then(as_code),
        _ => json.get("code").and_then(as_code),
    };

    (message, code)
}

fn as_code(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
