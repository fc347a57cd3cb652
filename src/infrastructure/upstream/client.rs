//! Upstream API client with retry and structured results

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::http_client::{HttpMethod, HttpRequest, HttpTransport, TransportError};
use crate::domain::upstream::{parse_error_body, ApiFailure, ApiResult, ApiSuccess};

/// Retry schedule for transient failures (network errors and 5xx)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after each failed attempt; the last entry repeats
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delays: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delays,
        }
    }

    /// Retry without waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Vec::new())
    }

    /// Delay after the given failed attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delays
            .get(attempt as usize)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or_default()
    }
}

/// Client for the upstream provider.
///
/// 2xx replies are parsed as JSON (an empty object when the body is not JSON),
/// 4xx replies are returned at once with the provider's `detail` and error
/// code, 5xx replies and transport errors are retried per the policy.
#[derive(Debug, Clone)]
pub struct ExternalApiClient {
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl ExternalApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn get(&self, url: &str, headers: Vec<(String, String)>) -> ApiResult {
        self.call(HttpMethod::Get, url, headers, None).await
    }

    pub async fn post(&self, url: &str, headers: Vec<(String, String)>, body: Value) -> ApiResult {
        self.call(HttpMethod::Post, url, headers, Some(body)).await
    }

    pub async fn delete(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        body: Option<Value>,
    ) -> ApiResult {
        self.call(HttpMethod::Delete, url, headers, body).await
    }

    /// Issue one logical call, retrying transient failures
    pub async fn call(
        &self,
        method: HttpMethod,
        url: &str,
        headers: Vec<(String, String)>,
        body: Option<Value>,
    ) -> ApiResult {
        let request = HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        };
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_failure = ApiFailure::network("request was not attempted");

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.retry.delay_for_attempt(attempt - 1);
                debug!(delay_ms = delay.as_millis() as u64, "Waiting before retry");
                tokio::time::sleep(delay).await;
            }

            debug!(%method, url, attempt = attempt + 1, max_attempts, "Sending upstream request");

            match self.transport.send(&request).await {
                Ok(response) if (200..300).contains(&response.status) => {
                    let data = serde_json::from_str(&response.body)
                        .unwrap_or_else(|_| Value::Object(Default::default()));

                    return Ok(ApiSuccess {
                        status: response.status,
                        data,
                    });
                }
                Ok(response) if response.status < 500 => {
                    let (message, code) = parse_error_body(&response.body);
                    warn!(
                        %method,
                        url,
                        status = response.status,
                        code = code.as_deref().unwrap_or("-"),
                        "Upstream rejected request"
                    );

                    return Err(ApiFailure {
                        status: response.status,
                        message,
                        code,
                    });
                }
                Ok(response) => {
                    warn!(%method, url, status = response.status, attempt = attempt + 1, "Upstream server error");
                    last_failure = ApiFailure::new(
                        response.status,
                        format!("server error {}", response.status),
                    );
                }
                Err(TransportError::Configuration(message)) => {
                    warn!(%method, url, error = %message, "Upstream session unavailable");
                    return Err(ApiFailure::network(message));
                }
                Err(e) => {
                    warn!(%method, url, error = %e, attempt = attempt + 1, "Upstream request failed");
                    last_failure = ApiFailure::network(e.to_string());
                }
            }
        }

        last_failure.message = format!("{}, retried {} times", last_failure.message, max_attempts);
        Err(last_failure)
    }
}

#[cfg(test)]
mod tests {
    use super::super::http_client::mock::MockTransport;
    use super::super::http_client::ReqwestTransport;
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(transport: Arc<dyn HttpTransport>) -> ExternalApiClient {
        ExternalApiClient::new(transport, RetryPolicy::immediate(3))
    }

    #[test]
    fn test_default_policy_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_secs(4));
        assert_eq!(RetryPolicy::immediate(3).delay_for_attempt(0), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_success_parses_json() {
        let transport = Arc::new(MockTransport::new().with_response(200, r#"{"ok":true}"#));
        let result = client(transport).get("http://upstream/x", vec![]).await.unwrap();

        assert_eq!(result.status, 200);
        assert_eq!(result.data["ok"], true);
    }

    #[tokio::test]
    async fn test_success_with_non_json_body_yields_empty_object() {
        let transport = Arc::new(MockTransport::new().with_response(204, ""));
        let result = client(transport).get("http://upstream/x", vec![]).await.unwrap();

        assert_eq!(result.data, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let transport = Arc::new(
            MockTransport::new()
                .with_response(
                    401,
                    r#"{"detail":"Token expired","error":{"code":"token_invalidated"}}"#,
                )
                .with_response(200, "{}"),
        );
        let failure = client(transport.clone())
            .get("http://upstream/x", vec![])
            .await
            .unwrap_err();

        assert_eq!(failure.status, 401);
        assert_eq!(failure.message, "Token expired");
        assert_eq!(failure.code.as_deref(), Some("token_invalidated"));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_retried_then_succeeds() {
        let transport = Arc::new(
            MockTransport::new()
                .with_response(502, "bad gateway")
                .with_error(TransportError::Timeout)
                .with_response(200, r#"{"n":1}"#),
        );
        let result = client(transport.clone())
            .get("http://upstream/x", vec![])
            .await
            .unwrap();

        assert_eq!(result.data["n"], 1);
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_name_the_count() {
        let transport = Arc::new(
            MockTransport::new()
                .with_response(500, "")
                .with_response(500, "")
                .with_response(503, ""),
        );
        let failure = client(transport.clone())
            .get("http://upstream/x", vec![])
            .await
            .unwrap_err();

        assert_eq!(failure.status, 503);
        assert_eq!(failure.message, "server error 503, retried 3 times");
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_timeouts_report_status_zero() {
        let transport = Arc::new(
            MockTransport::new()
                .with_error(TransportError::Timeout)
                .with_error(TransportError::Timeout)
                .with_error(TransportError::Timeout),
        );
        let failure = client(transport).get("http://upstream/x", vec![]).await.unwrap_err();

        assert!(failure.is_network());
        assert_eq!(failure.message, "request timed out, retried 3 times");
    }

    #[tokio::test]
    async fn test_configuration_error_is_not_retried() {
        let transport = Arc::new(
            MockTransport::new()
                .with_error(TransportError::Configuration("invalid proxy".into()))
                .with_response(200, "{}"),
        );
        let failure = client(transport.clone())
            .get("http://upstream/x", vec![])
            .await
            .unwrap_err();

        assert_eq!(failure.message, "invalid proxy");
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_against_live_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ExternalApiClient::new(
            Arc::new(ReqwestTransport::default()),
            RetryPolicy::new(3, vec![Duration::from_millis(10)]),
        );
        let result = client
            .get(&format!("{}/flaky", server.uri()), vec![])
            .await
            .unwrap();

        assert_eq!(result.data["ok"], 1);
    }
}
