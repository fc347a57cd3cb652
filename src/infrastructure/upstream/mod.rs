//! Upstream provider infrastructure module
//!
//! HTTP transport, the retrying API client and the provider endpoints.

mod client;
mod http_client;
mod provider;

pub use client::{ExternalApiClient, RetryPolicy};
pub use http_client::{
    validate_proxy_url, HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
    TransportError, TransportSettings,
};
pub use provider::{
    ProviderApi, ProviderEndpoints, DEFAULT_BASE_URL, DEFAULT_OAUTH_TOKEN_URL,
    DEFAULT_SESSION_REFRESH_URL,
};

#[cfg(test)]
pub use http_client::mock;
