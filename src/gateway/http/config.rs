use std::time::Duration;

use reqwest::Url;

use super::error::{HttpGatewayError, HttpResult};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime configuration describing how to reach the quiz backend.
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Root URL the endpoint paths are appended to.
    pub base_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpGatewayConfig {
    /// Construct a configuration from a base URL such as `http://localhost:8000`.
    pub fn new(base_url: &str) -> HttpResult<Self> {
        let parsed = Url::parse(base_url).map_err(|err| HttpGatewayError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;

        if parsed.cannot_be_a_base() {
            return Err(HttpGatewayError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "URL cannot carry a path".into(),
            });
        }

        Ok(Self {
            base_url: parsed,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
