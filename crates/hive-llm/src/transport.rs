use std::time::Duration;

use hive_types::{HiveError, Result};

/// HTTP settings for one generative-service client.
///
/// Passed into adapter constructors and scoped to the client built from it;
/// nothing here touches process-wide state.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub base_url: String,
    /// Whole-request timeout enforced by the HTTP client.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_idle_connections: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            max_idle_connections: 8,
        }
    }
}

impl TransportConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a `reqwest::Client` honoring these settings.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        if self.timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(HiveError::Config(
                "transport timeouts must be greater than zero".into(),
            ));
        }
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.max_idle_connections)
            .build()
            .map_err(|e| HiveError::Config(format!("failed to build HTTP client: {e}")))
    }
}
