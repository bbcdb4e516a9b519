//! Client configuration.

use std::fmt;
use std::time::Duration;

/// Connection settings for a 3scale tenant.
#[derive(Clone)]
pub struct ClientConfig {
    /// Tenant admin portal URL, e.g. `https://acme-admin.3scale.net`.
    pub url: String,

    /// Provider access token, sent as the `access_token` query parameter.
    pub token: String,

    /// Verify TLS certificates (default: true).
    pub ssl_verify: bool,

    /// Per-request timeout (default: 30s).
    pub timeout: Duration,
}

impl ClientConfig {
    /// Create a config for the given tenant URL and access token.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            ssl_verify: true,
            timeout: Duration::from_secs(30),
        }
    }

    /// Enable or disable TLS certificate verification.
    pub fn with_ssl_verify(mut self, verify: bool) -> Self {
        self.ssl_verify = verify;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL of the account management API.
    pub fn admin_api_url(&self) -> String {
        format!("{}/admin/api", self.url)
    }
}

// Manual impl keeps the token out of debug output.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("ssl_verify", &self.ssl_verify)
            .field("timeout", &self.timeout)
            .finish()
    }
}
