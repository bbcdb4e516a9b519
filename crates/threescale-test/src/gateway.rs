//! GatewayClient: HTTP probe against a service's sandbox gateway.

use std::time::Duration;

use threescale_api::{Application, Proxy, Resource};

use crate::error::HarnessError;

/// Per-request timeout unless one is given explicitly.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Probe client for the proxied (public) side of a service.
///
/// Every request carries the application credentials as query
/// parameters; only the response status is of interest to callers.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    /// Sandbox endpoint of the proxy, without trailing slash.
    base_url: String,
    /// HTTP client for making requests.
    client: reqwest::Client,
    /// Credential query parameters, e.g. `user_key=...`.
    auth: Vec<(String, String)>,
}

impl GatewayClient {
    /// Create a client for `sandbox_endpoint` sending `auth` on every request.
    pub fn new(
        sandbox_endpoint: &str,
        ssl_verify: bool,
        auth: Vec<(String, String)>,
    ) -> Result<Self, HarnessError> {
        Self::with_timeout(sandbox_endpoint, ssl_verify, auth, DEFAULT_TIMEOUT)
    }

    /// Like [`GatewayClient::new`], failing requests that take longer than `timeout`.
    pub fn with_timeout(
        sandbox_endpoint: &str,
        ssl_verify: bool,
        auth: Vec<(String, String)>,
        timeout: Duration,
    ) -> Result<Self, HarnessError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!ssl_verify)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: sandbox_endpoint.trim_end_matches('/').to_string(),
            client,
            auth,
        })
    }

    /// Client authenticated as `application` against the proxy's sandbox.
    ///
    /// The credential parameter name comes from the proxy's
    /// `auth_user_key` setting, its value from the application's `user_key`.
    pub fn for_application(
        proxy: &Resource<Proxy>,
        application: &Resource<Application>,
        ssl_verify: bool,
    ) -> Result<Self, HarnessError> {
        let endpoint = proxy
            .str("sandbox_endpoint")
            .ok_or(HarnessError::MissingField {
                entity: "proxy",
                field: "sandbox_endpoint",
            })?;
        Self::new(endpoint, ssl_verify, user_key_params(proxy, application)?)
    }

    /// Get the base URL of the gateway.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Credential query parameters sent with each request.
    pub fn auth(&self) -> &[(String, String)] {
        &self.auth
    }

    /// URL of `path` on the gateway (without credentials).
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Make a GET request to the given path.
    pub async fn get(&self, path: &str) -> Result<reqwest::Response, HarnessError> {
        self.request(reqwest::Method::GET, path).await
    }

    /// Make a request with any method.
    pub async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::Response, HarnessError> {
        let response = self
            .client
            .request(method.clone(), self.url_for(path))
            .query(&self.auth)
            .send()
            .await?;

        tracing::debug!(
            method = %method,
            path,
            status = response.status().as_u16(),
            "gateway response"
        );
        Ok(response)
    }
}

/// `{proxy.auth_user_key: application.user_key}` as query parameters.
pub fn user_key_params(
    proxy: &Resource<Proxy>,
    application: &Resource<Application>,
) -> Result<Vec<(String, String)>, HarnessError> {
    let param = proxy.str("auth_user_key").ok_or(HarnessError::MissingField {
        entity: "proxy",
        field: "auth_user_key",
    })?;
    let user_key = application
        .str("user_key")
        .ok_or(HarnessError::MissingField {
            entity: "application",
            field: "user_key",
        })?;
    Ok(vec![(param.to_string(), user_key.to_string())])
}
