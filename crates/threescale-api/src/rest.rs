//! Low-level REST transport for the account management API.
//!
//! Every call is sent to `<tenant url><path>.json` with the provider
//! token in the `access_token` query parameter. Responses are decoded
//! into JSON and non-success statuses are mapped onto [`ApiError`].

use std::fmt;

use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use threescale_telemetry::{log_request_sent, log_response_failed, log_response_received};

use crate::config::ClientConfig;
use crate::error::{ApiError, ValidationErrors};

/// Path prefix of the account management API.
pub const ADMIN_API_PATH: &str = "/admin/api";

/// REST client bound to a single tenant.
#[derive(Clone)]
pub struct RestApiClient {
    client: Client,
    url: String,
    token: String,
}

impl fmt::Debug for RestApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestApiClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl RestApiClient {
    /// Build a client from the given configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.ssl_verify)
            .timeout(config.timeout)
            .build()?;

        tracing::debug!(
            url = %config.url,
            ssl_verify = config.ssl_verify,
            "created REST client"
        );

        Ok(Self {
            client,
            url: config.url.clone(),
            token: config.token.clone(),
        })
    }

    /// Tenant URL this client talks to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resolve a resource path into the `.json` URL the API expects.
    pub fn full_url(&self, path: &str) -> Result<Url, ApiError> {
        let raw = format!(
            "{}/{}.json",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&raw).map_err(|e| ApiError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })
    }

    /// Send a request and decode the response.
    ///
    /// `query` is sent alongside the access token; `body` is serialized
    /// as JSON when present.
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Value, ApiError> {
        let url = self.full_url(path)?;

        log_request_sent!(method = %method, url = %url, "sending request");

        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .query(&[("access_token", self.token.as_str())])
            .query(query);

        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        process_response(&method, &url, response).await
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request::<Value>(Method::GET, path, &[], None).await
    }

    pub async fn get_with_query(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ApiError> {
        self.request::<Value>(Method::GET, path, query, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, ApiError> {
        self.request(Method::POST, path, &[], body).await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, ApiError> {
        self.request(Method::PUT, path, &[], body).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, ApiError> {
        self.request(Method::PATCH, path, &[], body).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.request::<Value>(Method::DELETE, path, &[], None).await
    }
}

/// Turn an HTTP response into JSON or an [`ApiError`].
async fn process_response(
    method: &Method,
    url: &Url,
    response: Response,
) -> Result<Value, ApiError> {
    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        log_response_received!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            "request succeeded"
        );

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&text).map_err(|e| ApiError::UnexpectedBody {
            reason: format!("{} in {}", e, url),
        });
    }

    log_response_failed!(
        method = %method,
        url = %url,
        status = status.as_u16(),
        body = %text,
        "request failed"
    );

    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound {
            url: url.to_string(),
        });
    }

    if status == StatusCode::UNPROCESSABLE_ENTITY || status == StatusCode::BAD_REQUEST {
        if let Ok(body) = serde_json::from_str::<Value>(&text) {
            if let Some(errors) = ValidationErrors::from_body(status, &body) {
                return Err(ApiError::Validation(errors));
            }
        }
    }

    Err(ApiError::Status { status, body: text })
}
