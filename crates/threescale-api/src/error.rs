//! Errors returned by the management API client.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Errors from management API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("resource not found: {url}")]
    NotFound { url: String },

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unexpected response body: {reason}")]
    UnexpectedBody { reason: String },

    #[error("{entity} handle has no id")]
    MissingId { entity: &'static str },
}

impl ApiError {
    /// Field-level validation errors, if this error carries any.
    pub fn field_errors(&self) -> Option<&ValidationErrors> {
        match self {
            ApiError::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// Whether the server rejected the request as invalid.
    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::Validation(_))
    }

    /// Whether the addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    /// HTTP status of the failed response, when there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http(e) => e.status(),
            ApiError::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            ApiError::Validation(errors) => Some(errors.status),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::InvalidUrl { .. }
            | ApiError::UnexpectedBody { .. }
            | ApiError::MissingId { .. } => None,
        }
    }
}

/// Field-level validation errors returned by the server.
///
/// The API answers rejected writes with `{"errors": {"field": ["msg", ...]}}`.
/// Some endpoints send a bare string list under `errors` or a single
/// `error` string instead; those land under the `base` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    /// Status of the response that carried the errors.
    pub status: StatusCode,
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Key used for errors not attached to a specific field.
    pub const BASE: &'static str = "base";

    /// Create an empty error set.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            fields: BTreeMap::new(),
        }
    }

    /// Record a message against a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Extract validation errors from a response body.
    ///
    /// Returns `None` when the body has no recognizable error structure.
    pub fn from_body(status: StatusCode, body: &Value) -> Option<Self> {
        let mut errors = Self::new(status);

        match body.get("errors") {
            Some(Value::Object(map)) => {
                for (field, messages) in map {
                    match messages {
                        Value::Array(items) => {
                            for item in items {
                                errors.add(field, value_to_message(item));
                            }
                        }
                        other => errors.add(field, value_to_message(other)),
                    }
                }
            }
            Some(Value::Array(items)) => {
                for item in items {
                    errors.add(Self::BASE, value_to_message(item));
                }
            }
            Some(other) => errors.add(Self::BASE, value_to_message(other)),
            None => {
                if let Some(message) = body.get("error") {
                    errors.add(Self::BASE, value_to_message(message));
                }
            }
        }

        if errors.is_empty() {
            None
        } else {
            Some(errors)
        }
    }

    /// Names of the fields with errors.
    pub fn fields(&self) -> BTreeSet<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    /// Messages recorded for a field.
    pub fn messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether every listed field has at least one error (order-independent).
    pub fn contains_all<S: AsRef<str>>(&self, fields: &[S]) -> bool {
        fields
            .iter()
            .all(|f| self.fields.contains_key(f.as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{} {}", field, messages.join(", "))?;
        }
        Ok(())
    }
}

fn value_to_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
