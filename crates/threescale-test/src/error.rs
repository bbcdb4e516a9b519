//! Harness errors.

use thiserror::Error;
use threescale_api::ApiError;

use crate::config::ConfigError;

/// Errors from harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{entity} has no `{field}` field")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },
}
