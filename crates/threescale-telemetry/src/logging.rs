//! Structured logging with JSON or pretty output.

use crate::{LogFormat, TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the logging subsystem.
///
/// Sets up tracing-subscriber with either JSON or pretty format,
/// respecting the configured log level unless `RUST_LOG` is set.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => init_json_logging(filter, config.test_writer),
        LogFormat::Pretty => init_pretty_logging(filter, config),
    }
}

fn init_json_logging(filter: EnvFilter, test_writer: bool) -> Result<(), TelemetryError> {
    let layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_file(false)
        .with_line_number(false)
        .flatten_event(true);

    // The two writer types differ, so each branch boxes its own layer.
    let layer = if test_writer {
        layer.with_test_writer().with_filter(filter).boxed()
    } else {
        layer.with_filter(filter).boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

fn init_pretty_logging(filter: EnvFilter, config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let layer = fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(config.with_file)
        .with_line_number(config.with_file);

    let layer = if config.test_writer {
        layer.with_test_writer().with_filter(filter).boxed()
    } else {
        layer.with_filter(filter).boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

/// Standard log event names.
pub mod events {
    /// A request to the management API is about to be sent.
    pub const REQUEST_SENT: &str = "request_sent";

    /// The management API answered with a success status.
    pub const RESPONSE_RECEIVED: &str = "response_received";

    /// The management API answered with an error status.
    pub const RESPONSE_FAILED: &str = "response_failed";

    /// A resource was created.
    pub const RESOURCE_CREATED: &str = "resource_created";

    /// A resource was deleted.
    pub const RESOURCE_DELETED: &str = "resource_deleted";

    /// Proxy configuration was republished.
    pub const PROXY_UPDATED: &str = "proxy_updated";

    /// A gateway probe request completed.
    pub const PROBE_ATTEMPT: &str = "probe_attempt";

    /// The retry budget ran out before the condition cleared.
    pub const RETRY_EXHAUSTED: &str = "retry_exhausted";
}

/// Helper macros for structured logging with standard fields.
///
/// These wrap the tracing macros to ensure consistent field naming.
#[macro_export]
macro_rules! log_request_sent {
    ($($field:tt)*) => {
        tracing::debug!(
            event = $crate::logging::events::REQUEST_SENT,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_response_received {
    ($($field:tt)*) => {
        tracing::debug!(
            event = $crate::logging::events::RESPONSE_RECEIVED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_response_failed {
    ($($field:tt)*) => {
        tracing::error!(
            event = $crate::logging::events::RESPONSE_FAILED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_resource_created {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::RESOURCE_CREATED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_resource_deleted {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::RESOURCE_DELETED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_proxy_updated {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::PROXY_UPDATED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_probe_attempt {
    ($($field:tt)*) => {
        tracing::debug!(
            event = $crate::logging::events::PROBE_ATTEMPT,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_retry_exhausted {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::RETRY_EXHAUSTED,
            $($field)*
        )
    };
}
