//! Integration harness for the 3scale API client.
//!
//! Provides [`Fixtures`] for per-run resource creation and cleanup,
//! [`GatewayClient`] for probing a service's sandbox gateway, and the
//! enforcement [`scenarios`] that tie the two together through [`Backoff`].

pub mod asserts;
pub mod backoff;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod gateway;
pub mod scenarios;

use std::sync::Once;

pub use backoff::{Backoff, Retried};
pub use config::{BackoffConfig, ConfigError, HarnessConfig};
pub use error::HarnessError;
pub use fixtures::Fixtures;
pub use gateway::GatewayClient;
pub use scenarios::EnforcementOutcome;

static LOGGING: Once = Once::new();

/// Install the logging subscriber described by `config`, once per process.
///
/// Later calls are no-ops, so every test may call this.
pub fn init_logging(config: &HarnessConfig) {
    LOGGING.call_once(|| {
        if let Err(e) = threescale_telemetry::init(&config.telemetry_config()) {
            // Another subscriber won the race; keep it.
            tracing::debug!(error = %e, "logging already initialized");
        }
    });
}
