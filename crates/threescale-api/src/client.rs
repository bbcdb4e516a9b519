//! Entry point of the account management API.

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::resource::Collection;
use crate::resources::{Account, Service};
use crate::rest::{RestApiClient, ADMIN_API_PATH};

/// Client for one 3scale tenant.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone, Debug)]
pub struct ThreeScaleClient {
    config: ClientConfig,
    rest: RestApiClient,
}

impl ThreeScaleClient {
    /// Create a client for the configured tenant.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let rest = RestApiClient::new(&config)?;
        Ok(Self { config, rest })
    }

    /// The REST transport.
    pub fn rest(&self) -> &RestApiClient {
        &self.rest
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Tenant URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Base URL of the account management API.
    pub fn admin_api_url(&self) -> String {
        self.config.admin_api_url()
    }

    /// Services of the tenant.
    pub fn services(&self) -> Collection<Service> {
        Collection::new(self.rest.clone(), ADMIN_API_PATH)
    }

    /// Developer accounts of the tenant.
    pub fn accounts(&self) -> Collection<Account> {
        Collection::new(self.rest.clone(), ADMIN_API_PATH)
    }
}
