//! Entity kinds of the account management API and the navigation
//! between them.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use threescale_telemetry::log_proxy_updated;

use crate::error::ApiError;
use crate::resource::{unwrap_entity, Collection, Kind, Resource};
use crate::rest::{RestApiClient, ADMIN_API_PATH};

macro_rules! kind {
    ($(#[$doc:meta])* $name:ident, $entity:literal, $collection:literal, $path:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl Kind for $name {
            const ENTITY: &'static str = $entity;
            const COLLECTION: &'static str = $collection;
            const PATH: &'static str = $path;
        }
    };
}

kind!(
    /// An API product.
    Service, "service", "services", "services"
);
kind!(
    /// A countable usage dimension of a service.
    Metric, "metric", "metrics", "metrics"
);
kind!(
    /// A named plan applications subscribe to.
    ApplicationPlan, "application_plan", "plans", "application_plans"
);
kind!(
    /// A quota bound to a (plan, metric) pair.
    Limit, "limit", "limits", "limits"
);
kind!(
    /// A binding from method + path pattern to a metric.
    MappingRule, "mapping_rule", "mapping_rules", "mapping_rules"
);
kind!(
    /// An application carrying the `user_key` credential.
    Application, "application", "applications", "applications"
);

/// A developer account.
#[derive(Debug, Clone, Copy)]
pub struct Account;

impl Kind for Account {
    const ENTITY: &'static str = "account";
    const COLLECTION: &'static str = "accounts";
    const PATH: &'static str = "accounts";

    // Accounts are created through the signup endpoint.
    fn create_path(collection_path: &str) -> String {
        match collection_path.strip_suffix("/accounts") {
            Some(root) => format!("{}/signup", root),
            None => collection_path.to_string(),
        }
    }
}

/// Per-service gateway configuration.
#[derive(Debug, Clone, Copy)]
pub struct Proxy;

impl Kind for Proxy {
    const ENTITY: &'static str = "proxy";
    const COLLECTION: &'static str = "proxies";
    const PATH: &'static str = "proxy";
    const UPDATE_METHOD: Method = Method::PATCH;
}

impl Resource<Service> {
    /// Metrics of this service.
    pub fn metrics(&self) -> Collection<Metric> {
        Collection::new(self.rest().clone(), self.path())
    }

    /// Application plans of this service.
    pub fn app_plans(&self) -> Collection<ApplicationPlan> {
        Collection::new(self.rest().clone(), self.path())
    }

    /// The service's proxy configuration.
    pub fn proxy(&self) -> ProxyClient {
        ProxyClient::new(
            self.rest().clone(),
            format!("{}/{}", self.path(), Proxy::PATH),
        )
    }
}

impl Resource<ApplicationPlan> {
    /// Limits of `metric` within this plan.
    ///
    /// Limits live under `/application_plans/{plan}/metrics/{metric}`
    /// regardless of the service the plan belongs to.
    pub fn limits(&self, metric: &Resource<Metric>) -> Result<Collection<Limit>, ApiError> {
        let plan_id = self.require_id()?;
        let metric_id = metric.require_id()?;
        Ok(Collection::new(
            self.rest().clone(),
            &format!(
                "{}/application_plans/{}/metrics/{}",
                ADMIN_API_PATH, plan_id, metric_id
            ),
        ))
    }
}

impl Resource<Account> {
    /// Applications owned by this account.
    pub fn applications(&self) -> Collection<Application> {
        Collection::new(self.rest().clone(), self.path())
    }
}

impl Resource<Proxy> {
    /// Mapping rules installed on this proxy.
    pub fn mapping_rules(&self) -> Collection<MappingRule> {
        Collection::new(self.rest().clone(), self.path())
    }
}

/// Handle on a service's singleton proxy endpoint.
#[derive(Clone, Debug)]
pub struct ProxyClient {
    rest: RestApiClient,
    path: String,
}

impl ProxyClient {
    fn new(rest: RestApiClient, path: String) -> Self {
        Self { rest, path }
    }

    /// Proxy path (without the `.json` suffix).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fetch the current proxy configuration.
    pub async fn read(&self) -> Result<Resource<Proxy>, ApiError> {
        let body = self.rest.get(&self.path).await?;
        self.wrap(body)
    }

    /// Update the proxy configuration.
    ///
    /// Mapping-rule changes only reach the sandbox gateway once the proxy
    /// configuration is written again, so callers republish with this after
    /// touching rules.
    pub async fn update<P: Serialize + ?Sized>(
        &self,
        params: &P,
    ) -> Result<Resource<Proxy>, ApiError> {
        let body = self
            .rest
            .request(Proxy::UPDATE_METHOD, &self.path, &[], Some(params))
            .await?;
        log_proxy_updated!(path = %self.path, "proxy configuration updated");
        self.wrap(body)
    }

    /// Promote the current configuration to the staging gateway.
    pub async fn deploy(&self) -> Result<Resource<Proxy>, ApiError> {
        let body = self
            .rest
            .post::<serde_json::Value>(&format!("{}/deploy", self.path), None)
            .await?;
        log_proxy_updated!(path = %self.path, "proxy configuration deployed");
        self.wrap(body)
    }

    /// Mapping rules installed on this proxy.
    pub fn mapping_rules(&self) -> Collection<MappingRule> {
        Collection::new(self.rest.clone(), &self.path)
    }

    fn wrap(&self, body: serde_json::Value) -> Result<Resource<Proxy>, ApiError> {
        let entity = unwrap_entity::<Proxy>(body)?;
        Ok(Resource::new(self.rest.clone(), self.path.clone(), entity))
    }
}

/// Quota window of a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Eternity,
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
}

/// Parameters for creating a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitParams {
    pub period: Period,
    /// Allowed usage per period; `0` disables the metric for the plan.
    pub value: u64,
}

impl LimitParams {
    pub fn new(period: Period, value: u64) -> Self {
        Self { period, value }
    }

    /// A limit that blocks the metric entirely.
    pub fn disabled(period: Period) -> Self {
        Self { period, value: 0 }
    }
}

/// Parameters for creating a mapping rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingRuleParams {
    pub http_method: String,
    pub pattern: String,
    pub metric_id: u64,
    pub delta: u64,
}

impl MappingRuleParams {
    /// Rule incrementing `metric` by one on `http_method pattern`.
    pub fn new(
        metric: &Resource<Metric>,
        http_method: &str,
        pattern: &str,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            http_method: http_method.to_uppercase(),
            pattern: pattern.to_string(),
            metric_id: metric.require_id()?,
            delta: 1,
        })
    }

    pub fn with_delta(mut self, delta: u64) -> Self {
        self.delta = delta;
        self
    }
}
