//! Fixtures: per-run resource factories and teardown.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use threescale_api::{
    Account, Application, ApplicationPlan, Kind, MappingRule, MappingRuleParams, Metric, ProxyClient,
    Resource, Service, ThreeScaleClient,
};

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::gateway::GatewayClient;

/// A resource scheduled for deletion on teardown.
#[derive(Debug, Clone)]
struct Created {
    entity: &'static str,
    path: String,
}

/// Resource factory bound to one tenant and one test run.
///
/// Names carry a random per-run suffix so concurrent runs against the same
/// tenant don't collide. Everything created through a factory method is
/// removed by [`Fixtures::teardown`]. Anything still pending when the
/// fixtures are dropped, e.g. after a failed assertion, is deleted on drop.
pub struct Fixtures {
    client: ThreeScaleClient,
    config: HarnessConfig,
    suffix: String,
    counter: AtomicU32,
    created: Mutex<Vec<Created>>,
}

impl Fixtures {
    /// Build fixtures for the configured tenant.
    pub fn new(config: HarnessConfig) -> Result<Self, HarnessError> {
        config.validate()?;
        let client = ThreeScaleClient::new(config.client_config())?;
        let suffix = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();

        tracing::info!(url = %config.url, suffix = %suffix, "fixtures ready");

        Ok(Self {
            client,
            config,
            suffix,
            counter: AtomicU32::new(0),
            created: Mutex::new(Vec::new()),
        })
    }

    /// Load config from the environment, set up logging and build fixtures.
    pub fn from_env() -> Result<Self, HarnessError> {
        let config = HarnessConfig::load()?;
        crate::init_logging(&config);
        Self::new(config)
    }

    pub fn client(&self) -> &ThreeScaleClient {
        &self.client
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Random suffix shared by every name of this run.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Identifier-safe unique name, e.g. `metric_1a2b3c4d_3`.
    pub fn unique_name(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{}", prefix, self.suffix, n)
    }

    /// Parameters of a fresh, valid metric.
    pub fn metric_params(&self) -> Value {
        let name = self.unique_name("metric");
        json!({
            "system_name": name,
            "unit": "hit",
            "friendly_name": format!("Metric {}", name),
        })
    }

    /// `base` with a different friendly name and unit.
    pub fn updated_metric_params(&self, base: &Value) -> Value {
        let mut params = base.clone();
        if let Some(map) = params.as_object_mut() {
            let name = map
                .get("system_name")
                .and_then(Value::as_str)
                .unwrap_or("metric")
                .to_string();
            map.insert("friendly_name".into(), json!(format!("Updated {}", name)));
            map.insert("unit".into(), json!("request"));
        }
        params
    }

    /// Create a service and point its proxy at the configured backend.
    pub async fn create_service(&self) -> Result<Resource<Service>, HarnessError> {
        let name = self.unique_name("svc");
        let service = self
            .client
            .services()
            .create(&json!({"name": name, "system_name": name}))
            .await?;
        self.track(&service);

        if let Some(backend) = &self.config.api_backend {
            service
                .proxy()
                .update(&json!({"api_backend": backend}))
                .await?;
        }
        Ok(service)
    }

    /// Create a developer account through signup.
    pub async fn create_account(&self) -> Result<Resource<Account>, HarnessError> {
        let name = self.unique_name("acc");
        let account = self
            .client
            .accounts()
            .create(&json!({
                "username": name,
                "email": format!("{}@example.com", name),
                "password": uuid::Uuid::new_v4().simple().to_string(),
                "org_name": name,
            }))
            .await?;
        self.track(&account);
        Ok(account)
    }

    /// Create an application plan on `service`.
    pub async fn create_application_plan(
        &self,
        service: &Resource<Service>,
        name: &str,
    ) -> Result<Resource<ApplicationPlan>, HarnessError> {
        let plan = service
            .app_plans()
            .create(&json!({"name": name, "system_name": self.unique_name("plan")}))
            .await?;
        self.track(&plan);
        Ok(plan)
    }

    /// Create an application of `account` subscribed to `plan`.
    pub async fn create_application(
        &self,
        account: &Resource<Account>,
        plan: &Resource<ApplicationPlan>,
        name: &str,
        description: &str,
    ) -> Result<Resource<Application>, HarnessError> {
        let plan_id = plan.id().ok_or(HarnessError::MissingField {
            entity: ApplicationPlan::ENTITY,
            field: "id",
        })?;
        let application = account
            .applications()
            .create(&json!({
                "name": name,
                "plan_id": plan_id,
                "description": description,
            }))
            .await?;
        self.track(&application);
        Ok(application)
    }

    /// Create a metric on `service`.
    pub async fn create_metric(
        &self,
        service: &Resource<Service>,
        params: &Value,
    ) -> Result<Resource<Metric>, HarnessError> {
        let metric = service.metrics().create(params).await?;
        self.track(&metric);
        Ok(metric)
    }

    /// Map `http_method pattern` on the proxy to `metric`.
    pub async fn create_mapping_rule(
        &self,
        proxy: &ProxyClient,
        metric: &Resource<Metric>,
        http_method: &str,
        pattern: &str,
    ) -> Result<Resource<MappingRule>, HarnessError> {
        let rule = proxy
            .mapping_rules()
            .create(&MappingRuleParams::new(metric, http_method, pattern)?)
            .await?;
        self.track(&rule);
        Ok(rule)
    }

    /// Gateway client authenticated as `application` on `service`'s sandbox.
    pub async fn gateway_client(
        &self,
        service: &Resource<Service>,
        application: &Resource<Application>,
    ) -> Result<GatewayClient, HarnessError> {
        let proxy = service.proxy().read().await?;
        GatewayClient::for_application(&proxy, application, self.config.ssl_verify)
    }

    /// Number of resources awaiting teardown.
    pub fn pending_teardown(&self) -> usize {
        self.created.lock().len()
    }

    /// Delete everything created through this factory, newest first.
    ///
    /// Already-deleted resources are skipped; other failures are logged
    /// and do not stop the remaining deletions. Returns how many
    /// deletions failed.
    pub async fn teardown(&self) -> usize {
        let created: Vec<Created> = std::mem::take(&mut *self.created.lock());
        let mut failures = 0;

        for item in created.into_iter().rev() {
            match self.client.rest().delete(&item.path).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        entity = item.entity,
                        path = %item.path,
                        error = %e,
                        "teardown failed"
                    );
                }
            }
        }
        failures
    }

    fn track<K: Kind>(&self, resource: &Resource<K>) {
        self.created.lock().push(Created {
            entity: K::ENTITY,
            path: resource.path().to_string(),
        });
    }
}

impl Drop for Fixtures {
    fn drop(&mut self) {
        let created: Vec<Created> = std::mem::take(&mut *self.created.lock());
        if created.is_empty() {
            return;
        }

        let mut targets = Vec::with_capacity(created.len());
        for item in created.into_iter().rev() {
            match self.client.rest().full_url(&item.path) {
                Ok(url) => targets.push((item, url)),
                Err(e) => tracing::warn!(path = %item.path, error = %e, "teardown failed"),
            }
        }

        tracing::info!(pending = targets.len(), "cleaning up fixtures on drop");

        // The blocking client must not run on a runtime thread.
        let token = self.config.token.clone();
        let ssl_verify = self.config.ssl_verify;
        let worker = std::thread::spawn(move || blocking_teardown(targets, &token, ssl_verify));
        match worker.join() {
            Ok(0) => {}
            Ok(failures) => tracing::warn!(failures, "teardown on drop left resources behind"),
            Err(_) => tracing::error!("teardown on drop panicked"),
        }
    }
}

fn blocking_teardown(
    targets: Vec<(Created, reqwest::Url)>,
    token: &str,
    ssl_verify: bool,
) -> usize {
    let client = match reqwest::blocking::Client::builder()
        .danger_accept_invalid_certs(!ssl_verify)
        .timeout(Duration::from_secs(30))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "teardown client could not be built");
            return targets.len();
        }
    };

    let mut failures = 0;
    for (item, url) in targets {
        let result = client.delete(url).query(&[("access_token", token)]).send();
        match result {
            Ok(r) if r.status().is_success() || r.status() == reqwest::StatusCode::NOT_FOUND => {}
            Ok(r) => {
                failures += 1;
                tracing::warn!(
                    entity = item.entity,
                    path = %item.path,
                    status = %r.status(),
                    "teardown failed"
                );
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(
                    entity = item.entity,
                    path = %item.path,
                    error = %e,
                    "teardown failed"
                );
            }
        }
    }
    failures
}
