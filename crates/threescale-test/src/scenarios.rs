//! Enforcement scenarios: configure a limit through the management API
//! and observe the sandbox gateway applying it.

use reqwest::StatusCode;
use serde_json::{json, Value};
use threescale_api::{
    Account, ApplicationPlan, LimitParams, MappingRule, Period, Proxy, ProxyClient, Resource,
    Service,
};

use crate::backoff::Backoff;
use crate::error::HarnessError;
use crate::fixtures::Fixtures;
use crate::gateway::GatewayClient;

/// Endpoint written to the proxy to force a configuration republish.
pub const REPUBLISH_ENDPOINT: &str = "http://test.test:80";

/// Pattern mapped to the disabled metric.
pub const DISABLED_PATTERN: &str = "/foo/bah/";

/// Pattern mapped to the one-per-day metric.
pub const QUOTA_PATTERN: &str = "/limits/exceeded/";

/// What the gateway answered once the scenario settled.
#[derive(Debug)]
pub struct EnforcementOutcome {
    /// Status of the first probe.
    pub first_status: StatusCode,
    /// Status of the last probe.
    pub status: StatusCode,
    /// Number of probes sent.
    pub attempts: u32,
    /// The mapping rule that routed the probes.
    pub rule: Resource<MappingRule>,
}

/// Write the proxy configuration again so pending mapping-rule changes
/// reach the sandbox gateway.
pub async fn republish_proxy(proxy: &ProxyClient) -> Result<Resource<Proxy>, HarnessError> {
    Ok(proxy.update(&json!({"endpoint": REPUBLISH_ENDPOINT})).await?)
}

/// Delete every mapping rule on the proxy.
pub async fn clear_mapping_rules(proxy: &ProxyClient) -> Result<usize, HarnessError> {
    let rules = proxy.mapping_rules().list().await?;
    let count = rules.len();
    for rule in rules {
        rule.delete().await?;
    }
    Ok(count)
}

/// Metric parameters used by [`quota_exceeded`].
pub fn quota_metric_params() -> Value {
    json!({
        "system_name": "limits_exceeded",
        "unit": "count",
        "friendly_name": "Limits Exceeded",
    })
}

/// A metric whose plan limit is zero must be rejected with 403.
///
/// Creates the plan, application, metric, zero limit and a single mapping
/// rule, republishes the proxy and probes the rule's pattern with backoff
/// until the gateway stops answering 200.
pub async fn disabled_metric(
    fixtures: &Fixtures,
    service: &Resource<Service>,
    account: &Resource<Account>,
    metric_params: &Value,
) -> Result<EnforcementOutcome, HarnessError> {
    let proxy = service.proxy();
    let plan = fixtures
        .create_application_plan(service, "metrics-disabled")
        .await?;
    let application = fixtures
        .create_application(account, &plan, "metrics-disabled", "metric disabled")
        .await?;

    let metric = fixtures.create_metric(service, metric_params).await?;
    plan.limits(&metric)?
        .create(&LimitParams::disabled(Period::Month))
        .await?;

    let removed = clear_mapping_rules(&proxy).await?;
    tracing::debug!(removed, "cleared existing mapping rules");
    let rule = fixtures
        .create_mapping_rule(&proxy, &metric, "GET", DISABLED_PATTERN)
        .await?;

    let published = republish_proxy(&proxy).await?;
    let gateway =
        GatewayClient::for_application(&published, &application, fixtures.config().ssl_verify)?;

    probe_until_enforced(&gateway, &rule, &fixtures.config().backoff()).await
}

/// A one-per-day limit must turn into 429 once the allowance is spent.
///
/// `plan` must be the plan `gateway`'s application is subscribed to.
pub async fn quota_exceeded(
    fixtures: &Fixtures,
    service: &Resource<Service>,
    plan: &Resource<ApplicationPlan>,
    gateway: &GatewayClient,
    metric_params: &Value,
) -> Result<EnforcementOutcome, HarnessError> {
    let proxy = service.proxy();
    let metric = fixtures.create_metric(service, metric_params).await?;
    plan.limits(&metric)?
        .create(&LimitParams::new(Period::Day, 1))
        .await?;

    let rule = fixtures
        .create_mapping_rule(&proxy, &metric, "GET", QUOTA_PATTERN)
        .await?;
    republish_proxy(&proxy).await?;

    // Keep hitting the rule until the allowance runs out; no sleeping, each
    // successful call is what consumes the quota.
    let budget = Backoff::immediate(fixtures.config().max_requests);
    probe_until_enforced(gateway, &rule, &budget).await
}

/// Probe `rule`'s pattern while the gateway answers 200.
async fn probe_until_enforced(
    gateway: &GatewayClient,
    rule: &Resource<MappingRule>,
    backoff: &Backoff,
) -> Result<EnforcementOutcome, HarnessError> {
    let pattern = rule.str("pattern").ok_or(HarnessError::MissingField {
        entity: "mapping_rule",
        field: "pattern",
    })?;

    let mut first_status = None;
    let retried = backoff
        .run(
            move || async move {
                let status = gateway.get(pattern).await?.status();
                Ok::<_, HarnessError>(status)
            },
            |status| {
                first_status.get_or_insert(*status);
                *status == StatusCode::OK
            },
        )
        .await?;

    Ok(EnforcementOutcome {
        first_status: first_status.unwrap_or(retried.value),
        status: retried.value,
        attempts: retried.attempts,
        rule: rule.clone(),
    })
}
