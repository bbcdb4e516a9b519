//! In-process stand-in for a 3scale tenant and its sandbox gateway.
//!
//! One wiremock server answers both sides: `/admin/api/**` behaves like the
//! account management API, every other path like the APIcast sandbox of
//! whichever service the calling application belongs to.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use threescale_test::HarnessConfig;
use threescale_test::config::BackoffConfig;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const TOKEN: &str = "sandbox-token";

const ADMIN_PREFIX: &str = "/admin/api/";
const USER_KEY_PARAM: &str = "user_key";

type Entity = Map<String, Value>;

#[derive(Default)]
struct State {
    base_url: String,
    next_id: u64,
    /// Entities keyed by collection path, e.g. `services/3/metrics`.
    collections: HashMap<String, BTreeMap<u64, Entity>>,
    /// Per-service proxy configuration.
    proxies: HashMap<u64, Entity>,
    /// Mapping rules the gateway currently enforces, per service.
    published: HashMap<u64, Vec<Entity>>,
    /// Usage per (application, metric) in the current window.
    usage: HashMap<(u64, u64), u64>,
    /// Gateway hits that still see the previous configuration.
    propagation_lag: u32,
    pending_lag: u32,
    admin_requests: usize,
    gateway_requests: usize,
}

/// Handle to a running fake tenant.
pub struct FakeTenant {
    server: MockServer,
    state: Arc<Mutex<State>>,
}

impl FakeTenant {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let state = Arc::new(Mutex::new(State {
            base_url: server.uri(),
            ..State::default()
        }));

        Mock::given(any())
            .respond_with(Responder {
                state: Arc::clone(&state),
            })
            .mount(&server)
            .await;

        Self { server, state }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Harness config pointing at this tenant with millisecond backoff.
    pub fn config(&self) -> HarnessConfig {
        let mut config = HarnessConfig::new(self.uri(), TOKEN);
        config.api_backend = None;
        config.max_requests = 10;
        config.backoff = BackoffConfig {
            max_tries: 8,
            base_ms: 2,
            factor: 2,
            max_delay_ms: 20,
            jitter: false,
        };
        config
    }

    /// Make the gateway serve the previous configuration for `hits`
    /// requests after every publish.
    pub fn set_propagation_lag(&self, hits: u32) {
        self.state.lock().propagation_lag = hits;
    }

    pub fn gateway_requests(&self) -> usize {
        self.state.lock().gateway_requests
    }

    pub fn admin_requests(&self) -> usize {
        self.state.lock().admin_requests
    }

    /// Number of entities stored under `collection`, e.g. `services`.
    pub fn count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Total number of stored entities across all collections.
    pub fn total_entities(&self) -> usize {
        self.state.lock().collections.values().map(BTreeMap::len).sum()
    }
}

struct Responder {
    state: Arc<Mutex<State>>,
}

impl Respond for Responder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.state.lock();
        let path = request.url.path().to_string();

        match path.strip_prefix(ADMIN_PREFIX) {
            Some(rest) => {
                state.admin_requests += 1;
                if query(request, "access_token").as_deref() != Some(TOKEN) {
                    return ResponseTemplate::new(403)
                        .set_body_json(json!({"error": "Access denied"}));
                }
                let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
                let segments: Vec<&str> = rest.trim_end_matches(".json").split('/').collect();
                state.admin(request.method.as_str(), &segments, body)
            }
            None => {
                state.gateway_requests += 1;
                state.gateway(&path, query(request, USER_KEY_PARAM))
            }
        }
    }
}

fn query(request: &Request, key: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({"status": "Not found"}))
}

fn invalid(errors: BTreeMap<&str, Vec<&str>>) -> ResponseTemplate {
    ResponseTemplate::new(422).set_body_json(json!({ "errors": errors }))
}

/// Entity envelope key and list key for a collection segment.
fn envelope(collection: &str) -> (&'static str, &'static str) {
    match collection {
        "services" => ("service", "services"),
        "metrics" => ("metric", "metrics"),
        "application_plans" => ("application_plan", "plans"),
        "mapping_rules" => ("mapping_rule", "mapping_rules"),
        "limits" => ("limit", "limits"),
        "accounts" => ("account", "accounts"),
        "applications" => ("application", "applications"),
        _ => ("entity", "entities"),
    }
}

fn blank(entity: &Entity, key: &str) -> bool {
    match entity.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn as_id(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl State {
    fn admin(&mut self, method: &str, segments: &[&str], body: Value) -> ResponseTemplate {
        let params = match body {
            Value::Object(map) => map,
            _ => Entity::new(),
        };

        match (method, segments) {
            ("POST", ["signup"]) => self.create("accounts", params),
            ("GET" | "PATCH" | "PUT", ["services", id, "proxy"]) => match id.parse() {
                Ok(service_id) => self.proxy(method, service_id, params),
                Err(_) => not_found(),
            },
            ("POST", ["services", id, "proxy", "deploy"]) => match id.parse() {
                Ok(service_id) => self.proxy("DEPLOY", service_id, params),
                Err(_) => not_found(),
            },
            _ => match segments.split_last() {
                Some((last, parent)) => match last.parse::<u64>() {
                    Ok(id) => {
                        let collection = parent.join("/");
                        match method {
                            "GET" => self.read(&collection, id),
                            "PUT" => self.update(&collection, id, params),
                            "DELETE" => self.delete(&collection, id),
                            _ => ResponseTemplate::new(405),
                        }
                    }
                    Err(_) => {
                        let collection = segments.join("/");
                        match method {
                            "GET" => self.list(&collection),
                            "POST" => self.create(&collection, params),
                            _ => ResponseTemplate::new(405),
                        }
                    }
                },
                None => not_found(),
            },
        }
    }

    /// Whether the entity a nested collection hangs off exists.
    fn parent_exists(&self, collection: &str) -> bool {
        let segments: Vec<&str> = collection.split('/').collect();
        let [root, id, ..] = segments.as_slice() else {
            return true;
        };
        let Ok(id) = id.parse::<u64>() else {
            return false;
        };
        match *root {
            "application_plans" => self.find_plan(id).is_some(),
            _ => self
                .collections
                .get(*root)
                .is_some_and(|c| c.contains_key(&id)),
        }
    }

    fn list(&self, collection: &str) -> ResponseTemplate {
        if !self.parent_exists(collection) {
            return not_found();
        }
        let segment = collection.rsplit('/').next().unwrap_or(collection);
        let (entity_key, list_key) = envelope(segment);
        let items: Vec<Value> = self
            .collections
            .get(collection)
            .into_iter()
            .flat_map(BTreeMap::values)
            .map(|entity| json!({ entity_key: entity }))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ list_key: items }))
    }

    fn read(&self, collection: &str, id: u64) -> ResponseTemplate {
        let segment = collection.rsplit('/').next().unwrap_or(collection);
        let (entity_key, _) = envelope(segment);
        match self.collections.get(collection).and_then(|c| c.get(&id)) {
            Some(entity) => ResponseTemplate::new(200).set_body_json(json!({ entity_key: entity })),
            None => not_found(),
        }
    }

    fn create(&mut self, collection: &str, mut params: Entity) -> ResponseTemplate {
        if !self.parent_exists(collection) {
            return not_found();
        }
        let segment = collection.rsplit('/').next().unwrap_or(collection).to_string();

        if segment == "metrics" && blank(&params, "system_name") {
            if let Some(Value::String(friendly)) = params.get("friendly_name") {
                let derived = friendly.trim().to_lowercase().replace(' ', "_");
                params.insert("system_name".into(), json!(derived));
            }
        }
        if let Err(response) = self.validate(collection, &segment, &params, None) {
            return response;
        }

        self.next_id += 1;
        let id = self.next_id;
        params.insert("id".into(), json!(id));

        match segment.as_str() {
            "services" => {
                self.insert_proxy(id);
                let mut hits = Entity::from_iter([
                    ("system_name".to_string(), json!("hits")),
                    ("friendly_name".to_string(), json!("Hits")),
                    ("unit".to_string(), json!("hit")),
                ]);
                self.next_id += 1;
                let hits_id = self.next_id;
                hits.insert("id".into(), json!(hits_id));
                hits.insert("service_id".into(), json!(id));
                self.collections
                    .entry(format!("services/{}/metrics", id))
                    .or_default()
                    .insert(hits_id, hits);
            }
            "applications" => {
                params.insert(
                    USER_KEY_PARAM.into(),
                    json!(uuid::Uuid::new_v4().simple().to_string()),
                );
                params.insert("state".into(), json!("live"));
            }
            "accounts" => {
                params.remove("password");
                params.insert("state".into(), json!("approved"));
            }
            _ => {}
        }

        let (entity_key, _) = envelope(&segment);
        let response = ResponseTemplate::new(201).set_body_json(json!({ entity_key: &params }));
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, params);
        response
    }

    fn update(&mut self, collection: &str, id: u64, params: Entity) -> ResponseTemplate {
        let segment = collection.rsplit('/').next().unwrap_or(collection).to_string();
        let Some(current) = self.collections.get(collection).and_then(|c| c.get(&id)) else {
            return not_found();
        };
        let mut merged = current.clone();
        merged.extend(params);
        merged.insert("id".into(), json!(id));

        if let Err(response) = self.validate(collection, &segment, &merged, Some(id)) {
            return response;
        }

        let (entity_key, _) = envelope(&segment);
        let response = ResponseTemplate::new(200).set_body_json(json!({ entity_key: &merged }));
        if let Some(c) = self.collections.get_mut(collection) {
            c.insert(id, merged);
        }
        response
    }

    fn delete(&mut self, collection: &str, id: u64) -> ResponseTemplate {
        let removed = self
            .collections
            .get_mut(collection)
            .and_then(|c| c.remove(&id));
        if removed.is_none() {
            return not_found();
        }

        let prefix = format!("{}/{}/", collection, id);
        self.collections.retain(|key, _| !key.starts_with(&prefix));
        if collection.ends_with("application_plans") {
            let limits = format!("application_plans/{}/", id);
            self.collections.retain(|key, _| !key.starts_with(&limits));
        }
        if collection == "services" {
            self.proxies.remove(&id);
            self.published.remove(&id);
        }
        ResponseTemplate::new(200)
    }

    fn validate(
        &self,
        collection: &str,
        segment: &str,
        params: &Entity,
        own_id: Option<u64>,
    ) -> Result<(), ResponseTemplate> {
        let mut errors: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut require = |key: &'static str| {
            if blank(params, key) {
                errors.entry(key).or_default().push("can't be blank");
            }
        };

        match segment {
            "metrics" => {
                require("friendly_name");
                require("unit");
                if let Some(Value::String(name)) = params.get("system_name") {
                    let valid = !name.is_empty()
                        && name
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
                    if !valid {
                        errors.entry("system_name").or_default().push("invalid");
                    } else if self.taken(collection, "system_name", name, own_id) {
                        errors
                            .entry("system_name")
                            .or_default()
                            .push("has already been taken");
                    }
                }
            }
            "services" | "application_plans" | "applications" => require("name"),
            "mapping_rules" => {
                require("http_method");
                require("pattern");
                require("metric_id");
            }
            "limits" => {
                require("period");
                if params.get("value").and_then(Value::as_u64).is_none() {
                    errors.entry("value").or_default().push("is not a number");
                }
            }
            "accounts" => {
                require("username");
                require("email");
                require("org_name");
            }
            _ => {}
        }

        if segment == "applications" {
            let plan = as_id(params.get("plan_id")).and_then(|id| self.find_plan(id));
            if plan.is_none() {
                errors.entry("plan").or_default().push("must exist");
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(invalid(errors))
        }
    }

    fn taken(&self, collection: &str, key: &str, value: &str, own_id: Option<u64>) -> bool {
        self.collections.get(collection).is_some_and(|c| {
            c.iter()
                .any(|(id, e)| Some(*id) != own_id && e.get(key).and_then(Value::as_str) == Some(value))
        })
    }

    /// Service id owning application plan `plan_id`.
    fn find_plan(&self, plan_id: u64) -> Option<u64> {
        self.collections.iter().find_map(|(key, plans)| {
            let service = key
                .strip_prefix("services/")?
                .strip_suffix("/application_plans")?;
            plans.contains_key(&plan_id).then(|| service.parse().ok())?
        })
    }

    fn insert_proxy(&mut self, service_id: u64) {
        let proxy = Entity::from_iter([
            ("service_id".to_string(), json!(service_id)),
            ("endpoint".to_string(), json!(format!("{}:80", self.base_url))),
            ("api_backend".to_string(), json!("https://echo-api.3scale.net:443")),
            ("sandbox_endpoint".to_string(), json!(self.base_url)),
            ("auth_user_key".to_string(), json!(USER_KEY_PARAM)),
            ("credentials_location".to_string(), json!("query")),
        ]);
        self.proxies.insert(service_id, proxy);
    }

    fn proxy(&mut self, method: &str, service_id: u64, params: Entity) -> ResponseTemplate {
        let Some(proxy) = self.proxies.get_mut(&service_id) else {
            return not_found();
        };
        if method != "GET" {
            proxy.extend(params);
        }
        let body = json!({ "proxy": proxy.clone() });
        if method != "GET" {
            self.publish(service_id);
        }
        ResponseTemplate::new(200).set_body_json(body)
    }

    /// Snapshot the service's rules into the gateway.
    fn publish(&mut self, service_id: u64) {
        let rules = self
            .collections
            .get(&format!("services/{}/proxy/mapping_rules", service_id))
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        self.published.insert(service_id, rules);
        self.pending_lag = self.propagation_lag;
    }

    fn gateway(&mut self, path: &str, user_key: Option<String>) -> ResponseTemplate {
        let Some((app_id, plan_id)) = user_key.and_then(|key| self.find_application(&key)) else {
            return ResponseTemplate::new(403).set_body_string("Authentication failed");
        };
        let Some(service_id) = self.find_plan(plan_id) else {
            return ResponseTemplate::new(403).set_body_string("Authentication failed");
        };

        if self.pending_lag > 0 {
            self.pending_lag -= 1;
            return ResponseTemplate::new(200).set_body_string("stale configuration");
        }

        let metric_id = self
            .published
            .get(&service_id)
            .into_iter()
            .flatten()
            .find(|rule| {
                rule.get("pattern")
                    .and_then(Value::as_str)
                    .is_some_and(|pattern| path.starts_with(pattern))
            })
            .and_then(|rule| as_id(rule.get("metric_id")));
        let Some(metric_id) = metric_id else {
            return ResponseTemplate::new(404).set_body_string("No Mapping Rule matched");
        };

        let limit = self
            .collections
            .get(&format!(
                "application_plans/{}/metrics/{}/limits",
                plan_id, metric_id
            ))
            .and_then(|limits| {
                limits
                    .values()
                    .filter_map(|l| l.get("value").and_then(Value::as_u64))
                    .min()
            });

        let used = self.usage.entry((app_id, metric_id)).or_insert(0);
        match limit {
            Some(0) => ResponseTemplate::new(403).set_body_string("Limits exceeded"),
            Some(max) if *used >= max => {
                ResponseTemplate::new(429).set_body_string("Limits exceeded")
            }
            _ => {
                *used += 1;
                ResponseTemplate::new(200).set_body_json(json!({"path": path}))
            }
        }
    }

    /// (application id, plan id) of the application holding `user_key`.
    fn find_application(&self, user_key: &str) -> Option<(u64, u64)> {
        self.collections
            .iter()
            .filter(|(key, _)| key.ends_with("/applications"))
            .flat_map(|(_, apps)| apps.iter())
            .find(|(_, app)| app.get(USER_KEY_PARAM).and_then(Value::as_str) == Some(user_key))
            .and_then(|(id, app)| Some((*id, as_id(app.get("plan_id"))?)))
    }
}
