//! Client for the 3scale account management REST API.
//!
//! Resources are reached by navigating from [`ThreeScaleClient`]:
//!
//! ```ignore
//! use serde_json::json;
//! use threescale_api::{ClientConfig, LimitParams, Period, ThreeScaleClient};
//!
//! let client = ThreeScaleClient::new(ClientConfig::new(url, token))?;
//! let service = client.services().read(service_id).await?;
//! let metric = service
//!     .metrics()
//!     .create(&json!({"system_name": "hits_2", "unit": "hit", "friendly_name": "Hits 2"}))
//!     .await?;
//! plan.limits(&metric)?.create(&LimitParams::new(Period::Day, 100)).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod resource;
pub mod resources;
pub mod rest;

pub use client::ThreeScaleClient;
pub use config::ClientConfig;
pub use error::{ApiError, ValidationErrors};
pub use resource::{Collection, Kind, Resource};
pub use resources::{
    Account, Application, ApplicationPlan, Limit, LimitParams, MappingRule, MappingRuleParams,
    Metric, Period, Proxy, ProxyClient, Service,
};
pub use rest::RestApiClient;

pub use reqwest::StatusCode;
