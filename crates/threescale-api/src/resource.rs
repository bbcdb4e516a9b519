//! Generic resource handles and collections.
//!
//! The API wraps every entity in an envelope keyed by its type
//! (`{"metric": {...}}`) and every list in a collection envelope
//! (`{"metrics": [{"metric": {...}}, ...]}`). [`Kind`] carries those
//! names per entity type; [`Collection`] and [`Resource`] do the CRUD.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Index;

use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use threescale_telemetry::{log_resource_created, log_resource_deleted};

use crate::error::ApiError;
use crate::rest::RestApiClient;

/// Naming and routing metadata for an entity type.
pub trait Kind: Send + Sync + 'static {
    /// Envelope key of a single entity, e.g. `metric`.
    const ENTITY: &'static str;
    /// Envelope key of a list response, e.g. `metrics`.
    const COLLECTION: &'static str;
    /// URL segment of the collection, e.g. `metrics`.
    const PATH: &'static str;
    /// Method used to update an entity.
    const UPDATE_METHOD: Method = Method::PUT;

    /// Path that receives create requests.
    fn create_path(collection_path: &str) -> String {
        collection_path.to_string()
    }
}

static NULL: Value = Value::Null;

/// A single entity fetched from the API.
///
/// Holds the decoded entity fields and the member path used for
/// subsequent reads, updates and deletes.
pub struct Resource<K: Kind> {
    rest: RestApiClient,
    path: String,
    entity: Map<String, Value>,
    _kind: PhantomData<K>,
}

impl<K: Kind> Resource<K> {
    pub(crate) fn new(rest: RestApiClient, path: String, entity: Map<String, Value>) -> Self {
        Self {
            rest,
            path,
            entity,
            _kind: PhantomData,
        }
    }

    /// Numeric entity id, when the entity carries one.
    pub fn id(&self) -> Option<u64> {
        self.entity.get("id").and_then(value_as_id)
    }

    /// Entity id, or [`ApiError::MissingId`] when the entity has none.
    pub fn require_id(&self) -> Result<u64, ApiError> {
        self.id().ok_or(ApiError::MissingId { entity: K::ENTITY })
    }

    /// Field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entity.get(key)
    }

    /// Field value as a string slice.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.entity.get(key).and_then(Value::as_str)
    }

    /// All entity fields.
    pub fn entity(&self) -> &Map<String, Value> {
        &self.entity
    }

    /// Member path of this entity (without the `.json` suffix).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn rest(&self) -> &RestApiClient {
        &self.rest
    }

    /// Fetch the current representation.
    pub async fn read(&self) -> Result<Resource<K>, ApiError> {
        let body = self.rest.get(&self.path).await?;
        let entity = unwrap_entity::<K>(body)?;
        Ok(Resource::new(self.rest.clone(), self.path.clone(), entity))
    }

    /// Apply `params` and return the updated representation.
    pub async fn update<P: Serialize + ?Sized>(
        &self,
        params: &P,
    ) -> Result<Resource<K>, ApiError> {
        let body = self
            .rest
            .request(K::UPDATE_METHOD, &self.path, &[], Some(params))
            .await?;
        let entity = unwrap_entity::<K>(body)?;
        Ok(Resource::new(self.rest.clone(), self.path.clone(), entity))
    }

    /// Delete the entity.
    pub async fn delete(&self) -> Result<(), ApiError> {
        self.rest.delete(&self.path).await?;
        log_resource_deleted!(entity = K::ENTITY, path = %self.path, "resource deleted");
        Ok(())
    }

    /// Whether the entity still exists on the server.
    pub async fn exists(&self) -> Result<bool, ApiError> {
        match self.rest.get(&self.path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl<K: Kind> Clone for Resource<K> {
    fn clone(&self) -> Self {
        Self::new(self.rest.clone(), self.path.clone(), self.entity.clone())
    }
}

impl<K: Kind> fmt::Debug for Resource<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("kind", &K::ENTITY)
            .field("path", &self.path)
            .field("entity", &self.entity)
            .finish()
    }
}

/// `resource["field"]`; missing fields index to `null`.
impl<K: Kind> Index<&str> for Resource<K> {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        self.entity.get(key).unwrap_or(&NULL)
    }
}

/// A collection endpoint for one entity type.
pub struct Collection<K: Kind> {
    rest: RestApiClient,
    path: String,
    _kind: PhantomData<K>,
}

impl<K: Kind> Collection<K> {
    /// Collection of `K` nested under `parent_path`.
    pub(crate) fn new(rest: RestApiClient, parent_path: &str) -> Self {
        Self::at(rest, format!("{}/{}", parent_path.trim_end_matches('/'), K::PATH))
    }

    /// Collection rooted at an explicit path.
    pub(crate) fn at(rest: RestApiClient, path: String) -> Self {
        Self {
            rest,
            path,
            _kind: PhantomData,
        }
    }

    /// Collection path (without the `.json` suffix).
    pub fn path(&self) -> &str {
        &self.path
    }

    fn member_path(&self, id: u64) -> String {
        format!("{}/{}", self.path, id)
    }

    /// Create a new entity.
    pub async fn create<P: Serialize + ?Sized>(
        &self,
        params: &P,
    ) -> Result<Resource<K>, ApiError> {
        let body = self.rest.post(&K::create_path(&self.path), Some(params)).await?;
        let resource = self.wrap(body)?;
        log_resource_created!(
            entity = K::ENTITY,
            id = resource.id().unwrap_or_default(),
            "resource created"
        );
        Ok(resource)
    }

    /// List all entities in the collection.
    pub async fn list(&self) -> Result<Vec<Resource<K>>, ApiError> {
        let body = self.rest.get(&self.path).await?;
        let items = match body {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove(K::COLLECTION) {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => {
                    return Err(ApiError::UnexpectedBody {
                        reason: format!("{} is not a list: {}", K::COLLECTION, other),
                    })
                }
            },
            Value::Null => Vec::new(),
            other => {
                return Err(ApiError::UnexpectedBody {
                    reason: format!("expected {} list, got {}", K::COLLECTION, other),
                })
            }
        };

        items.into_iter().map(|item| self.wrap(item)).collect()
    }

    /// Fetch one entity by id.
    pub async fn read(&self, id: u64) -> Result<Resource<K>, ApiError> {
        let path = self.member_path(id);
        let body = self.rest.get(&path).await?;
        let entity = unwrap_entity::<K>(body)?;
        Ok(Resource::new(self.rest.clone(), path, entity))
    }

    /// Delete one entity by id.
    pub async fn delete(&self, id: u64) -> Result<(), ApiError> {
        let path = self.member_path(id);
        self.rest.delete(&path).await?;
        log_resource_deleted!(entity = K::ENTITY, path = %path, "resource deleted");
        Ok(())
    }

    /// Whether an entity with `id` exists.
    pub async fn exists(&self, id: u64) -> Result<bool, ApiError> {
        match self.rest.get(&self.member_path(id)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Entities whose `key` field equals `value`.
    pub async fn select_by(&self, key: &str, value: &Value) -> Result<Vec<Resource<K>>, ApiError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.get(key) == Some(value))
            .collect())
    }

    fn wrap(&self, body: Value) -> Result<Resource<K>, ApiError> {
        let entity = unwrap_entity::<K>(body)?;
        let id = entity
            .get("id")
            .and_then(value_as_id)
            .ok_or_else(|| ApiError::UnexpectedBody {
                reason: format!("{} without id", K::ENTITY),
            })?;
        Ok(Resource::new(self.rest.clone(), self.member_path(id), entity))
    }
}

impl<K: Kind> Clone for Collection<K> {
    fn clone(&self) -> Self {
        Self::at(self.rest.clone(), self.path.clone())
    }
}

impl<K: Kind> fmt::Debug for Collection<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("kind", &K::ENTITY)
            .field("path", &self.path)
            .finish()
    }
}

/// Strip the `{"<entity>": {...}}` envelope, accepting bare objects too.
pub(crate) fn unwrap_entity<K: Kind>(body: Value) -> Result<Map<String, Value>, ApiError> {
    match body {
        Value::Object(mut map) => match map.remove(K::ENTITY) {
            Some(Value::Object(inner)) => Ok(inner),
            Some(other) => Err(ApiError::UnexpectedBody {
                reason: format!("{} is not an object: {}", K::ENTITY, other),
            }),
            None => Ok(map),
        },
        other => Err(ApiError::UnexpectedBody {
            reason: format!("expected {} object, got {}", K::ENTITY, other),
        }),
    }
}

/// Ids arrive as numbers, but some endpoints render them as strings.
fn value_as_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
