//! Assertion helpers for resources and API errors.
//!
//! These panic with a descriptive message on failure, like the std
//! `assert!` family, and report the caller's location.

use serde_json::Value;
use threescale_api::{ApiError, Kind, Resource};

/// Assert that `resource` is a materialized entity with an id.
#[track_caller]
pub fn assert_resource<K: Kind>(resource: &Resource<K>) {
    assert!(
        !resource.entity().is_empty(),
        "{} has no fields",
        K::ENTITY
    );
    assert!(
        resource.id().is_some(),
        "{} has no id: {:?}",
        K::ENTITY,
        resource.entity()
    );
}

/// Assert that every key of `params` is present in `resource` with an equal value.
#[track_caller]
pub fn assert_resource_params<K: Kind>(resource: &Resource<K>, params: &Value) {
    let mismatches = param_mismatches(resource, params);
    assert!(
        mismatches.is_empty(),
        "{} fields differ from expected params: {}",
        K::ENTITY,
        mismatches.join("; ")
    );
}

/// Assert that `error` carries field errors for every name in `fields`.
///
/// Order-independent containment: extra fields in the error are fine.
#[track_caller]
pub fn assert_errors_contains(error: &ApiError, fields: &[&str]) {
    let errors = match error.field_errors() {
        Some(errors) => errors,
        None => panic!("expected validation errors for {:?}, got: {}", fields, error),
    };
    let missing: Vec<&str> = fields
        .iter()
        .copied()
        .filter(|f| errors.messages(f).is_empty())
        .collect();
    assert!(
        missing.is_empty(),
        "validation errors missing {:?}; got {:?}",
        missing,
        errors.fields()
    );
}

/// Assert that a read failed because the entity does not exist.
#[track_caller]
pub fn assert_not_found<T: std::fmt::Debug>(result: &Result<T, ApiError>) {
    match result {
        Err(e) if e.is_not_found() => {}
        other => panic!("expected not found, got {:?}", other),
    }
}

/// Keys of `params` whose value in `resource` is absent or different.
///
/// Non-object `params` yield a single mismatch.
pub fn param_mismatches<K: Kind>(resource: &Resource<K>, params: &Value) -> Vec<String> {
    let Some(expected) = params.as_object() else {
        return vec![format!("params are not an object: {}", params)];
    };

    expected
        .iter()
        .filter_map(|(key, value)| match resource.get(key) {
            Some(actual) if values_match(actual, value) => None,
            Some(actual) => Some(format!("{}: expected {}, got {}", key, value, actual)),
            None => Some(format!("{}: missing", key)),
        })
        .collect()
}

/// JSON equality, treating a number and its string rendering as equal.
///
/// Form-encoded writes come back typed, so `"1"` sent can read back as `1`.
fn values_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        _ => actual == expected,
    }
}
