#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! NGSI-LD entity normalization for the smart-city dashboard.
//!
//! Context brokers return entities whose attributes are wrapped in
//! Property / `GeoProperty` objects. This crate flattens them into
//! [`FlatRecord`]s using declarative, TOML-defined field maps (one per
//! [`EntityCategory`]) so display code never has to unwrap anything.
//!
//! Flattening is total: a partially-populated entity produces a record full
//! of defaults, never an error. Errors only exist at the edges (reading
//! payloads, loading mapping overrides, talking to a broker) and are
//! reported through [`NgsiError`].

pub mod attribute;
pub mod broker;
pub mod builder;
pub mod categories;
pub mod extract;
pub mod field_map;
pub mod flatten;
pub mod registry;
pub mod retry;

use std::path::PathBuf;

pub use smart_city_ngsi_models::{CategoryGroup, EntityCategory, FlatRecord, Location};

/// Errors that can occur at the boundaries of the normalizer.
#[derive(Debug, thiserror::Error)]
pub enum NgsiError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A field-mapping file could not be parsed.
    #[error("Invalid mapping {}: {message}", path.display())]
    Mapping {
        /// File the mapping was loaded from.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// The payload is not an array of entity objects.
    #[error("Invalid payload: {message}")]
    InvalidPayload {
        /// Description of what went wrong.
        message: String,
    },

    /// The context broker answered with a non-retryable status.
    #[error("Context broker error: {message}")]
    Broker {
        /// Description of what went wrong.
        message: String,
    },
}

/// Parses a JSON document holding an array of NGSI-LD entities.
///
/// Only the outer shape is validated (an array of objects). Attribute
/// contents are left alone since flattening tolerates anything.
///
/// # Errors
///
/// Returns [`NgsiError::Json`] if the text is not valid JSON and
/// [`NgsiError::InvalidPayload`] if it is not an array of objects.
pub fn parse_entities(json: &str) -> Result<Vec<serde_json::Value>, NgsiError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    entities_from_value(value)
}

/// Validates that an already-parsed JSON value is an array of entity
/// objects and returns its elements.
///
/// # Errors
///
/// Returns [`NgsiError::InvalidPayload`] if `value` is not an array or
/// any element is not an object.
pub fn entities_from_value(value: serde_json::Value) -> Result<Vec<serde_json::Value>, NgsiError> {
    let serde_json::Value::Array(entities) = value else {
        return Err(NgsiError::InvalidPayload {
            message: format!("expected a JSON array, got {}", json_kind(&value)),
        });
    };

    if let Some((idx, bad)) = entities.iter().enumerate().find(|(_, e)| !e.is_object()) {
        return Err(NgsiError::InvalidPayload {
            message: format!("element {idx} is {}, expected an object", json_kind(bad)),
        });
    }

    Ok(entities)
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
