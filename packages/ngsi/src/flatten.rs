//! Generic flattener driven by a [`CategoryDefinition`].
//!
//! Every record gets the category's own fields plus the same skeleton
//! (`id` plus its aliases, `type`, `latitude`, `longitude`, `city`).

use serde_json::Value;
use smart_city_ngsi_models::FlatRecord;

use crate::extract::{get_location, locality};
use crate::field_map::CategoryDefinition;

/// Flattens one NGSI-LD entity into a display-ready record.
///
/// Never fails: attributes the entity lacks are filled with the defaults
/// configured in `definition`. `id` and `type` are copied verbatim (`null`
/// if the entity has none).
#[must_use]
pub fn flatten(definition: &CategoryDefinition, entity: &Value) -> FlatRecord {
    let mut record = FlatRecord::new();

    // ── Category fields ──────────────────────────────────────
    for field in &definition.fields {
        record.insert(field.output.as_str(), field.extract.extract(entity));
    }

    // ── Identity ─────────────────────────────────────────────
    // Written after the category fields so they always win.
    let id = entity.get("id").cloned().unwrap_or(Value::Null);
    for alias in &definition.id_aliases {
        record.insert(alias.as_str(), id.clone());
    }
    record.insert("id", id);
    record.insert("type", entity.get("type").cloned().unwrap_or(Value::Null));

    // ── Location ─────────────────────────────────────────────
    let location = get_location(entity.get("location"));
    record.insert("latitude", Value::from(location.latitude));
    record.insert("longitude", Value::from(location.longitude));
    record.insert("city", Value::String(locality(entity)));

    record
}

/// Flattens every entity in `entities` with the same definition.
#[must_use]
pub fn flatten_all(definition: &CategoryDefinition, entities: &[Value]) -> Vec<FlatRecord> {
    entities.iter().map(|e| flatten(definition, e)).collect()
}
