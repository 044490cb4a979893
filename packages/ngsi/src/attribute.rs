//! NGSI-LD attribute classification and value unwrapping.
//!
//! An attribute on an entity may be a Property wrapper (`{"value": ..}`),
//! a bare value, or missing entirely. [`Attribute`] names those three cases
//! so that unwrapping is a single match instead of ad hoc shape checks.

use serde_json::Value;

/// Key that marks an object as a Property wrapper.
const VALUE_KEY: &str = "value";

/// One attribute of an NGSI-LD entity, classified by shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attribute<'a> {
    /// The attribute is missing or explicitly `null`.
    Absent,
    /// A bare value: scalar, array, or an object without a `value` key.
    Scalar(&'a Value),
    /// The payload of a Property wrapper. May itself be `null`, `0`,
    /// `false`, `""`, or `[]`.
    Wrapped(&'a Value),
}

impl<'a> Attribute<'a> {
    /// Classifies an optional raw attribute value.
    #[must_use]
    pub fn classify(raw: Option<&'a Value>) -> Self {
        match raw {
            None | Some(Value::Null) => Self::Absent,
            // `Value::get` only matches keys on objects, so arrays and
            // scalars fall through to `Scalar`.
            Some(raw) => raw.get(VALUE_KEY).map_or(Self::Scalar(raw), Self::Wrapped),
        }
    }

    /// Classifies the attribute `name` of `entity`.
    #[must_use]
    pub fn of(entity: &'a Value, name: &str) -> Self {
        Self::classify(entity.get(name))
    }

    /// Returns the unwrapped value, or `None` when absent.
    #[must_use]
    pub const fn value(self) -> Option<&'a Value> {
        match self {
            Self::Absent => None,
            Self::Scalar(v) | Self::Wrapped(v) => Some(v),
        }
    }

    /// Returns `true` if the attribute is absent.
    #[must_use]
    pub const fn is_absent(self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Extracts the payload of an NGSI-LD Property.
///
/// * absent / `null` → `null`
/// * an object with a `value` key → that value, even when it is falsy
/// * anything else → returned unchanged
#[must_use]
pub fn get_value(property: Option<&Value>) -> Value {
    Attribute::classify(property)
        .value()
        .cloned()
        .unwrap_or(Value::Null)
}

/// Walks `path` through nested objects starting at `root`.
///
/// Returns `None` as soon as a step is missing, `null`, or not an object.
#[must_use]
pub fn get_in<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for key in path {
        current = current.as_object()?.get(*key)?;
        if current.is_null() {
            return None;
        }
    }
    Some(current)
}

/// Returns `true` for values a display layer treats as "set": anything
/// except `null`, `false`, zero, and the empty string.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn absent_and_null_yield_null() {
        assert_eq!(get_value(None), Value::Null);
        assert_eq!(get_value(Some(&Value::Null)), Value::Null);
    }

    #[test]
    fn keeps_falsy_wrapped_values() {
        assert_eq!(get_value(Some(&json!({"value": 0}))), json!(0));
        assert_eq!(get_value(Some(&json!({"value": false}))), json!(false));
        assert_eq!(get_value(Some(&json!({"value": ""}))), json!(""));
        assert_eq!(get_value(Some(&json!({"value": []}))), json!([]));
        assert_eq!(get_value(Some(&json!({"value": null}))), Value::Null);
    }

    #[test]
    fn passes_bare_values_through() {
        assert_eq!(get_value(Some(&json!(42))), json!(42));
        assert_eq!(get_value(Some(&json!("on"))), json!("on"));
        assert_eq!(get_value(Some(&json!([1, 2]))), json!([1, 2]));
    }

    #[test]
    fn passes_objects_without_value_key_through() {
        assert_eq!(get_value(Some(&json!({"foo": 1}))), json!({"foo": 1}));
        // Relationships carry `object`, not `value`.
        let rel = json!({"type": "Relationship", "object": "urn:ngsi-ld:Sensor:1"});
        assert_eq!(get_value(Some(&rel)), rel);
    }

    #[test]
    fn unwraps_property_with_metadata() {
        let prop = json!({"type": "Property", "value": 21.5, "unitCode": "CEL"});
        assert_eq!(get_value(Some(&prop)), json!(21.5));
    }

    #[test]
    fn classifies_entity_attributes() {
        let entity = json!({
            "id": "urn:ngsi-ld:Parking:1",
            "name": {"value": "Central"},
            "capacity": 30,
            "closed": null
        });
        assert_eq!(Attribute::of(&entity, "name"), Attribute::Wrapped(&json!("Central")));
        assert_eq!(Attribute::of(&entity, "capacity"), Attribute::Scalar(&json!(30)));
        assert!(Attribute::of(&entity, "closed").is_absent());
        assert!(Attribute::of(&entity, "missing").is_absent());
    }

    #[test]
    fn get_in_walks_nested_objects() {
        let entity = json!({"waterQuality": {"value": {"phLevel": 7.2, "turbidity": null}}});
        assert_eq!(
            get_in(&entity, &["waterQuality", "value", "phLevel"]),
            Some(&json!(7.2))
        );
        assert_eq!(get_in(&entity, &["waterQuality", "value", "turbidity"]), None);
        assert_eq!(get_in(&entity, &["waterQuality", "value", "chlorine"]), None);
        assert_eq!(get_in(&entity, &["features", "value", "hasCamera"]), None);
    }

    #[test]
    fn get_in_stops_at_non_objects() {
        let entity = json!({"waterQuality": {"value": "unknown"}});
        assert_eq!(get_in(&entity, &["waterQuality", "value", "phLevel"]), None);
    }

    #[test]
    fn truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!("")] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!(-0.5), json!("x"), json!([]), json!({})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }
}
