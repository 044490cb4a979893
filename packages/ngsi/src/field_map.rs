//! Config-driven field maps for flattening NGSI-LD entities.
//!
//! [`CategoryDefinition`] captures everything unique about one entity
//! category in a serializable struct: which NGSI-LD types belong to it,
//! which extra keys repeat the entity id, and how every output key is
//! extracted. A single generic flattener ([`crate::flatten`]) handles all
//! categories, so adding a category means writing a TOML file.

use serde::Deserialize;
use serde_json::Value;
use smart_city_ngsi_models::EntityCategory;

use crate::attribute::{get_in, get_value, is_truthy};
use crate::extract::{AddressPart, address_part, get_address};

// ── Top-level category definition ────────────────────────────────────────

/// A complete, config-driven field map for one entity category.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryDefinition {
    /// The category this definition flattens.
    pub category: EntityCategory,
    /// NGSI-LD `type` values that belong to this category (e.g.
    /// `["StreetLight"]`). Matching is exact.
    pub entity_types: Vec<String>,
    /// Extra output keys that repeat the entity id (e.g. `entity_id`).
    #[serde(default = "default_id_aliases")]
    pub id_aliases: Vec<String>,
    /// Category-specific output fields, applied in order.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

fn default_id_aliases() -> Vec<String> {
    vec!["entity_id".to_string()]
}

/// Keys every flat record carries regardless of category. Field maps may
/// not write to them.
pub const RESERVED_KEYS: [&str; 5] = ["id", "type", "latitude", "longitude", "city"];

impl CategoryDefinition {
    /// Checks that no id alias or field writes to a [`RESERVED_KEYS`] entry
    /// and that every output key is written once.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending key.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen: Vec<&str> = Vec::new();
        let outputs = self
            .id_aliases
            .iter()
            .chain(self.fields.iter().map(|f| &f.output));

        for key in outputs {
            if RESERVED_KEYS.contains(&key.as_str()) {
                return Err(format!(
                    "{}: output key `{key}` is reserved",
                    self.category
                ));
            }
            if seen.contains(&key.as_str()) {
                return Err(format!(
                    "{}: output key `{key}` is written more than once",
                    self.category
                ));
            }
            seen.push(key);
        }

        Ok(())
    }
}

/// One output key and how to extract it.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    /// Snake-case key in the flat record.
    pub output: String,
    /// Extraction strategy.
    pub extract: Extractor,
}

// ── Strategy enums ───────────────────────────────────────────────────────

/// How to extract one output value from an entity.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Extractor {
    /// Unwrap a top-level attribute.
    Value {
        /// NGSI-LD attribute name.
        attr: String,
        /// What to produce when the attribute is missing or empty.
        #[serde(default)]
        default: Fallback,
    },
    /// Read one field out of the value of an object-valued Property, e.g.
    /// `features.value.hasCamera`.
    Nested {
        /// NGSI-LD attribute holding the object.
        parent: String,
        /// Key inside the object's value.
        field: String,
        /// What to produce when any step is missing or empty.
        #[serde(default)]
        default: Fallback,
    },
    /// Join the street, locality, and country of an address Property.
    Address {
        /// NGSI-LD attribute holding the `PostalAddress`.
        #[serde(default = "default_address_attr")]
        attr: String,
    },
    /// A single part of the `address` Property, falling back to another
    /// attribute and finally to `""`.
    AddressPart {
        /// Which address part to read.
        part: AddressPart,
        /// Attribute to use when the part is empty.
        fallback: Option<String>,
    },
}

fn default_address_attr() -> String {
    "address".to_string()
}

/// Replacement value for a missing attribute.
///
/// [`Fallback::Null`] only replaces *absent* values, so a present `0` or
/// `false` is kept. The other fallbacks also replace empty values (`null`,
/// `false`, `0`, `""`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// `null`
    #[default]
    Null,
    /// `false`, for feature flags.
    False,
    /// `""`, for text shown verbatim.
    EmptyString,
    /// `[]`, for sequence attributes.
    EmptyList,
}

impl Fallback {
    /// Applies this fallback to an extracted value.
    #[must_use]
    pub fn apply(self, value: Option<&Value>) -> Value {
        match self {
            Self::Null => value.cloned().unwrap_or(Value::Null),
            Self::False | Self::EmptyString | Self::EmptyList => match value {
                Some(v) if is_truthy(v) => v.clone(),
                _ => self.value(),
            },
        }
    }

    /// The replacement value itself.
    #[must_use]
    pub fn value(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::False => Value::Bool(false),
            Self::EmptyString => Value::String(String::new()),
            Self::EmptyList => Value::Array(Vec::new()),
        }
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

impl Extractor {
    /// Extracts a value from an entity. Never fails; missing data yields
    /// the configured fallback.
    #[must_use]
    pub fn extract(&self, entity: &Value) -> Value {
        match self {
            Self::Value { attr, default } => {
                let value = get_value(entity.get(attr));
                default.apply(Some(&value).filter(|v| !v.is_null()))
            }
            Self::Nested {
                parent,
                field,
                default,
            } => default.apply(get_in(entity, &[parent.as_str(), "value", field.as_str()])),
            Self::Address { attr } => Value::String(get_address(entity.get(attr))),
            Self::AddressPart { part, fallback } => {
                let text = address_part(entity, *part);
                if !text.is_empty() {
                    return Value::String(text);
                }
                fallback
                    .as_deref()
                    .map(|attr| get_value(entity.get(attr)))
                    .filter(is_truthy)
                    .unwrap_or_else(|| Value::String(String::new()))
            }
        }
    }
}

/// Parses a [`CategoryDefinition`] from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is malformed, missing required fields, or
/// fails [`CategoryDefinition::validate`].
pub fn parse_category_toml(toml_str: &str) -> Result<CategoryDefinition, String> {
    let definition: CategoryDefinition = toml::de::from_str(toml_str).map_err(|e| e.to_string())?;
    definition.validate()?;
    Ok(definition)
}
