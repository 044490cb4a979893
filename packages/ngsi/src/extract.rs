//! Location and postal-address extraction shared by every category.

use serde::Deserialize;
use serde_json::Value;
use smart_city_ngsi_models::Location;

use crate::attribute::get_in;

/// Separator between non-empty postal-address parts.
const ADDRESS_SEPARATOR: &str = ", ";

/// A single field of a schema.org `PostalAddress` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressPart {
    /// `streetAddress`
    Street,
    /// `addressLocality` (the city)
    Locality,
    /// `addressCountry`
    Country,
}

impl AddressPart {
    /// Parts in display order.
    pub const ORDERED: [Self; 3] = [Self::Street, Self::Locality, Self::Country];

    /// The NGSI-LD key this part is stored under.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Street => "streetAddress",
            Self::Locality => "addressLocality",
            Self::Country => "addressCountry",
        }
    }
}

/// Reads a `GeoProperty` point into a [`Location`].
///
/// `GeoJSON` stores `[longitude, latitude]`; the result names both. A
/// missing property, missing `value`, or missing `coordinates` produces
/// `(0, 0)`, and so does any element that is not a number.
#[must_use]
pub fn get_location(geo_property: Option<&Value>) -> Location {
    let Some(point) = geo_property.and_then(|g| get_in(g, &["value"])) else {
        return Location::default();
    };

    let Some(coords) = point.get("coordinates").and_then(Value::as_array) else {
        return Location::default();
    };

    let coord = |idx: usize| coords.get(idx).and_then(Value::as_f64).unwrap_or(0.0);

    Location {
        longitude: coord(0),
        latitude: coord(1),
    }
}

/// Joins the non-empty street, locality, and country parts of an address
/// Property with `", "`.
///
/// Returns an empty string when the property or its value is missing.
#[must_use]
pub fn get_address(address_property: Option<&Value>) -> String {
    let Some(address) = address_property.and_then(|a| get_in(a, &["value"])) else {
        return String::new();
    };

    let parts: Vec<String> = AddressPart::ORDERED
        .iter()
        .filter_map(|part| address.get(part.key()).and_then(address_text))
        .filter(|s| !s.is_empty())
        .collect();

    parts.join(ADDRESS_SEPARATOR)
}

/// Reads one part of the entity's `address` Property as text, or `""`.
#[must_use]
pub fn address_part(entity: &Value, part: AddressPart) -> String {
    get_in(entity, &["address", "value", part.key()])
        .and_then(address_text)
        .unwrap_or_default()
}

/// The locality (city) of the entity's address, or `""`.
#[must_use]
pub fn locality(entity: &Value) -> String {
    address_part(entity, AddressPart::Locality)
}

/// Renders an address field. Strings are used as-is and numbers (postal
/// codes stored as integers) keep their JSON text; other shapes are skipped.
///
/// Numbers are rendered rather than passed through raw so that `city` and
/// `address` are always strings in the flat record.
fn address_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
