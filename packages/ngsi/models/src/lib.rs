#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! NGSI-LD entity categories and the canonical flat record format.
//!
//! Every context-broker entity the dashboard displays belongs to one
//! [`EntityCategory`] and is flattened into a [`FlatRecord`]: a plain
//! key/value map with no Property or `GeoProperty` wrappers left in it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display, EnumString};

/// Dashboard sections that group entity categories together.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CategoryGroup {
    /// Buses, traffic flow, incidents, and parking
    Transport,
    /// Water, drainage, lighting, energy, and telecom assets
    Infrastructure,
    /// Public services (hospitals, schools, offices)
    Services,
    /// Weather and air-quality observations
    Environment,
}

/// The kind of entity a flattener knows how to handle.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityCategory {
    // ── Transport ───────────────────────────────────────
    /// Bus stop or station
    BusStation,
    /// Observed traffic flow on a road segment
    TrafficFlow,
    /// Accident, roadworks, or other traffic incident
    TrafficIncident,
    /// Parking lot or on-street parking area
    ParkingSpot,

    // ── Infrastructure ──────────────────────────────────
    /// Water supply point (tank, hydrant, pumping station)
    WaterSupply,
    /// Drainage point or storm drain
    Drainage,
    /// Street light pole
    StreetLight,
    /// Electricity meter
    EnergyMeter,
    /// Telecom tower or base station
    TelecomTower,

    // ── Services ────────────────────────────────────────
    /// Public service location
    PublicService,

    // ── Environment ─────────────────────────────────────
    /// Weather observation
    WeatherObservation,
    /// Air-quality observation
    AirQualityObservation,
}

impl EntityCategory {
    /// Returns the dashboard section this category is shown in.
    #[must_use]
    pub const fn group(self) -> CategoryGroup {
        match self {
            Self::BusStation | Self::TrafficFlow | Self::TrafficIncident | Self::ParkingSpot => {
                CategoryGroup::Transport
            }
            Self::WaterSupply
            | Self::Drainage
            | Self::StreetLight
            | Self::EnergyMeter
            | Self::TelecomTower => CategoryGroup::Infrastructure,
            Self::PublicService => CategoryGroup::Services,
            Self::WeatherObservation | Self::AirQualityObservation => CategoryGroup::Environment,
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::BusStation,
            Self::TrafficFlow,
            Self::TrafficIncident,
            Self::ParkingSpot,
            Self::WaterSupply,
            Self::Drainage,
            Self::StreetLight,
            Self::EnergyMeter,
            Self::TelecomTower,
            Self::PublicService,
            Self::WeatherObservation,
            Self::AirQualityObservation,
        ]
    }
}

/// A WGS84 point split into named fields.
///
/// Context brokers store points in `GeoJSON` order (`[longitude, latitude]`);
/// this type always names them explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

/// A display-ready record produced by flattening one NGSI-LD entity.
///
/// Keys are stable snake-case names; values are plain JSON scalars or
/// sequences.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRecord(Map<String, Value>);

impl FlatRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `true` if the record has a value for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The entity URN copied from the source entity.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    /// The NGSI-LD type copied from the source entity.
    #[must_use]
    pub fn entity_type(&self) -> Option<&str> {
        self.get("type").and_then(Value::as_str)
    }

    /// Number of keys in the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the record holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Converts the record into a JSON object value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<FlatRecord> for Value {
    fn from(record: FlatRecord) -> Self {
        record.into_value()
    }
}
