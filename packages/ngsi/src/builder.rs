//! Builders for NGSI-LD entities.
//!
//! Produces the same wrapped shape the normalizer consumes: Properties
//! with optional `observedAt` / `unitCode` metadata, Relationships, and
//! `GeoProperty` points, plus the `@context` the broker needs to expand
//! short attribute names.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

/// The ETSI NGSI-LD core context.
pub const NGSI_LD_CORE_CONTEXT: &str =
    "https://uri.etsi.org/ngsi-ld/v1/ngsi-ld-core-context.jsonld";

/// Smart Data Models shared context.
pub const SMART_DATA_MODELS_CONTEXT: &str = "https://smartdatamodels.org/context.jsonld";

/// Prefixes and short attribute names used by the dashboard's entities.
const CUSTOM_CONTEXT: &[(&str, &str)] = &[
    // ── Vocabularies ─────────────────────────────────────
    ("sosa", "http://www.w3.org/ns/sosa/"),
    ("ssn", "http://www.w3.org/ns/ssn/"),
    ("geo", "http://www.w3.org/2003/01/geo/wgs84_pos#"),
    ("schema", "https://schema.org/"),
    ("smartcity", "https://smartcity.example.com/ontology#"),
    // ── Observed properties ──────────────────────────────
    ("temperature", "smartcity:temperature"),
    ("humidity", "smartcity:humidity"),
    ("pressure", "smartcity:pressure"),
    ("airQualityIndex", "smartcity:airQualityIndex"),
    ("pm25", "smartcity:pm25"),
    ("pm10", "smartcity:pm10"),
    ("no2", "smartcity:no2"),
    ("o3", "smartcity:o3"),
    ("co", "smartcity:co"),
    ("so2", "smartcity:so2"),
    // ── SOSA/SSN ─────────────────────────────────────────
    ("observes", "sosa:observes"),
    ("isHostedBy", "sosa:isHostedBy"),
    ("madeObservation", "sosa:madeObservation"),
    ("observedProperty", "sosa:observedProperty"),
    ("madeBySensor", "sosa:madeBySensor"),
    ("hasSimpleResult", "sosa:hasSimpleResult"),
    ("resultTime", "sosa:resultTime"),
    ("phenomenonTime", "sosa:phenomenonTime"),
];

/// Entity type used by [`air_quality_sensor_entity`] when none is given.
pub const DEFAULT_AIR_QUALITY_SENSOR_TYPE: &str = "AirQualitySensor";

/// UN/CEFACT code for micrograms per cubic metre.
const UNIT_MICROGRAMS_PER_M3: &str = "GQ";
/// UN/CEFACT code for percent.
const UNIT_PERCENT: &str = "P1";
/// UN/CEFACT code for kilometres per hour.
const UNIT_KMH: &str = "KMH";

/// Returns the `@context` array attached to every built entity: the core
/// context followed by the custom term map.
#[must_use]
pub fn default_context() -> Value {
    let custom: Map<String, Value> = CUSTOM_CONTEXT
        .iter()
        .map(|(term, iri)| ((*term).to_string(), Value::from(*iri)))
        .collect();
    json!([NGSI_LD_CORE_CONTEXT, custom])
}

/// Builds the URN for an entity: `urn:ngsi-ld:{type}:{local_id}`.
#[must_use]
pub fn entity_urn(entity_type: &str, local_id: &str) -> String {
    format!("urn:ngsi-ld:{entity_type}:{local_id}")
}

/// Returns `id` unchanged if it is already a URN, otherwise the URN of the
/// `entity_type` entity with that local id.
#[must_use]
pub fn as_urn(entity_type: &str, id: &str) -> String {
    if id.starts_with("urn:") {
        id.to_string()
    } else {
        entity_urn(entity_type, id)
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Incrementally assembles an NGSI-LD entity.
#[derive(Debug, Clone)]
pub struct EntityBuilder {
    entity: Map<String, Value>,
}

impl EntityBuilder {
    /// Starts an entity of `entity_type` whose id is derived from
    /// `local_id`.
    #[must_use]
    pub fn new(local_id: &str, entity_type: &str) -> Self {
        let mut entity = Map::new();
        entity.insert("id".to_string(), Value::from(entity_urn(entity_type, local_id)));
        entity.insert("type".to_string(), Value::from(entity_type));
        entity.insert("@context".to_string(), default_context());
        Self { entity }
    }

    /// Adds a Property without metadata.
    #[must_use]
    pub fn property(self, name: &str, value: impl Into<Value>) -> Self {
        self.property_with(name, value, None, None)
    }

    /// Adds a Property with optional `observedAt` and `unitCode`.
    #[must_use]
    pub fn property_with(
        mut self,
        name: &str,
        value: impl Into<Value>,
        observed_at: Option<DateTime<Utc>>,
        unit_code: Option<&str>,
    ) -> Self {
        let mut prop = Map::new();
        prop.insert("type".to_string(), Value::from("Property"));
        prop.insert("value".to_string(), value.into());
        if let Some(at) = observed_at {
            prop.insert("observedAt".to_string(), Value::from(timestamp(at)));
        }
        if let Some(unit) = unit_code {
            prop.insert("unitCode".to_string(), Value::from(unit));
        }
        self.entity.insert(name.to_string(), Value::Object(prop));
        self
    }

    /// Adds a Relationship pointing at another entity.
    #[must_use]
    pub fn relationship(mut self, name: &str, target_id: &str) -> Self {
        self.entity.insert(
            name.to_string(),
            json!({"type": "Relationship", "object": target_id}),
        );
        self
    }

    /// Adds a `GeoProperty` point. Coordinates are stored in `GeoJSON`
    /// order (`[longitude, latitude]`).
    #[must_use]
    pub fn geo_property(mut self, name: &str, latitude: f64, longitude: f64) -> Self {
        self.entity.insert(
            name.to_string(),
            json!({
                "type": "GeoProperty",
                "value": {"type": "Point", "coordinates": [longitude, latitude]}
            }),
        );
        self
    }

    /// Adds the conventional `location` `GeoProperty`.
    #[must_use]
    pub fn location(self, latitude: f64, longitude: f64) -> Self {
        self.geo_property("location", latitude, longitude)
    }

    /// Finishes the entity.
    #[must_use]
    pub fn build(self) -> Value {
        Value::Object(self.entity)
    }
}

/// Builds a `WeatherStation` entity.
#[must_use]
pub fn weather_station_entity(
    station_id: &str,
    name: &str,
    latitude: f64,
    longitude: f64,
    address: Option<&str>,
) -> Value {
    let mut builder = EntityBuilder::new(station_id, "WeatherStation")
        .property("name", name)
        .location(latitude, longitude);
    if let Some(address) = address {
        builder = builder.property("address", address);
    }
    builder.build()
}

/// Builds an air-quality sensor entity. `sensor_type` defaults to
/// [`DEFAULT_AIR_QUALITY_SENSOR_TYPE`].
#[must_use]
pub fn air_quality_sensor_entity(
    sensor_id: &str,
    name: &str,
    latitude: f64,
    longitude: f64,
    sensor_type: Option<&str>,
) -> Value {
    EntityBuilder::new(sensor_id, sensor_type.unwrap_or(DEFAULT_AIR_QUALITY_SENSOR_TYPE))
        .property("name", name)
        .property("category", json!(["sensor"]))
        .location(latitude, longitude)
        .build()
}

/// Builds a SOSA `Sensor` that observes `observed_property` and is
/// optionally hosted by a platform entity.
#[must_use]
pub fn sosa_sensor_entity(sensor_id: &str, observed_property: &str, hosted_by: Option<&str>) -> Value {
    let mut builder =
        EntityBuilder::new(sensor_id, "Sensor").relationship("observes", observed_property);
    if let Some(platform) = hosted_by {
        builder = builder.relationship("isHostedBy", platform);
    }
    builder.build()
}

/// Builds a SOSA `Observation` of `observed_property` made by `sensor_id`.
///
/// `sensor_id` may be a local id or a full URN. The result is stored as
/// `hasSimpleResult` and the times as RFC 3339 `resultTime` /
/// `phenomenonTime` Properties.
#[must_use]
pub fn sosa_observation_entity(
    observation_id: &str,
    sensor_id: &str,
    observed_property: &str,
    result: impl Into<Value>,
    result_time: DateTime<Utc>,
    phenomenon_time: Option<DateTime<Utc>>,
) -> Value {
    let mut builder = EntityBuilder::new(observation_id, "Observation")
        .relationship("observedProperty", observed_property)
        .relationship("madeBySensor", &as_urn("Sensor", sensor_id))
        .property("hasSimpleResult", result)
        .property("resultTime", timestamp(result_time));
    if let Some(at) = phenomenon_time {
        builder = builder.property("phenomenonTime", timestamp(at));
    }
    builder.build()
}

/// Pollutant readings for an `AirQualityObserved` entity. Missing readings
/// are left off the entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct AirQualityReadings {
    /// Air quality index.
    pub aqi: Option<f64>,
    /// PM2.5 (µg/m³).
    pub pm25: Option<f64>,
    /// PM10 (µg/m³).
    pub pm10: Option<f64>,
    /// Nitrogen dioxide (µg/m³).
    pub no2: Option<f64>,
    /// Ozone (µg/m³).
    pub o3: Option<f64>,
    /// Carbon monoxide (µg/m³).
    pub co: Option<f64>,
    /// Sulphur dioxide (µg/m³).
    pub so2: Option<f64>,
}

/// Builds an `AirQualityObserved` entity. `date_observed` defaults to now.
#[must_use]
pub fn air_quality_observed_entity(
    observation_id: &str,
    latitude: f64,
    longitude: f64,
    readings: &AirQualityReadings,
    date_observed: Option<DateTime<Utc>>,
) -> Value {
    let observed_at = date_observed.unwrap_or_else(Utc::now);
    let mut builder =
        EntityBuilder::new(observation_id, "AirQualityObserved").location(latitude, longitude);

    if let Some(aqi) = readings.aqi {
        builder = builder.property_with("airQualityIndex", aqi, Some(observed_at), None);
    }

    let pollutants = [
        ("pm25", readings.pm25),
        ("pm10", readings.pm10),
        ("no2", readings.no2),
        ("o3", readings.o3),
        ("co", readings.co),
        ("so2", readings.so2),
    ];
    for (name, reading) in pollutants {
        if let Some(value) = reading {
            builder = builder.property_with(
                name,
                value,
                Some(observed_at),
                Some(UNIT_MICROGRAMS_PER_M3),
            );
        }
    }

    builder
        .property("dateObserved", timestamp(observed_at))
        .build()
}

/// Builds a `TrafficFlowObserved` entity. `date_observed` defaults to now.
#[must_use]
pub fn traffic_flow_observed_entity(
    observation_id: &str,
    latitude: f64,
    longitude: f64,
    intensity: i64,
    occupancy: f64,
    average_speed: f64,
    date_observed: Option<DateTime<Utc>>,
) -> Value {
    let observed_at = date_observed.unwrap_or_else(Utc::now);
    EntityBuilder::new(observation_id, "TrafficFlowObserved")
        .location(latitude, longitude)
        .property_with("intensity", intensity, Some(observed_at), None)
        .property_with("occupancy", occupancy, Some(observed_at), Some(UNIT_PERCENT))
        .property_with(
            "averageVehicleSpeed",
            average_speed,
            Some(observed_at),
            Some(UNIT_KMH),
        )
        .property("dateObserved", timestamp(observed_at))
        .build()
}
