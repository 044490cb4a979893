//! Named flatteners for each built-in entity category.
//!
//! These are thin wrappers over [`Registry::builtin`] for callers that
//! already know what they fetched (e.g. the infrastructure page requesting
//! `StreetLight` entities).

use serde_json::Value;
use smart_city_ngsi_models::{EntityCategory, FlatRecord};

use crate::flatten::flatten;
use crate::registry::Registry;

/// Flattens `entity` with the built-in definition for `category`.
#[must_use]
pub fn flatten_builtin(category: EntityCategory, entity: &Value) -> FlatRecord {
    Registry::builtin()
        .definition(category)
        .map(|def| flatten(def, entity))
        .unwrap_or_default()
}

macro_rules! category_flatteners {
    ($($(#[$doc:meta])* $name:ident => $category:ident;)*) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $name(entity: &Value) -> FlatRecord {
                flatten_builtin(EntityCategory::$category, entity)
            }
        )*
    };
}

category_flatteners! {
    /// Flattens a bus station (`BusStation`).
    parse_bus_station => BusStation;
    /// Flattens a traffic flow observation (`TrafficFlowObserved`).
    parse_traffic_flow => TrafficFlow;
    /// Flattens a traffic incident (`TrafficIncident`).
    parse_traffic_incident => TrafficIncident;
    /// Flattens a parking spot (`ParkingSpot`).
    parse_parking_spot => ParkingSpot;
    /// Flattens a water supply point (`WaterSupplyPoint`).
    parse_water_supply => WaterSupply;
    /// Flattens a drainage point (`DrainagePoint`).
    parse_drainage => Drainage;
    /// Flattens a street light (`StreetLight`).
    parse_street_light => StreetLight;
    /// Flattens an energy meter (`EnergyMeter`).
    parse_energy_meter => EnergyMeter;
    /// Flattens a telecom tower (`TelecomTower`).
    parse_telecom_tower => TelecomTower;
    /// Flattens a public service (`PublicService`).
    parse_public_service => PublicService;
    /// Flattens a weather observation (`WeatherObserved`).
    parse_weather_observation => WeatherObservation;
    /// Flattens an air-quality observation (`AirQualityObserved`).
    parse_air_quality_observation => AirQualityObservation;
}
