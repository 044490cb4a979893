#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the NGSI-LD entity normalizer.
//!
//! Reads entity arrays from a file, stdin, or a context broker and prints
//! the flattened records as a JSON array. Can also build entities and
//! write them to the broker.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::Value;
use smart_city_ngsi::broker::{BrokerClient, DEFAULT_PAGE_SIZE, update_payload};
use smart_city_ngsi::builder::{
    AirQualityReadings, air_quality_observed_entity, air_quality_sensor_entity,
    sosa_observation_entity, sosa_sensor_entity, traffic_flow_observed_entity,
    weather_station_entity,
};
use smart_city_ngsi::registry::Registry;
use smart_city_ngsi::{NgsiError, parse_entities};
use smart_city_ngsi_models::{EntityCategory, FlatRecord};

#[derive(Parser)]
#[command(name = "smart_city", about = "NGSI-LD entity normalizer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List entity categories and the NGSI-LD types they accept
    Categories {
        /// Directory of TOML field maps overriding the built-in ones
        #[arg(long)]
        mappings: Option<PathBuf>,
    },
    /// Flatten a JSON array of entities read from a file or stdin
    Flatten {
        /// Flatten every entity as this category (e.g. "`street_light`").
        /// If not specified, each entity is classified by its `type`.
        #[arg(long)]
        category: Option<EntityCategory>,
        /// Input file, or "-" for stdin
        #[arg(long, default_value = "-")]
        input: String,
        /// Directory of TOML field maps overriding the built-in ones
        #[arg(long)]
        mappings: Option<PathBuf>,
        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },
    /// Fetch entities of one type from a context broker and flatten them
    Fetch {
        /// NGSI-LD entity type (e.g. "`StreetLight`")
        #[arg(long = "type")]
        entity_type: String,
        /// Flatten every entity as this category instead of classifying by type
        #[arg(long)]
        category: Option<EntityCategory>,
        /// Maximum number of entities to fetch
        #[arg(long)]
        limit: Option<u64>,
        /// Number of entities requested per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u64,
        /// Broker base URL (overrides `ORION_LD_URL`)
        #[arg(long)]
        broker_url: Option<String>,
        /// Directory of TOML field maps overriding the built-in ones
        #[arg(long)]
        mappings: Option<PathBuf>,
        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },
    /// Build one NGSI-LD entity and create it on the context broker
    Publish {
        #[command(subcommand)]
        entity: PublishEntity,
        /// Broker base URL (overrides `ORION_LD_URL`)
        #[arg(long, global = true)]
        broker_url: Option<String>,
        /// Print the entity instead of sending it
        #[arg(long, global = true)]
        dry_run: bool,
    },
    /// Create (or update) every entity in a JSON array on the context broker
    Push {
        /// Input file, or "-" for stdin
        #[arg(long, default_value = "-")]
        input: String,
        /// Patch the attributes of existing entities instead of creating them
        #[arg(long)]
        update: bool,
        /// Broker base URL (overrides `ORION_LD_URL`)
        #[arg(long)]
        broker_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum PublishEntity {
    /// A `WeatherStation`
    WeatherStation {
        /// Local id (the URN is derived from it)
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long)]
        address: Option<String>,
    },
    /// An air-quality sensor
    AirQualitySensor {
        /// Local id (the URN is derived from it)
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Entity type (default `AirQualitySensor`)
        #[arg(long)]
        sensor_type: Option<String>,
    },
    /// An `AirQualityObserved` reading; omitted pollutants are left off
    AirQuality {
        /// Local id (the URN is derived from it)
        #[arg(long)]
        id: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long)]
        aqi: Option<f64>,
        #[arg(long)]
        pm25: Option<f64>,
        #[arg(long)]
        pm10: Option<f64>,
        #[arg(long)]
        no2: Option<f64>,
        #[arg(long)]
        o3: Option<f64>,
        #[arg(long)]
        co: Option<f64>,
        #[arg(long)]
        so2: Option<f64>,
        /// RFC 3339 observation time (default: now)
        #[arg(long)]
        observed_at: Option<DateTime<Utc>>,
    },
    /// A `TrafficFlowObserved` reading
    TrafficFlow {
        /// Local id (the URN is derived from it)
        #[arg(long)]
        id: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Vehicles counted
        #[arg(long)]
        intensity: i64,
        /// Lane occupancy (percent)
        #[arg(long)]
        occupancy: f64,
        /// Average speed (km/h)
        #[arg(long)]
        average_speed: f64,
        /// RFC 3339 observation time (default: now)
        #[arg(long)]
        observed_at: Option<DateTime<Utc>>,
    },
    /// A SOSA `Sensor`
    Sensor {
        /// Local id (the URN is derived from it)
        #[arg(long)]
        id: String,
        /// Observed property (e.g. "temperature")
        #[arg(long)]
        observes: String,
        /// URN of the hosting platform
        #[arg(long)]
        hosted_by: Option<String>,
    },
    /// A SOSA `Observation`
    Observation {
        /// Local id (the URN is derived from it)
        #[arg(long)]
        id: String,
        /// Sensor local id or URN
        #[arg(long)]
        sensor: String,
        /// Observed property (e.g. "temperature")
        #[arg(long)]
        property: String,
        /// Result value; parsed as JSON, otherwise kept as text
        #[arg(long, allow_negative_numbers = true)]
        result: String,
        /// RFC 3339 result time (default: now)
        #[arg(long)]
        result_time: Option<DateTime<Utc>>,
        /// RFC 3339 time the observed phenomenon occurred
        #[arg(long)]
        phenomenon_time: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Categories { mappings } => {
            let registry = load_registry(mappings.as_deref())?;
            println!("{:<26} {:<16} NGSI-LD TYPES", "CATEGORY", "GROUP");
            println!("{}", "-".repeat(72));
            for definition in registry.definitions() {
                println!(
                    "{:<26} {:<16} {}",
                    definition.category,
                    definition.category.group(),
                    definition.entity_types.join(", ")
                );
            }
        }
        Commands::Flatten {
            category,
            input,
            mappings,
            pretty,
        } => {
            let registry = load_registry(mappings.as_deref())?;
            let text = read_input(&input)?;
            let entities = parse_entities(&text)?;
            log::info!("Read {} entities from {input}", entities.len());

            let records = flatten_entities(&registry, category, &entities);
            print_records(&records, pretty)?;
        }
        Commands::Fetch {
            entity_type,
            category,
            limit,
            page_size,
            broker_url,
            mappings,
            pretty,
        } => {
            let registry = load_registry(mappings.as_deref())?;
            let client = broker_client(broker_url);

            let entities = client.fetch_all(&entity_type, page_size, limit).await?;
            let records = flatten_entities(&registry, category, &entities);
            print_records(&records, pretty)?;
        }
        Commands::Publish {
            entity,
            broker_url,
            dry_run,
        } => {
            let entity = build_entity(entity);
            if dry_run {
                println!("{}", serde_json::to_string_pretty(&entity)?);
            } else {
                broker_client(broker_url).create_entity(&entity).await?;
            }
        }
        Commands::Push {
            input,
            update,
            broker_url,
        } => {
            let entities = parse_entities(&read_input(&input)?)?;
            let client = broker_client(broker_url);
            let failed = push_entities(&client, &entities, update).await;
            if failed > 0 {
                return Err(format!("{failed} of {} entities failed", entities.len()).into());
            }
            log::info!("Pushed {} entities", entities.len());
        }
    }

    Ok(())
}

/// Returns the built-in registry, with overrides from `mappings` applied
/// if a directory was given.
fn load_registry(mappings: Option<&Path>) -> Result<Registry, NgsiError> {
    let mut registry = Registry::default();
    if let Some(dir) = mappings {
        let count = registry.load_overrides(dir)?;
        log::info!("Applied {count} mapping overrides from {}", dir.display());
    }
    Ok(registry)
}

fn broker_client(broker_url: Option<String>) -> BrokerClient {
    let client = broker_url.map_or_else(BrokerClient::from_env, BrokerClient::new);
    log::info!("Using context broker at {}", client.base_url());
    client
}

fn build_entity(entity: PublishEntity) -> Value {
    match entity {
        PublishEntity::WeatherStation {
            id,
            name,
            lat,
            lon,
            address,
        } => weather_station_entity(&id, &name, lat, lon, address.as_deref()),
        PublishEntity::AirQualitySensor {
            id,
            name,
            lat,
            lon,
            sensor_type,
        } => air_quality_sensor_entity(&id, &name, lat, lon, sensor_type.as_deref()),
        PublishEntity::AirQuality {
            id,
            lat,
            lon,
            aqi,
            pm25,
            pm10,
            no2,
            o3,
            co,
            so2,
            observed_at,
        } => {
            let readings = AirQualityReadings {
                aqi,
                pm25,
                pm10,
                no2,
                o3,
                co,
                so2,
            };
            air_quality_observed_entity(&id, lat, lon, &readings, observed_at)
        }
        PublishEntity::TrafficFlow {
            id,
            lat,
            lon,
            intensity,
            occupancy,
            average_speed,
            observed_at,
        } => traffic_flow_observed_entity(
            &id,
            lat,
            lon,
            intensity,
            occupancy,
            average_speed,
            observed_at,
        ),
        PublishEntity::Sensor {
            id,
            observes,
            hosted_by,
        } => sosa_sensor_entity(&id, &observes, hosted_by.as_deref()),
        PublishEntity::Observation {
            id,
            sensor,
            property,
            result,
            result_time,
            phenomenon_time,
        } => {
            let result = serde_json::from_str(&result).unwrap_or(Value::String(result));
            sosa_observation_entity(
                &id,
                &sensor,
                &property,
                result,
                result_time.unwrap_or_else(Utc::now),
                phenomenon_time,
            )
        }
    }
}

/// Sends every entity to the broker, logging failures. Returns the number
/// of entities that failed.
async fn push_entities(client: &BrokerClient, entities: &[Value], update: bool) -> usize {
    let mut failed = 0;
    for (idx, entity) in entities.iter().enumerate() {
        let outcome = if update {
            match update_payload(entity) {
                Some((id, attributes)) => client.update_entity(&id, &attributes).await,
                None => Err(NgsiError::InvalidPayload {
                    message: format!("element {idx} has no string `id`"),
                }),
            }
        } else {
            client.create_entity(entity).await
        };

        if let Err(e) = outcome {
            log::error!("Failed to push {}: {e}", entity.get("id").unwrap_or(&Value::Null));
            failed += 1;
        }
    }
    failed
}

fn read_input(input: &str) -> Result<String, NgsiError> {
    if input == "-" {
        Ok(std::io::read_to_string(std::io::stdin())?)
    } else {
        Ok(std::fs::read_to_string(input)?)
    }
}

fn flatten_entities(
    registry: &Registry,
    category: Option<EntityCategory>,
    entities: &[Value],
) -> Vec<FlatRecord> {
    let records = match category {
        Some(category) => registry.flatten_all_as(category, entities),
        None => registry.flatten_all(entities),
    };
    log::info!("Flattened {} of {} entities", records.len(), entities.len());
    records
}

fn print_records(records: &[FlatRecord], pretty: bool) -> Result<(), NgsiError> {
    let output = if pretty {
        serde_json::to_string_pretty(records)?
    } else {
        serde_json::to_string(records)?
    };
    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn street_light() -> Value {
        json!({
            "id": "urn:ngsi-ld:StreetLight:001",
            "type": "StreetLight",
            "status": {"type": "Property", "value": "on"},
            "powerState": {"type": "Property", "value": "on"},
        })
    }

    #[test]
    fn flattens_by_type_and_skips_unknown() {
        let entities = vec![street_light(), json!({"id": "x", "type": "Unknown"})];
        let records = flatten_entities(&Registry::default(), None, &entities);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), Some("urn:ngsi-ld:StreetLight:001"));
        assert_eq!(records[0].get("status"), Some(&json!("on")));
    }

    #[test]
    fn forced_category_flattens_everything() {
        let entities = vec![street_light(), json!({"id": "x", "type": "Unknown"})];
        let records = flatten_entities(
            &Registry::default(),
            Some(EntityCategory::StreetLight),
            &entities,
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].entity_type(), Some("Unknown"));
    }

    #[test]
    fn parses_category_argument() {
        let cli = Cli::try_parse_from([
            "smart_city",
            "flatten",
            "--category",
            "air_quality_observation",
            "--input",
            "entities.json",
        ])
        .unwrap();
        let Commands::Flatten {
            category, input, ..
        } = cli.command
        else {
            panic!("expected flatten command");
        };
        assert_eq!(category, Some(EntityCategory::AirQualityObservation));
        assert_eq!(input, "entities.json");
    }

    #[test]
    fn fetch_defaults_page_size() {
        let cli = Cli::try_parse_from(["smart_city", "fetch", "--type", "ParkingSpot"]).unwrap();
        let Commands::Fetch {
            entity_type,
            page_size,
            limit,
            ..
        } = cli.command
        else {
            panic!("expected fetch command");
        };
        assert_eq!(entity_type, "ParkingSpot");
        assert_eq!(page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(limit, None);
    }

    fn publish(args: &[&str]) -> Value {
        let cli = Cli::try_parse_from(args).unwrap();
        let Commands::Publish { entity, .. } = cli.command else {
            panic!("expected publish command");
        };
        build_entity(entity)
    }

    #[test]
    fn publishes_air_quality_with_negative_coordinates() {
        let entity = publish(&[
            "smart_city",
            "publish",
            "--dry-run",
            "air-quality",
            "--id",
            "SCL-1",
            "--lat",
            "-33.45",
            "--lon",
            "-70.66",
            "--pm25",
            "18.5",
            "--observed-at",
            "2025-03-01T12:00:00Z",
        ]);
        assert_eq!(entity["id"], "urn:ngsi-ld:AirQualityObserved:SCL-1");
        assert_eq!(entity["location"]["value"]["coordinates"], json!([-70.66, -33.45]));
        assert_eq!(entity["pm25"]["value"], 18.5);
        assert!(entity.get("no2").is_none());

        let record = Registry::default().flatten(&entity).unwrap();
        assert_eq!(record.get("latitude"), Some(&json!(-33.45)));
        assert_eq!(record.get("observed_at"), Some(&json!("2025-03-01T12:00:00Z")));
    }

    #[test]
    fn publish_flags_are_global() {
        let cli = Cli::try_parse_from([
            "smart_city",
            "publish",
            "sensor",
            "--id",
            "T-1",
            "--observes",
            "temperature",
            "--dry-run",
            "--broker-url",
            "http://orion:1026",
        ])
        .unwrap();
        let Commands::Publish {
            dry_run,
            broker_url,
            entity,
        } = cli.command
        else {
            panic!("expected publish command");
        };
        assert!(dry_run);
        assert_eq!(broker_url.as_deref(), Some("http://orion:1026"));
        assert_eq!(build_entity(entity)["observes"]["object"], "temperature");
    }

    #[test]
    fn observation_result_is_json_or_text() {
        let base = [
            "smart_city",
            "publish",
            "observation",
            "--id",
            "OBS-1",
            "--sensor",
            "T-1",
            "--property",
            "temperature",
            "--result-time",
            "2025-03-01T12:00:00Z",
            "--result",
        ];

        let numeric = publish(&[&base[..], &["31.5"]].concat());
        assert_eq!(numeric["hasSimpleResult"]["value"], json!(31.5));
        assert_eq!(numeric["madeBySensor"]["object"], "urn:ngsi-ld:Sensor:T-1");
        assert_eq!(numeric["resultTime"]["value"], "2025-03-01T12:00:00Z");

        let text = publish(&[&base[..], &["rising"]].concat());
        assert_eq!(text["hasSimpleResult"]["value"], json!("rising"));
    }

    #[test]
    fn publishes_traffic_flow() {
        let entity = publish(&[
            "smart_city",
            "publish",
            "traffic-flow",
            "--id",
            "TF-1",
            "--lat",
            "21.0",
            "--lon",
            "105.8",
            "--intensity",
            "420",
            "--occupancy",
            "35",
            "--average-speed",
            "28",
        ]);
        let record = Registry::default().flatten(&entity).unwrap();
        assert_eq!(record.get("vehicle_count"), Some(&json!(420)));
        assert_eq!(record.entity_type(), Some("TrafficFlowObserved"));
    }

    #[test]
    fn push_parses_update_flag() {
        let cli = Cli::try_parse_from(["smart_city", "push", "--input", "seed.json", "--update"])
            .unwrap();
        let Commands::Push { input, update, .. } = cli.command else {
            panic!("expected push command");
        };
        assert_eq!(input, "seed.json");
        assert!(update);
    }

    #[test]
    fn missing_mappings_dir_is_an_error() {
        let result = load_registry(Some(Path::new("/nonexistent/smart-city-mappings")));
        assert!(matches!(result, Err(NgsiError::Io(_))));
    }
}
