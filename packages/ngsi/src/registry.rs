//! Category registry — loads all field maps from embedded TOML configs.
//!
//! Each `.toml` file in `packages/ngsi/categories/` is baked into the
//! binary at compile time via [`include_str!`]. A directory of override
//! files can replace individual definitions at runtime.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use serde_json::Value;
use smart_city_ngsi_models::{EntityCategory, FlatRecord};

use crate::NgsiError;
use crate::field_map::{CategoryDefinition, parse_category_toml};
use crate::flatten::{flatten, flatten_all};

/// TOML configs embedded at compile time.
const CATEGORY_TOMLS: &[(&str, &str)] = &[
    // ── Transport ────────────────────────────────────────────────────
    ("bus_station", include_str!("../categories/bus_station.toml")),
    ("traffic_flow", include_str!("../categories/traffic_flow.toml")),
    (
        "traffic_incident",
        include_str!("../categories/traffic_incident.toml"),
    ),
    ("parking_spot", include_str!("../categories/parking_spot.toml")),
    // ── Infrastructure ───────────────────────────────────────────────
    ("water_supply", include_str!("../categories/water_supply.toml")),
    ("drainage", include_str!("../categories/drainage.toml")),
    ("street_light", include_str!("../categories/street_light.toml")),
    ("energy_meter", include_str!("../categories/energy_meter.toml")),
    ("telecom_tower", include_str!("../categories/telecom_tower.toml")),
    // ── Services ─────────────────────────────────────────────────────
    (
        "public_service",
        include_str!("../categories/public_service.toml"),
    ),
    // ── Environment ──────────────────────────────────────────────────
    (
        "weather_observation",
        include_str!("../categories/weather_observation.toml"),
    ),
    (
        "air_quality_observation",
        include_str!("../categories/air_quality_observation.toml"),
    ),
];

/// Total number of configured categories (used in tests).
#[cfg(test)]
const EXPECTED_CATEGORY_COUNT: usize = 12;

static BUILTIN: LazyLock<Registry> = LazyLock::new(|| Registry::new(all_categories()));

/// Returns all built-in category definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_categories() -> Vec<CategoryDefinition> {
    CATEGORY_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_category_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// A set of category definitions with a lookup from NGSI-LD `type` to
/// category.
#[derive(Debug, Clone)]
pub struct Registry {
    definitions: BTreeMap<EntityCategory, CategoryDefinition>,
    by_type: BTreeMap<String, EntityCategory>,
}

impl Registry {
    /// Builds a registry from a list of definitions. Later definitions for
    /// the same category replace earlier ones.
    #[must_use]
    pub fn new(definitions: impl IntoIterator<Item = CategoryDefinition>) -> Self {
        let mut registry = Self {
            definitions: BTreeMap::new(),
            by_type: BTreeMap::new(),
        };
        for definition in definitions {
            registry.insert(definition);
        }
        registry
    }

    /// The process-wide registry of embedded definitions.
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    /// Adds or replaces the definition for its category.
    ///
    /// An NGSI-LD type already claimed by another category moves to this
    /// one and is removed from the other definition's `entity_types`.
    pub fn insert(&mut self, definition: CategoryDefinition) {
        let category = definition.category;
        self.by_type.retain(|_, c| *c != category);
        for entity_type in &definition.entity_types {
            let previous = self.by_type.insert(entity_type.clone(), category);
            let Some(previous) = previous.filter(|p| *p != category) else {
                continue;
            };
            log::warn!("NGSI-LD type {entity_type} moved from {previous} to {category}");
            if let Some(owner) = self.definitions.get_mut(&previous) {
                owner.entity_types.retain(|t| t != entity_type);
            }
        }
        self.definitions.insert(category, definition);
    }

    /// Loads every `*.toml` file in `dir` and replaces the matching
    /// built-in definitions.
    ///
    /// # Errors
    ///
    /// Returns [`NgsiError::Io`] if the directory cannot be read and
    /// [`NgsiError::Mapping`] if any file is not a valid definition.
    pub fn load_overrides(&mut self, dir: &Path) -> Result<usize, NgsiError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        for path in &paths {
            let text = std::fs::read_to_string(path)?;
            let definition = parse_category_toml(&text).map_err(|message| NgsiError::Mapping {
                path: path.clone(),
                message,
            })?;
            log::info!(
                "Loaded {} mapping override from {}",
                definition.category,
                path.display()
            );
            self.insert(definition);
        }

        Ok(paths.len())
    }

    /// Returns the definition for `category`.
    #[must_use]
    pub fn definition(&self, category: EntityCategory) -> Option<&CategoryDefinition> {
        self.definitions.get(&category)
    }

    /// Iterates over all definitions in category order.
    pub fn definitions(&self) -> impl Iterator<Item = &CategoryDefinition> {
        self.definitions.values()
    }

    /// Determines the category of an entity from its `type`.
    #[must_use]
    pub fn classify(&self, entity: &Value) -> Option<EntityCategory> {
        let entity_type = entity.get("type")?.as_str()?;
        self.by_type.get(entity_type).copied()
    }

    /// Flattens an entity using the definition matching its `type`.
    ///
    /// Returns `None` if the type is unknown.
    #[must_use]
    pub fn flatten(&self, entity: &Value) -> Option<FlatRecord> {
        let Some(category) = self.classify(entity) else {
            log::debug!(
                "No category for entity {} (type {})",
                entity.get("id").unwrap_or(&Value::Null),
                entity.get("type").unwrap_or(&Value::Null)
            );
            return None;
        };
        self.flatten_as(category, entity)
    }

    /// Flattens an entity with the definition for `category`, regardless of
    /// its `type`.
    ///
    /// Returns `None` only if the registry has no definition for `category`.
    #[must_use]
    pub fn flatten_as(&self, category: EntityCategory, entity: &Value) -> Option<FlatRecord> {
        self.definition(category).map(|def| flatten(def, entity))
    }

    /// Flattens every entity whose type is known, skipping the rest.
    #[must_use]
    pub fn flatten_all(&self, entities: &[Value]) -> Vec<FlatRecord> {
        let records: Vec<FlatRecord> = entities.iter().filter_map(|e| self.flatten(e)).collect();
        let skipped = entities.len() - records.len();
        if skipped > 0 {
            log::warn!("Skipped {skipped} entities with unknown types");
        }
        records
    }

    /// Flattens every entity with the definition for `category`.
    #[must_use]
    pub fn flatten_all_as(&self, category: EntityCategory, entities: &[Value]) -> Vec<FlatRecord> {
        self.definition(category)
            .map(|def| flatten_all(def, entities))
            .unwrap_or_default()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn loads_all_categories() {
        let categories = all_categories();
        assert_eq!(categories.len(), EXPECTED_CATEGORY_COUNT);
    }

    #[test]
    fn every_category_has_exactly_one_definition() {
        let registry = Registry::builtin();
        for category in EntityCategory::all() {
            let def = registry
                .definition(*category)
                .unwrap_or_else(|| panic!("{category} has no definition"));
            assert_eq!(def.category, *category);
        }
        assert_eq!(registry.definitions().count(), EXPECTED_CATEGORY_COUNT);
    }

    #[test]
    fn embedded_file_names_match_categories() {
        for ((name, _), def) in CATEGORY_TOMLS.iter().zip(all_categories()) {
            assert_eq!(*name, def.category.as_ref());
        }
    }

    #[test]
    fn all_categories_have_required_fields() {
        for def in &all_categories() {
            assert!(!def.entity_types.is_empty(), "{}: no entity types", def.category);
            assert!(
                def.id_aliases.iter().any(|a| a == "entity_id"),
                "{}: missing entity_id alias",
                def.category
            );
            assert!(!def.fields.is_empty(), "{}: no fields", def.category);
        }
    }

    #[test]
    fn output_keys_are_unique_per_category() {
        for def in &all_categories() {
            let mut keys: Vec<&str> = def.fields.iter().map(|f| f.output.as_str()).collect();
            keys.extend(def.id_aliases.iter().map(String::as_str));
            keys.extend(["id", "type", "latitude", "longitude", "city"]);
            let total = keys.len();
            keys.sort_unstable();
            keys.dedup();
            assert_eq!(keys.len(), total, "{}: duplicate output keys", def.category);
        }
    }

    #[test]
    fn entity_types_are_unique_across_categories() {
        let mut types: Vec<String> = all_categories()
            .into_iter()
            .flat_map(|def| def.entity_types)
            .collect();
        let total = types.len();
        types.sort_unstable();
        types.dedup();
        assert_eq!(types.len(), total);
    }

    #[test]
    fn classifies_by_type() {
        let registry = Registry::builtin();
        assert_eq!(
            registry.classify(&json!({"type": "StreetLight"})),
            Some(EntityCategory::StreetLight)
        );
        assert_eq!(
            registry.classify(&json!({"type": "AirQualityObserved"})),
            Some(EntityCategory::AirQualityObservation)
        );
        assert_eq!(registry.classify(&json!({"type": "Sewer"})), None);
        assert_eq!(registry.classify(&json!({"id": "urn:ngsi-ld:Thing:1"})), None);
    }

    #[test]
    fn flatten_all_skips_unknown_types() {
        let entities = vec![
            json!({"id": "urn:ngsi-ld:StreetLight:1", "type": "StreetLight"}),
            json!({"id": "urn:ngsi-ld:Sewer:1", "type": "Sewer"}),
            json!({"id": "urn:ngsi-ld:EnergyMeter:1", "type": "EnergyMeter"}),
        ];
        let records = Registry::builtin().flatten_all(&entities);
        let ids: Vec<_> = records.iter().filter_map(FlatRecord::id).collect();
        assert_eq!(ids, ["urn:ngsi-ld:StreetLight:1", "urn:ngsi-ld:EnergyMeter:1"]);
    }

    #[test]
    fn flatten_as_ignores_entity_type() {
        let entity = json!({"id": "urn:ngsi-ld:Sewer:1", "type": "Sewer", "floodRisk": {"value": "high"}});
        let record = Registry::builtin()
            .flatten_as(EntityCategory::Drainage, &entity)
            .unwrap();
        assert_eq!(record.get("flood_risk"), Some(&json!("high")));
        assert_eq!(record.entity_type(), Some("Sewer"));
    }

    #[test]
    fn insert_replaces_definition_and_types() {
        let mut registry = Registry::default();
        let replacement = parse_category_toml(
            r#"
            category = "drainage"
            entity_types = ["StormDrain"]

            [[fields]]
            output = "risk"
            extract = { type = "value", attr = "floodRisk" }
            "#,
        )
        .unwrap();
        registry.insert(replacement);

        assert_eq!(registry.classify(&json!({"type": "DrainagePoint"})), None);
        let record = registry
            .flatten(&json!({"type": "StormDrain", "floodRisk": {"value": "low"}}))
            .unwrap();
        assert_eq!(record.get("risk"), Some(&json!("low")));
        assert!(!record.contains_key("flood_risk"));
    }

    #[test]
    fn moved_type_leaves_previous_owner() {
        let mut registry = Registry::default();
        registry.insert(
            parse_category_toml(
                r#"
                category = "drainage"
                entity_types = ["DrainagePoint", "StreetLight"]
                "#,
            )
            .unwrap(),
        );

        let owners: Vec<EntityCategory> = registry
            .definitions()
            .filter(|def| def.entity_types.iter().any(|t| t == "StreetLight"))
            .map(|def| def.category)
            .collect();
        assert_eq!(owners, [EntityCategory::Drainage]);
        assert_eq!(
            registry.classify(&json!({"type": "StreetLight"})),
            Some(EntityCategory::Drainage)
        );
        // The street light definition itself survives, it just lost the type.
        assert!(registry.definition(EntityCategory::StreetLight).is_some());
    }

    #[test]
    fn override_cannot_replace_identity() {
        let dir = std::env::temp_dir().join(format!("smart_city_overrides_id_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("street_light.toml"),
            r#"
            category = "street_light"
            entity_types = ["StreetLight"]

            [[fields]]
            output = "id"
            extract = { type = "value", attr = "poleId" }

            [[fields]]
            output = "type"
            extract = { type = "value", attr = "lampType" }
            "#,
        )
        .unwrap();

        let mut registry = Registry::default();
        let err = registry.load_overrides(&dir).unwrap_err();
        std::fs::remove_dir_all(&dir).unwrap();

        match err {
            NgsiError::Mapping { path, message } => {
                assert!(path.ends_with("street_light.toml"));
                assert!(message.contains("`id`"), "{message}");
            }
            other => panic!("expected mapping error, got {other}"),
        }

        let record = registry
            .flatten(&json!({
                "id": "urn:ngsi-ld:StreetLight:001",
                "type": "StreetLight",
                "poleId": {"value": "SL-012"},
                "lampType": {"value": "led"}
            }))
            .unwrap();
        assert_eq!(record.id(), Some("urn:ngsi-ld:StreetLight:001"));
        assert_eq!(record.entity_type(), Some("StreetLight"));
        assert_eq!(record.get("pole_id"), Some(&json!("SL-012")));
    }

    #[test]
    fn load_overrides_reports_bad_files() {
        let dir = std::env::temp_dir().join(format!("smart_city_overrides_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("broken.toml"), "category = 42").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let err = Registry::default().load_overrides(&dir).unwrap_err();
        std::fs::remove_dir_all(&dir).unwrap();

        match err {
            NgsiError::Mapping { path, .. } => assert!(path.ends_with("broken.toml")),
            other => panic!("expected mapping error, got {other}"),
        }
    }

    #[test]
    fn load_overrides_replaces_builtin() {
        let dir = std::env::temp_dir().join(format!("smart_city_overrides_ok_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("energy_meter.toml"),
            r#"
            category = "energy_meter"
            entity_types = ["EnergyMeter", "SmartMeter"]

            [[fields]]
            output = "kw"
            extract = { type = "value", attr = "currentPower" }
            "#,
        )
        .unwrap();

        let mut registry = Registry::default();
        let loaded = registry.load_overrides(&dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(loaded, 1);
        let record = registry
            .flatten(&json!({"type": "SmartMeter", "currentPower": {"value": 3.2}}))
            .unwrap();
        assert_eq!(record.get("kw"), Some(&json!(3.2)));
    }
}
