//! Client for an NGSI-LD context broker (e.g. Orion-LD).
//!
//! Entities come back in the wrapped NGSI-LD shape and are handed to the
//! normalizer unchanged. Writes take entities in the same shape, usually
//! produced by [`crate::builder`].

use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{Map, Value};

use crate::{NgsiError, entities_from_value, retry};

/// Environment variable holding the broker base URL.
pub const BROKER_URL_ENV: &str = "ORION_LD_URL";

/// Broker used when [`BROKER_URL_ENV`] is unset.
pub const DEFAULT_BROKER_URL: &str = "http://localhost:1026";

/// Default page size for entity queries.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

const ENTITIES_PATH: &str = "/ngsi-ld/v1/entities";
const LD_JSON: &str = "application/ld+json";

/// A geo-query restricting results to a region, e.g. `near;maxDistance==2000`
/// around a `Point`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoQuery {
    /// Geo-relationship (`near;maxDistance==2000`, `within`, ...).
    pub georel: String,
    /// Geometry type (`Point`, `Polygon`, ...).
    pub geometry: String,
    /// Coordinates as the broker expects them (`[105.85,21.03]`).
    pub coordinates: String,
}

/// Parameters for `GET /ngsi-ld/v1/entities`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityQuery {
    /// Restrict to one NGSI-LD type.
    pub entity_type: Option<String>,
    /// NGSI-LD query language filter (e.g. `status=="on"`).
    pub q: Option<String>,
    /// Page size.
    pub limit: u64,
    /// Number of entities to skip.
    pub offset: u64,
    /// Optional geographic restriction.
    pub geo: Option<GeoQuery>,
}

impl Default for EntityQuery {
    fn default() -> Self {
        Self {
            entity_type: None,
            q: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
            geo: None,
        }
    }
}

impl EntityQuery {
    /// A query for all entities of `entity_type`.
    #[must_use]
    pub fn for_type(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            ..Self::default()
        }
    }

    /// Query-string parameters in the order the broker documents them.
    #[must_use]
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
        ];
        if let Some(entity_type) = &self.entity_type {
            params.push(("type", entity_type.clone()));
        }
        if let Some(q) = &self.q {
            params.push(("q", q.clone()));
        }
        if let Some(geo) = &self.geo {
            params.push(("georel", geo.georel.clone()));
            params.push(("geometry", geo.geometry.clone()));
            params.push(("coordinates", geo.coordinates.clone()));
        }
        params
    }
}

/// Splits a full entity into its id and the attribute payload for
/// [`BrokerClient::update_entity`]: everything except `id` and `type`,
/// keeping `@context`.
///
/// Returns `None` if the entity has no string `id` or is not an object.
#[must_use]
pub fn update_payload(entity: &Value) -> Option<(String, Value)> {
    let object = entity.as_object()?;
    let id = object.get("id")?.as_str()?.to_string();
    let attributes: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| *key != "id" && *key != "type")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Some((id, Value::Object(attributes)))
}

/// Context-broker HTTP client.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    base_url: String,
    http: reqwest::Client,
}

impl BrokerClient {
    /// Creates a client for the broker at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Creates a client from [`BROKER_URL_ENV`], falling back to
    /// [`DEFAULT_BROKER_URL`].
    #[must_use]
    pub fn from_env() -> Self {
        let url = std::env::var(BROKER_URL_ENV).unwrap_or_else(|_| DEFAULT_BROKER_URL.to_string());
        Self::new(url)
    }

    /// The broker base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the entity collection.
    #[must_use]
    pub fn entities_url(&self) -> String {
        format!("{}{ENTITIES_PATH}", self.base_url)
    }

    /// URL of a single entity. The id is percent-encoded as one path
    /// segment.
    ///
    /// # Errors
    ///
    /// Returns [`NgsiError::Broker`] if the base URL is not a valid
    /// absolute URL.
    pub fn entity_url(&self, entity_id: &str) -> Result<Url, NgsiError> {
        self.entities_url_with(&[entity_id])
    }

    /// URL of an entity's attribute collection (`.../{id}/attrs`).
    ///
    /// # Errors
    ///
    /// Returns [`NgsiError::Broker`] if the base URL is not a valid
    /// absolute URL.
    pub fn entity_attrs_url(&self, entity_id: &str) -> Result<Url, NgsiError> {
        self.entities_url_with(&[entity_id, "attrs"])
    }

    fn entities_url_with(&self, segments: &[&str]) -> Result<Url, NgsiError> {
        let invalid = |reason: String| NgsiError::Broker {
            message: format!("invalid broker URL {}: {reason}", self.base_url),
        };
        let mut url = Url::parse(&self.entities_url()).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base".to_string()))?
            .extend(segments);
        Ok(url)
    }

    /// Runs one entity query and returns the raw entities.
    ///
    /// # Errors
    ///
    /// Returns [`NgsiError`] if the request fails or the broker does not
    /// answer with an array of entity objects.
    pub async fn query_entities(&self, query: &EntityQuery) -> Result<Vec<Value>, NgsiError> {
        let url = self.entities_url();
        let params = query.to_params();
        log::debug!("GET {url} {params:?}");

        let body = retry::send_json(|| {
            self.http
                .get(&url)
                .query(&params)
                .header(ACCEPT, LD_JSON)
        })
        .await?;

        entities_from_value(body)
    }

    /// Fetches a single entity by id.
    ///
    /// # Errors
    ///
    /// Returns [`NgsiError::Broker`] if the entity does not exist and
    /// [`NgsiError`] for transport failures.
    pub async fn get_entity(&self, entity_id: &str) -> Result<Value, NgsiError> {
        let url = self.entity_url(entity_id)?;
        log::debug!("GET {url}");

        retry::send_json(|| self.http.get(url.clone()).header(ACCEPT, LD_JSON)).await
    }

    /// Creates an entity. The entity must carry `id`, `type`, and an
    /// `@context`.
    ///
    /// # Errors
    ///
    /// Returns [`NgsiError::Broker`] if the broker rejects the entity (e.g.
    /// `409 Conflict` when it already exists) and [`NgsiError`] for
    /// transport or serialization failures.
    pub async fn create_entity(&self, entity: &Value) -> Result<(), NgsiError> {
        let url = self.entities_url();
        let body = serde_json::to_vec(entity)?;
        log::debug!("POST {url}");

        retry::send(|| {
            self.http
                .post(&url)
                .header(CONTENT_TYPE, LD_JSON)
                .body(body.clone())
        })
        .await?;

        log::info!("Created entity {}", entity.get("id").unwrap_or(&Value::Null));
        Ok(())
    }

    /// Patches attributes of an existing entity. `attributes` holds
    /// wrapped attributes and, if the names are short, an `@context`.
    ///
    /// # Errors
    ///
    /// Returns [`NgsiError::Broker`] if the entity does not exist and
    /// [`NgsiError`] for transport or serialization failures.
    pub async fn update_entity(&self, entity_id: &str, attributes: &Value) -> Result<(), NgsiError> {
        let url = self.entity_attrs_url(entity_id)?;
        let body = serde_json::to_vec(attributes)?;
        log::debug!("PATCH {url}");

        retry::send(|| {
            self.http
                .patch(url.clone())
                .header(CONTENT_TYPE, LD_JSON)
                .body(body.clone())
        })
        .await?;

        log::info!("Updated entity {entity_id}");
        Ok(())
    }

    /// Deletes an entity.
    ///
    /// # Errors
    ///
    /// Returns [`NgsiError::Broker`] if the entity does not exist and
    /// [`NgsiError`] for transport failures.
    pub async fn delete_entity(&self, entity_id: &str) -> Result<(), NgsiError> {
        let url = self.entity_url(entity_id)?;
        log::debug!("DELETE {url}");

        retry::send(|| self.http.delete(url.clone())).await?;

        log::info!("Deleted entity {entity_id}");
        Ok(())
    }

    /// Pages through all entities of `entity_type`, stopping after `limit`
    /// entities (if given) or at the first short page.
    ///
    /// # Errors
    ///
    /// Returns [`NgsiError`] if any page request fails.
    pub async fn fetch_all(
        &self,
        entity_type: &str,
        page_size: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Value>, NgsiError> {
        let page_size = page_size.max(1);
        let fetch_limit = limit.unwrap_or(u64::MAX);
        let mut all = Vec::new();
        let mut query = EntityQuery::for_type(entity_type);

        loop {
            let remaining = fetch_limit.saturating_sub(query.offset);
            if remaining == 0 {
                break;
            }
            query.limit = remaining.min(page_size);

            log::info!(
                "Fetching {entity_type} entities: offset={}, limit={}",
                query.offset,
                query.limit
            );
            let page = self.query_entities(&query).await?;
            let count = page.len() as u64;
            all.extend(page);

            if count < query.limit {
                break;
            }
            query.offset += count;
        }

        log::info!("Fetched {} {entity_type} entities total", all.len());
        Ok(all)
    }
}
