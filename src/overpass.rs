// POI provider client: batched Overpass QL queries and response parsing.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::Bot;
use crate::error::TravelError;
use crate::geo::Coordinate;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// A point of interest as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub external_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub tags: HashMap<String, String>,
}

impl Poi {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// The tag filter applied to every clause, e.g. `amenity=restaurant`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub key: String,
    pub value: String,
}

impl Category {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// Parse `key=value`. Both halves must be non-empty.
    pub fn parse(s: &str) -> Option<Self> {
        let (key, value) = s.split_once('=')?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self::new(key, value))
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::new("amenity", "restaurant")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// One batched Overpass QL request: a union of `around` clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverpassQuery {
    clauses: Vec<String>,
}

impl OverpassQuery {
    pub fn clauses(&self) -> &[String] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for OverpassQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[out:json];({});out;", self.clauses.concat())
    }
}

/// Build a single query with one clause per bot, in the order given.
/// Bots sharing a position still get their own clause.
pub fn build_query(bots: &[Bot], category: &Category) -> OverpassQuery {
    let clauses = bots
        .iter()
        .map(|bot| {
            format!(
                "node(around:{:.6},{:.6},{:.6})[{}={}];",
                bot.radius_meters, bot.latitude, bot.longitude, category.key, category.value
            )
        })
        .collect();
    OverpassQuery { clauses }
}

#[derive(Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Parse an Overpass JSON body into POIs.
///
/// A body without an `elements` array is malformed. Elements without a
/// position (ways/relations without `out center`) are skipped.
pub fn parse_elements(body: &str) -> Result<Vec<Poi>, TravelError> {
    let response: OverpassResponse = serde_json::from_str(body)
        .map_err(|e| TravelError::ProviderMalformedResponse(e.to_string()))?;

    let pois = response
        .elements
        .into_iter()
        .filter_map(|el| match (el.lat, el.lon) {
            (Some(latitude), Some(longitude)) => Some(Poi {
                external_id: el.id,
                latitude,
                longitude,
                tags: el.tags,
            }),
            _ => {
                tracing::debug!(osm_id = el.id, "Skipping element without coordinates");
                None
            }
        })
        .collect();
    Ok(pois)
}

/// Source of POIs for the travel cycle.
pub trait PoiProvider: Send + Sync {
    fn fetch(
        &self,
        query: &OverpassQuery,
    ) -> impl Future<Output = Result<Vec<Poi>, TravelError>> + Send;
}

/// HTTP client for an Overpass API interpreter endpoint.
#[derive(Debug, Clone)]
pub struct OverpassClient {
    client: reqwest::Client,
    endpoint: String,
}

impl OverpassClient {
    /// Every request is bounded by `timeout`.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TravelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("botschaft-backend/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PoiProvider for OverpassClient {
    async fn fetch(&self, query: &OverpassQuery) -> Result<Vec<Poi>, TravelError> {
        let data = query.to_string();
        let body = self
            .client
            .get(&self.endpoint)
            .query(&[("data", data.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_elements(&body)
    }
}
