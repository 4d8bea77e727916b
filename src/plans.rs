// Read model: each travel bot's position plus its candidate or visit history.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::db::{self, Bot, Database, HistoryEntry, VISIT_MAYBE, VISIT_VISITED};

/// Which history the read model returns alongside each bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanSource {
    Candidates,
    #[default]
    Visited,
}

impl PlanSource {
    fn visit_type(self) -> &'static str {
        match self {
            PlanSource::Candidates => VISIT_MAYBE,
            PlanSource::Visited => VISIT_VISITED,
        }
    }
}

impl FromStr for PlanSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "candidates" | "maybe" => Ok(PlanSource::Candidates),
            "visited" => Ok(PlanSource::Visited),
            other => Err(format!("unknown plan source '{other}'")),
        }
    }
}

impl fmt::Display for PlanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanSource::Candidates => write!(f, "candidates"),
            PlanSource::Visited => write!(f, "visited"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedPoi {
    pub osm_id: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    pub visit_type: String,
    pub recorded_at: String,
    pub tags: BTreeMap<String, String>,
}

impl From<HistoryEntry> for PlannedPoi {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            osm_id: entry.osm_id,
            latitude: entry.latitude,
            longitude: entry.longitude,
            tags: entry.tags.to_map(),
            visit_type: entry.visit_type,
            recorded_at: entry.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TravelPlan {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub pois: Vec<PlannedPoi>,
}

impl TravelPlan {
    fn new(bot: Bot, history: Vec<HistoryEntry>) -> Self {
        Self {
            id: bot.id,
            name: bot.name,
            latitude: bot.latitude,
            longitude: bot.longitude,
            radius_meters: bot.radius_meters,
            pois: history.into_iter().map(PlannedPoi::from).collect(),
        }
    }
}

/// Snapshot of every bot of `kind` with its history from `source`.
///
/// All reads share one transaction, so a bot's position and its visit log
/// come from the same committed state. Never writes.
pub async fn get_travel_plans(
    db: &Database,
    kind: &str,
    source: PlanSource,
) -> Result<Vec<TravelPlan>, sqlx::Error> {
    let mut tx = db.begin_read().await?;

    let bots = db::list_bots_with(&mut *tx, kind).await?;
    let mut plans = Vec::with_capacity(bots.len());
    for bot in bots {
        let history = db::list_history(&mut *tx, bot.id, source.visit_type()).await?;
        plans.push(TravelPlan::new(bot, history));
    }

    tx.rollback().await?;
    Ok(plans)
}
