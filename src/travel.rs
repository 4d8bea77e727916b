// Travel cycle: load bots, discover POIs, keep those in range, move each bot, clear candidates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::db::{Bot, Database};
use crate::error::TravelError;
use crate::geo::{distance_km, within_radius, Coordinate};
use crate::metrics;
use crate::overpass::{build_query, Category, Poi, PoiProvider};

/// What the cycle runs on and how often.
#[derive(Debug, Clone)]
pub struct TravelSettings {
    /// Behavioural kind of bots the cycle drives.
    pub kind: String,
    pub category: Category,
    pub interval: Duration,
}

impl Default for TravelSettings {
    fn default() -> Self {
        Self {
            kind: "travelbot".to_string(),
            category: Category::default(),
            interval: Duration::from_secs(10),
        }
    }
}

/// Outcome of one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub bots: usize,
    pub pois_fetched: usize,
    pub candidates_saved: usize,
    pub moved: usize,
}

/// POIs from `pois` that lie strictly within the bot's radius.
pub fn candidates_for(bot: &Bot, pois: &[Poi]) -> Vec<Poi> {
    let here = bot.coordinate();
    pois.iter()
        .filter(|poi| within_radius(distance_km(here, poi.coordinate()), bot.radius_meters))
        .cloned()
        .collect()
}

/// Run one full iteration over every bot of `settings.kind`.
///
/// Candidates of every loaded bot are cleared before returning, whether the
/// iteration succeeded or not. A provider transport failure returns
/// `ProviderUnavailable` without writing candidates or moving anyone; a
/// malformed provider response counts as zero POIs.
pub async fn run_cycle<P, R>(
    db: &Database,
    provider: &P,
    settings: &TravelSettings,
    rng: &mut R,
) -> Result<CycleReport, TravelError>
where
    P: PoiProvider,
    R: Rng + Send,
{
    let bots = db.list_bots(&settings.kind).await?;
    metrics::TRAVEL_BOTS.set(bots.len() as i64);

    let outcome = advance_bots(db, provider, settings, rng, &bots).await;

    let mut clear_error = None;
    for bot in &bots {
        if let Err(e) = db.clear_candidates(Some(bot.id)).await {
            tracing::error!(bot_id = bot.id, "Failed to clear candidates: {e}");
            clear_error.get_or_insert(e);
        }
    }

    let report = outcome?;
    match clear_error {
        Some(e) => Err(e.into()),
        None => Ok(report),
    }
}

async fn advance_bots<P, R>(
    db: &Database,
    provider: &P,
    settings: &TravelSettings,
    rng: &mut R,
    bots: &[Bot],
) -> Result<CycleReport, TravelError>
where
    P: PoiProvider,
    R: Rng + Send,
{
    let mut report = CycleReport {
        bots: bots.len(),
        ..CycleReport::default()
    };
    if bots.is_empty() {
        return Ok(report);
    }

    // Discover
    let pois = discover(provider, settings, bots).await?;
    report.pois_fetched = pois.len();
    metrics::POIS_FETCHED_TOTAL.inc_by(pois.len() as u64);

    // Filter & persist
    for bot in bots {
        let in_range = candidates_for(bot, &pois);
        let saved = db.save_candidates(bot.id, &in_range).await?;
        tracing::debug!(bot_id = bot.id, candidates = saved, "Saved candidates");
        report.candidates_saved += saved;
    }
    metrics::CANDIDATES_SAVED_TOTAL.inc_by(report.candidates_saved as u64);

    // Pick & advance
    for bot in bots {
        let candidates = db.list_candidates(bot.id).await?;
        let destination = candidates.choose(rng);
        let after = db.commit_visit(bot, destination).await?;
        if destination.is_some() {
            report.moved += 1;
            tracing::info!(
                bot_id = bot.id,
                name = %bot.name,
                lat = after.latitude,
                lon = after.longitude,
                "Bot travelled"
            );
        } else {
            tracing::debug!(bot_id = bot.id, "No candidates, bot stays put");
        }
    }
    metrics::BOTS_MOVED_TOTAL.inc_by(report.moved as u64);

    Ok(report)
}

/// Query the provider for every bot with a usable position.
async fn discover<P: PoiProvider>(
    provider: &P,
    settings: &TravelSettings,
    bots: &[Bot],
) -> Result<Vec<Poi>, TravelError> {
    let queryable: Vec<Bot> = bots
        .iter()
        .filter(|bot| match Coordinate::checked(bot.latitude, bot.longitude) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(bot_id = bot.id, "Leaving bot out of POI query: {e}");
                false
            }
        })
        .cloned()
        .collect();
    if queryable.is_empty() {
        return Ok(Vec::new());
    }

    let query = build_query(&queryable, &settings.category);
    match provider.fetch(&query).await {
        Ok(pois) => Ok(pois),
        Err(TravelError::ProviderMalformedResponse(msg)) => {
            tracing::warn!("POI provider sent a malformed response, treating as no POIs: {msg}");
            metrics::PROVIDER_FAILURES_TOTAL
                .with_label_values(&["provider_malformed_response"])
                .inc();
            Ok(Vec::new())
        }
        Err(e) => {
            metrics::PROVIDER_FAILURES_TOTAL
                .with_label_values(&[e.kind()])
                .inc();
            Err(e)
        }
    }
}

/// Spawn the background travel loop. Each iteration runs `run_cycle`, logs
/// any failure, then sleeps `settings.interval`. It never exits on its own.
pub fn spawn_travel_worker<P>(
    db: Arc<Database>,
    provider: P,
    settings: TravelSettings,
) -> tokio::task::JoinHandle<()>
where
    P: PoiProvider + 'static,
{
    tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        loop {
            let started = Instant::now();
            match run_cycle(&db, &provider, &settings, &mut rng).await {
                Ok(report) => {
                    metrics::CYCLES_TOTAL.with_label_values(&["ok"]).inc();
                    tracing::info!(
                        bots = report.bots,
                        pois = report.pois_fetched,
                        candidates = report.candidates_saved,
                        moved = report.moved,
                        "Travel cycle complete"
                    );
                }
                Err(e @ TravelError::StoreUnavailable(_)) => {
                    metrics::CYCLES_TOTAL.with_label_values(&[e.kind()]).inc();
                    tracing::error!("Travel cycle failed: {e}");
                }
                Err(e) => {
                    metrics::CYCLES_TOTAL.with_label_values(&[e.kind()]).inc();
                    tracing::warn!("Travel cycle skipped: {e}");
                }
            }
            metrics::CYCLE_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

            tokio::time::sleep(settings.interval).await;
        }
    })
}
