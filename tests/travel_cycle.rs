// Integration tests for the travel cycle: discover -> filter -> persist -> pick -> clear,
// driven against an in-memory store and a scripted POI provider.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::SeedableRng;

use botschaft_backend::db::{Bot, Database};
use botschaft_backend::error::TravelError;
use botschaft_backend::geo::EARTH_RADIUS_KM;
use botschaft_backend::overpass::{OverpassQuery, Poi, PoiProvider};
use botschaft_backend::plans::{get_travel_plans, PlanSource};
use botschaft_backend::travel::{run_cycle, TravelSettings};

const BOT_LAT: f64 = 41.7186;
const BOT_LON: f64 = 44.7955;

/// Replies with a fixed answer and remembers every query it was sent.
struct ScriptedProvider {
    reply: fn() -> Result<Vec<Poi>, TravelError>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(reply: fn() -> Result<Vec<Poi>, TravelError>) -> Self {
        Self {
            reply,
            queries: Mutex::new(Vec::new()),
        }
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl PoiProvider for ScriptedProvider {
    async fn fetch(&self, query: &OverpassQuery) -> Result<Vec<Poi>, TravelError> {
        self.queries.lock().unwrap().push(query.to_string());
        (self.reply)()
    }
}

/// Latitude `meters` due north of the test bot.
fn north_of_bot(meters: f64) -> f64 {
    BOT_LAT + (meters / 1000.0) / EARTH_RADIUS_KM * 180.0 / std::f64::consts::PI
}

fn poi(id: i64, lat: f64, lon: f64, name: &str) -> Poi {
    let mut tags = HashMap::new();
    tags.insert("amenity".to_string(), "restaurant".to_string());
    tags.insert("name".to_string(), name.to_string());
    Poi {
        external_id: id,
        latitude: lat,
        longitude: lon,
        tags,
    }
}

fn three_rings() -> Result<Vec<Poi>, TravelError> {
    Ok(vec![
        poi(200, north_of_bot(200.0), BOT_LON, "Near"),
        poi(800, north_of_bot(800.0), BOT_LON, "Middle"),
        poi(1500, north_of_bot(1500.0), BOT_LON, "Far"),
    ])
}

fn nothing_found() -> Result<Vec<Poi>, TravelError> {
    Ok(Vec::new())
}

fn transport_failure() -> Result<Vec<Poi>, TravelError> {
    Err(TravelError::ProviderUnavailable("connection refused".into()))
}

fn garbage_payload() -> Result<Vec<Poi>, TravelError> {
    Err(TravelError::ProviderMalformedResponse("expected value at line 1".into()))
}

async fn db_with_bot() -> (Database, Bot) {
    let db = Database::in_memory().await.unwrap();
    let bot = db
        .create_bot("mochimochi", "travelbot", BOT_LAT, BOT_LON, 1000.0)
        .await
        .unwrap();
    (db, bot)
}

#[tokio::test]
async fn test_cycle_moves_bot_to_poi_within_radius() {
    let (db, bot) = db_with_bot().await;
    let provider = ScriptedProvider::new(three_rings);
    let settings = TravelSettings::default();
    let mut rng = StdRng::seed_from_u64(7);

    let report = run_cycle(&db, &provider, &settings, &mut rng).await.unwrap();
    assert_eq!(report.bots, 1);
    assert_eq!(report.pois_fetched, 3);
    assert_eq!(report.candidates_saved, 2);
    assert_eq!(report.moved, 1);

    let moved = db.get_bot(bot.id).await.unwrap().unwrap();
    let near = (north_of_bot(200.0), BOT_LON);
    let middle = (north_of_bot(800.0), BOT_LON);
    let at = (moved.latitude, moved.longitude);
    assert!(at == near || at == middle, "bot ended at {at:?}");
    assert_ne!(moved.poi_id, Some(1500));

    assert!(db.list_candidates(bot.id).await.unwrap().is_empty());

    let visits = db.list_visits(bot.id).await.unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!((visits[0].latitude, visits[0].longitude), (BOT_LAT, BOT_LON));
}

#[tokio::test]
async fn test_far_poi_is_never_picked() {
    for seed in 0..32 {
        let (db, bot) = db_with_bot().await;
        let provider = ScriptedProvider::new(three_rings);
        let mut rng = StdRng::seed_from_u64(seed);

        run_cycle(&db, &provider, &TravelSettings::default(), &mut rng)
            .await
            .unwrap();

        let moved = db.get_bot(bot.id).await.unwrap().unwrap();
        assert!(matches!(moved.poi_id, Some(200) | Some(800)), "seed {seed}: {:?}", moved.poi_id);
    }
}

#[tokio::test]
async fn test_same_seed_same_pick() {
    let mut picks = Vec::new();
    for _ in 0..2 {
        let (db, bot) = db_with_bot().await;
        let provider = ScriptedProvider::new(three_rings);
        let mut rng = StdRng::seed_from_u64(42);
        run_cycle(&db, &provider, &TravelSettings::default(), &mut rng)
            .await
            .unwrap();
        picks.push(db.get_bot(bot.id).await.unwrap().unwrap().poi_id);
    }
    assert_eq!(picks[0], picks[1]);
}

#[tokio::test]
async fn test_empty_provider_result_keeps_position_and_logs_visit() {
    let (db, bot) = db_with_bot().await;
    let provider = ScriptedProvider::new(nothing_found);
    let mut rng = StdRng::seed_from_u64(1);

    let report = run_cycle(&db, &provider, &TravelSettings::default(), &mut rng)
        .await
        .unwrap();
    assert_eq!(report.candidates_saved, 0);
    assert_eq!(report.moved, 0);

    assert_eq!(db.get_bot(bot.id).await.unwrap().unwrap(), bot);
    assert!(db.list_candidates(bot.id).await.unwrap().is_empty());
    let visits = db.list_visits(bot.id).await.unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!((visits[0].latitude, visits[0].longitude), (BOT_LAT, BOT_LON));
}

#[tokio::test]
async fn test_provider_failure_changes_nothing() {
    let (db, bot) = db_with_bot().await;
    let provider = ScriptedProvider::new(transport_failure);
    let mut rng = StdRng::seed_from_u64(1);

    let result = run_cycle(&db, &provider, &TravelSettings::default(), &mut rng).await;
    assert!(matches!(result, Err(TravelError::ProviderUnavailable(_))));

    assert_eq!(db.get_bot(bot.id).await.unwrap().unwrap(), bot);
    assert!(db.list_candidates(bot.id).await.unwrap().is_empty());
    assert_eq!(db.count_visits(bot.id).await.unwrap(), 0);

    // The next round recovers normally.
    let provider = ScriptedProvider::new(three_rings);
    run_cycle(&db, &provider, &TravelSettings::default(), &mut rng)
        .await
        .unwrap();
    assert_eq!(db.count_visits(bot.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_provider_failure_clears_leftover_candidates() {
    let (db, bot) = db_with_bot().await;
    // Leftovers from an interrupted earlier run.
    db.save_candidates(bot.id, &three_rings().unwrap()).await.unwrap();
    assert_eq!(db.list_candidates(bot.id).await.unwrap().len(), 3);

    let provider = ScriptedProvider::new(transport_failure);
    let mut rng = StdRng::seed_from_u64(1);
    let _ = run_cycle(&db, &provider, &TravelSettings::default(), &mut rng).await;

    assert!(db.list_candidates(bot.id).await.unwrap().is_empty());
    assert_eq!(db.get_bot(bot.id).await.unwrap().unwrap(), bot);
}

#[tokio::test]
async fn test_malformed_response_counts_as_no_pois() {
    let (db, bot) = db_with_bot().await;
    let provider = ScriptedProvider::new(garbage_payload);
    let mut rng = StdRng::seed_from_u64(1);

    let report = run_cycle(&db, &provider, &TravelSettings::default(), &mut rng)
        .await
        .unwrap();
    assert_eq!(report.pois_fetched, 0);
    assert_eq!(db.get_bot(bot.id).await.unwrap().unwrap(), bot);
    assert_eq!(db.count_visits(bot.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_no_bots_means_no_query() {
    let db = Database::in_memory().await.unwrap();
    let provider = ScriptedProvider::new(three_rings);
    let mut rng = StdRng::seed_from_u64(1);

    let report = run_cycle(&db, &provider, &TravelSettings::default(), &mut rng)
        .await
        .unwrap();
    assert_eq!(report.bots, 0);
    assert!(provider.queries().is_empty());
}

#[tokio::test]
async fn test_one_batched_query_for_all_bots() {
    let db = Database::in_memory().await.unwrap();
    db.create_bot("a", "travelbot", BOT_LAT, BOT_LON, 1000.0).await.unwrap();
    db.create_bot("b", "travelbot", BOT_LAT, BOT_LON, 1000.0).await.unwrap();
    db.create_bot("c", "travelbot", 41.717785, 44.794949, 300.0).await.unwrap();
    db.create_bot("elsewhere", "stayhome", 0.0, 0.0, 1.0).await.unwrap();

    let provider = ScriptedProvider::new(nothing_found);
    let mut rng = StdRng::seed_from_u64(1);
    run_cycle(&db, &provider, &TravelSettings::default(), &mut rng)
        .await
        .unwrap();

    let queries = provider.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].matches("node(around:").count(), 3);
    assert!(queries[0].contains("node(around:300.000000,41.717785,44.794949)[amenity=restaurant];"));
}

#[tokio::test]
async fn test_each_bot_filters_against_its_own_radius() {
    let db = Database::in_memory().await.unwrap();
    let wide = db.create_bot("wide", "travelbot", BOT_LAT, BOT_LON, 2000.0).await.unwrap();
    let narrow = db.create_bot("narrow", "travelbot", BOT_LAT, BOT_LON, 500.0).await.unwrap();
    let provider = ScriptedProvider::new(three_rings);
    let mut rng = StdRng::seed_from_u64(3);

    let report = run_cycle(&db, &provider, &TravelSettings::default(), &mut rng)
        .await
        .unwrap();
    // wide sees all three, narrow only the 200 m one; the 200 m POI counts for both.
    assert_eq!(report.candidates_saved, 4);
    assert_eq!(report.moved, 2);

    let narrow_after = db.get_bot(narrow.id).await.unwrap().unwrap();
    assert_eq!(narrow_after.poi_id, Some(200));
    let wide_after = db.get_bot(wide.id).await.unwrap().unwrap();
    assert!(matches!(wide_after.poi_id, Some(200) | Some(800) | Some(1500)));
}

#[tokio::test]
async fn test_visit_history_grows_by_one_per_cycle() {
    let (db, bot) = db_with_bot().await;
    let mut rng = StdRng::seed_from_u64(11);

    for round in 1..=3 {
        let provider = ScriptedProvider::new(if round == 2 { nothing_found } else { three_rings });
        run_cycle(&db, &provider, &TravelSettings::default(), &mut rng)
            .await
            .unwrap();
        assert_eq!(db.count_visits(bot.id).await.unwrap(), round);
        assert!(db.list_candidates(bot.id).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_invalid_coordinates_left_out_of_query() {
    let db = Database::in_memory().await.unwrap();
    let good = db.create_bot("good", "travelbot", BOT_LAT, BOT_LON, 1000.0).await.unwrap();
    let broken = db.create_bot("broken", "travelbot", 123.0, 44.0, 1000.0).await.unwrap();

    let provider = ScriptedProvider::new(three_rings);
    let mut rng = StdRng::seed_from_u64(5);
    run_cycle(&db, &provider, &TravelSettings::default(), &mut rng)
        .await
        .unwrap();

    let queries = provider.queries();
    assert_eq!(queries[0].matches("node(around:").count(), 1);
    assert!(!queries[0].contains("123.000000"));

    assert!(db.get_bot(good.id).await.unwrap().unwrap().poi_id.is_some());
    assert_eq!(db.get_bot(broken.id).await.unwrap().unwrap(), broken);
    assert_eq!(db.count_visits(broken.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_visited_read_model_carries_tags_after_two_cycles() {
    let (db, bot) = db_with_bot().await;
    let mut rng = StdRng::seed_from_u64(9);

    let provider = ScriptedProvider::new(three_rings);
    run_cycle(&db, &provider, &TravelSettings::default(), &mut rng)
        .await
        .unwrap();
    let provider = ScriptedProvider::new(nothing_found);
    run_cycle(&db, &provider, &TravelSettings::default(), &mut rng)
        .await
        .unwrap();

    let plans = get_travel_plans(&db, "travelbot", PlanSource::Visited)
        .await
        .unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].id, bot.id);
    let pois = &plans[0].pois;
    assert_eq!(pois.len(), 2);
    // First visit: the onboarding position, no POI behind it.
    assert!(pois[0].tags.is_empty());
    // Second visit: the restaurant chosen in cycle one.
    let name = pois[1].tags.get("name").map(String::as_str);
    assert!(matches!(name, Some("Near") | Some("Middle")), "got {name:?}");

    let candidates = get_travel_plans(&db, "travelbot", PlanSource::Candidates)
        .await
        .unwrap();
    assert!(candidates[0].pois.is_empty());
}
