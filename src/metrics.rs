// Prometheus metrics definitions for the travel engine.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Bots loaded by the most recent travel cycle.
    pub static ref TRAVEL_BOTS: IntGauge =
        IntGauge::new("botschaft_travel_bots", "Bots loaded by the last travel cycle").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Travel cycles run, by outcome (ok, or the error kind that ended them).
    pub static ref CYCLES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("botschaft_travel_cycles_total", "Travel cycles run"),
        &["outcome"],
    )
    .unwrap();

    pub static ref POIS_FETCHED_TOTAL: IntCounter = IntCounter::new(
        "botschaft_pois_fetched_total",
        "POIs returned by the provider",
    )
    .unwrap();

    pub static ref CANDIDATES_SAVED_TOTAL: IntCounter = IntCounter::new(
        "botschaft_candidates_saved_total",
        "Candidate POIs recorded for bots",
    )
    .unwrap();

    pub static ref BOTS_MOVED_TOTAL: IntCounter = IntCounter::new(
        "botschaft_bots_moved_total",
        "Bot moves to a new POI",
    )
    .unwrap();

    /// Provider failures, by kind (provider_unavailable, provider_malformed_response).
    pub static ref PROVIDER_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("botschaft_provider_failures_total", "POI provider failures"),
        &["kind"],
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("botschaft_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Wall time of one travel cycle, excluding the sleep.
    pub static ref CYCLE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("botschaft_travel_cycle_duration_seconds", "Travel cycle duration in seconds")
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )
    .unwrap();

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "botschaft_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["endpoint"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(TRAVEL_BOTS.clone()),
        Box::new(CYCLES_TOTAL.clone()),
        Box::new(POIS_FETCHED_TOTAL.clone()),
        Box::new(CANDIDATES_SAVED_TOTAL.clone()),
        Box::new(BOTS_MOVED_TOTAL.clone()),
        Box::new(PROVIDER_FAILURES_TOTAL.clone()),
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(CYCLE_DURATION_SECONDS.clone()),
        Box::new(API_REQUEST_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::warn!("Metric registration skipped: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Normalize a URL path for metric labels: replace numeric path segments with `:id`
/// to prevent cardinality explosion.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.parse::<i64>().is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
