use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use botschaft_backend::api;
use botschaft_backend::config::Config;
use botschaft_backend::db::Database;
use botschaft_backend::metrics;
use botschaft_backend::overpass::OverpassClient;
use botschaft_backend::travel::spawn_travel_worker;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();
    metrics::register_metrics();

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    if config.seed_demo {
        match db.seed_demo_bots(&config.bot_kind).await {
            Ok(0) => tracing::info!("Bots already present, skipping demo seed"),
            Ok(n) => tracing::info!("Seeded {n} demo bots"),
            Err(e) => tracing::error!("Failed to seed demo bots: {e}"),
        }
    }

    let provider = OverpassClient::new(&config.overpass_url, config.provider_timeout)
        .expect("Failed to build POI provider client");
    tracing::info!(
        endpoint = provider.endpoint(),
        category = %config.category,
        interval_secs = config.travel_interval.as_secs(),
        "Starting travel cycle"
    );
    spawn_travel_worker(db.clone(), provider, config.travel_settings());

    let app = api::router(db, &config.bot_kind, config.plan_source).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("Botschaft backend listening on {addr}");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
