// Application configuration, loaded from environment variables and CLI flags.

use std::time::Duration;

use crate::overpass::{Category, DEFAULT_OVERPASS_URL};
use crate::plans::PlanSource;
use crate::travel::TravelSettings;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Overpass API interpreter endpoint.
    pub overpass_url: String,
    /// Tag filter for discovered POIs.
    pub category: Category,
    /// Behavioural kind of bots driven by the travel cycle.
    pub bot_kind: String,
    /// Sleep between travel cycles.
    pub travel_interval: Duration,
    /// Upper bound on a single provider request.
    pub provider_timeout: Duration,
    /// Default history returned by the travel-plans endpoint.
    pub plan_source: PlanSource,
    /// Insert the demo bots when the store has none.
    pub seed_demo: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:botschaft.db?mode=rwc".to_string(),
            port: 3000,
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            category: Category::default(),
            bot_kind: "travelbot".to_string(),
            travel_interval: Duration::from_secs(10),
            provider_timeout: Duration::from_secs(30),
            plan_source: PlanSource::Visited,
            seed_demo: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:botschaft.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `OVERPASS_URL` - Overpass interpreter endpoint
    /// - `POI_CATEGORY` - `key=value` tag filter (default: `amenity=restaurant`)
    /// - `BOT_KIND` - bot kind driven by the cycle (default: `travelbot`)
    /// - `TRAVEL_INTERVAL_SECS` - seconds between cycles (default: 10)
    /// - `PROVIDER_TIMEOUT_SECS` - provider request timeout (default: 30)
    /// - `TRAVEL_PLANS_SOURCE` - `candidates` or `visited` (default: `visited`)
    /// - `BOTSCHAFT_SEED_DEMO` - set to `true` to seed demo bots
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--seed-demo` - Same as `BOTSCHAFT_SEED_DEMO=true`
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build a config from CLI args and an environment lookup.
    pub fn from_sources<F>(args: &[String], env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let database_url = env("DATABASE_URL").unwrap_or(defaults.database_url);

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .or_else(|| env("PORT"))
            .map(|v| parse_or("port", &v, defaults.port))
            .unwrap_or(defaults.port);

        let overpass_url = env("OVERPASS_URL").unwrap_or(defaults.overpass_url);

        let category = match env("POI_CATEGORY") {
            Some(v) => Category::parse(&v).unwrap_or_else(|| {
                tracing::warn!("Invalid POI_CATEGORY '{v}', using {}", defaults.category);
                defaults.category.clone()
            }),
            None => defaults.category,
        };

        let bot_kind = env("BOT_KIND").unwrap_or(defaults.bot_kind);

        let travel_interval = env("TRAVEL_INTERVAL_SECS")
            .map(|v| Duration::from_secs(parse_or("TRAVEL_INTERVAL_SECS", &v, 10)))
            .unwrap_or(defaults.travel_interval);

        // A zero timeout would fail every request; fall back to the default.
        let provider_timeout = env("PROVIDER_TIMEOUT_SECS")
            .map(|v| parse_or("PROVIDER_TIMEOUT_SECS", &v, 30u64).max(1))
            .map(Duration::from_secs)
            .unwrap_or(defaults.provider_timeout);

        let plan_source = env("TRAVEL_PLANS_SOURCE")
            .map(|v| parse_or("TRAVEL_PLANS_SOURCE", &v, defaults.plan_source))
            .unwrap_or(defaults.plan_source);

        let seed_demo = args.iter().any(|a| a == "--seed-demo")
            || env("BOTSCHAFT_SEED_DEMO")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false);

        Config {
            database_url,
            port,
            overpass_url,
            category,
            bot_kind,
            travel_interval,
            provider_timeout,
            plan_source,
            seed_demo,
        }
    }

    pub fn travel_settings(&self) -> TravelSettings {
        TravelSettings {
            kind: self.bot_kind.clone(),
            category: self.category.clone(),
            interval: self.travel_interval,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

fn parse_or<T>(name: &str, raw: &str, fallback: T) -> T
where
    T: std::str::FromStr + std::fmt::Debug,
{
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid value '{raw}' for {name}, using {fallback:?}");
        fallback
    })
}
