// HTTP API routes: read model, bot lookup, health and metrics.

use axum::{
    extract::{Json, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use crate::db::Database;
use crate::metrics;
use crate::plans::{self, PlanSource};

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TravelPlansParams {
    pub source: Option<String>,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub bot_kind: String,
    pub plan_source: PlanSource,
}

// ── Error helper ──────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn internal_error(e: sqlx::Error) -> impl IntoResponse {
    tracing::error!("Database error: {e}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(db: Arc<Database>, bot_kind: &str, plan_source: PlanSource) -> Router {
    let state = AppState {
        db,
        bot_kind: bot_kind.to_string(),
        plan_source,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/travel-plans", get(travel_plans))
        .route("/api/bots/{id}", get(get_bot))
        .with_state(state)
        .layer(middleware::from_fn(track_requests))
}

/// Count and time every request, labelled by normalized path.
async fn track_requests(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = metrics::normalize_path(req.uri().path());
    let started = Instant::now();

    let response = next.run(req).await;

    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), response.status().as_str()])
        .inc();
    metrics::API_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint.as_str()])
        .observe(started.elapsed().as_secs_f64());
    response
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "botschaft-backend" }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

async fn travel_plans(
    State(state): State<AppState>,
    Query(params): Query<TravelPlansParams>,
) -> impl IntoResponse {
    let source = match params.source.as_deref() {
        Some(raw) => match raw.parse::<PlanSource>() {
            Ok(source) => source,
            Err(msg) => return json_error(StatusCode::BAD_REQUEST, &msg).into_response(),
        },
        None => state.plan_source,
    };

    match plans::get_travel_plans(&state.db, &state.bot_kind, source).await {
        Ok(plans) => (StatusCode::OK, Json(json!(plans))).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn get_bot(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    let bot = match state.db.get_bot(id).await {
        Ok(Some(bot)) => bot,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "Bot not found").into_response(),
        Err(e) => return internal_error(e).into_response(),
    };
    match state.db.list_visits(id).await {
        Ok(visits) => (StatusCode::OK, Json(json!({ "bot": bot, "visits": visits }))).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}
