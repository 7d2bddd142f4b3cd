//! HTTP surface over the library API: producers hit `/process`, operators
//! hit `/stats` and the `/admin/*` escape hatches.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::arbiter::{Arbiter, ArbiterStats};
use crate::content::{ContentPayload, ProcessOutcome};

#[derive(Clone)]
pub struct AppState {
    pub arbiter: Arc<Arbiter>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/process", post(process))
        .route("/stats", get(stats))
        .route("/admin/clear-queue", post(admin_clear_queue))
        .route("/admin/source-priority", post(admin_source_priority))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct ProcessReq {
    content_id: String,
    source: String,
    #[serde(default)]
    payload: ContentPayload,
}

async fn process(
    State(state): State<AppState>,
    Json(body): Json<ProcessReq>,
) -> Json<ProcessOutcome> {
    let outcome = state
        .arbiter
        .process(&body.content_id, &body.source, &body.payload)
        .await;
    Json(outcome)
}

async fn stats(State(state): State<AppState>) -> Json<ArbiterStats> {
    Json(state.arbiter.get_stats())
}

#[derive(serde::Deserialize)]
struct ClearQueueReq {
    #[serde(default = "default_clear_reason")]
    reason: String,
}

fn default_clear_reason() -> String {
    "manual".to_string()
}

#[derive(serde::Serialize)]
struct ClearQueueResp {
    cleared: usize,
}

async fn admin_clear_queue(
    State(state): State<AppState>,
    Json(body): Json<ClearQueueReq>,
) -> Json<ClearQueueResp> {
    let cleared = state.arbiter.force_clear_queue(&body.reason);
    Json(ClearQueueResp { cleared })
}

#[derive(serde::Deserialize)]
struct SourcePriorityReq {
    // Non-array JSON fails deserialization and never reaches the arbiter.
    order: Vec<String>,
}

async fn admin_source_priority(
    State(state): State<AppState>,
    Json(body): Json<SourcePriorityReq>,
) -> Result<Json<ArbiterStats>, (StatusCode, String)> {
    state
        .arbiter
        .update_source_priority(body.order)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(state.arbiter.get_stats()))
}
