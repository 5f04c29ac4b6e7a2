use crate::ingest::IngestionMultiplexer;
use crate::merge::MergeStats;
use crate::store::SpatialStore;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// Shared state for the health endpoint
#[derive(Clone)]
pub struct HealthAppState {
    pub store: Arc<dyn SpatialStore>,
    pub mux: Arc<IngestionMultiplexer>,
    pub merge_stats: Arc<MergeStats>,
}

#[derive(Debug, Serialize)]
pub struct MergeCounters {
    pub applied: u64,
    pub failed: u64,
    pub retried: u64,
    pub dropped_overflow: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cabs: usize,
    pub live_connections: usize,
    pub merge: MergeCounters,
}

/// Create health router (never behind auth)
pub fn create_health_router(state: HealthAppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .with_state(state)
}

/// GET /api/v1/health
async fn health(
    State(state): State<HealthAppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<serde_json::Value>)> {
    let cabs = state.store.count().await.map_err(|e| {
        error!(error = %e, "Health check could not reach store");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })?;

    let merge = state.merge_stats.snapshot();

    Ok(Json(HealthResponse {
        status: "ok",
        cabs,
        live_connections: state.mux.live_connections(),
        merge: MergeCounters {
            applied: merge.applied,
            failed: merge.failed,
            retried: merge.retried,
            dropped_overflow: state.mux.delivery_stats().dropped_overflow(),
        },
    }))
}
