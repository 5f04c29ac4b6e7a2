use crate::auth::{require_auth, AuthGate};
use crate::cab::{CabRecord, CabUpdate};
use crate::query::QueryError;
use crate::store::{with_timeout, SpatialStore};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// State for cab registration
#[derive(Clone)]
pub struct AdminAppState {
    pub store: Arc<dyn SpatialStore>,
    /// Deadline for each store call
    pub timeout: Duration,
    pub auth: AuthGate,
}

#[derive(Serialize)]
pub struct RegisterCabResponse {
    pub status: &'static str,
    /// False when an existing record was replaced
    pub created: bool,
    pub cab: CabRecord,
}

pub fn create_admin_router(state: AdminAppState) -> Router {
    Router::new()
        .route("/api/v1/cab", post(register_cab))
        .route_layer(middleware::from_fn_with_state(state.auth.clone(), require_auth))
        .with_state(state)
}

/// POST /api/v1/cab - register (or reset) a cab
///
/// Body: `{"id": "...", "location"?: GeoJSON Point, "status"?: "Available" | "Busy"}`.
/// Missing location and status default to headquarters and `Available`.
/// Answers 201 for a new cab, 200 when an existing record was replaced.
async fn register_cab(
    State(state): State<AdminAppState>,
    body: Bytes,
) -> Result<Response, QueryError> {
    let update = CabUpdate::parse_registration(&body)?;

    let existing = with_timeout(state.timeout, "get", state.store.get(&update.id)).await?;
    let cab = with_timeout(
        state.timeout,
        "upsert",
        state.store.upsert(&update, Utc::now()),
    )
    .await
    .map_err(|e| {
        error!(error = %e, cab_id = %update.id, "Failed to register cab");
        QueryError::from(e)
    })?;

    let created = existing.is_none();
    info!(cab_id = %cab.id, status = %cab.status, created, "Cab registered");

    let code = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        code,
        Json(RegisterCabResponse {
            status: "success",
            created,
            cab,
        }),
    )
        .into_response())
}
