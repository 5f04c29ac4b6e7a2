use crate::auth::{require_auth, AuthGate};
use crate::cab::{parse_coordinates, CabStatus, GeoPoint, NearbyCab, ValidationError};
use crate::query::{ProximityQueryService, QueryError, BEST_MATCH_LIMIT};
use axum::{
    extract::{Query, State},
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Shared state for the proximity API
#[derive(Clone)]
pub struct ProximityAppState {
    pub service: Arc<ProximityQueryService>,
    pub auth: AuthGate,
}

/// Query parameters shared by every proximity endpoint.
///
/// Coordinates arrive as decimal strings and are validated here.
#[derive(Debug, Deserialize)]
pub struct ProximityParams {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub status: Option<String>,
    pub limit: Option<String>,
    pub max_distance: Option<String>,
}

impl ProximityParams {
    fn point(&self) -> Result<GeoPoint, ValidationError> {
        parse_coordinates(
            self.latitude.as_deref().unwrap_or(""),
            self.longitude.as_deref().unwrap_or(""),
        )
    }

    fn status(&self) -> Result<CabStatus, ValidationError> {
        match self.status.as_deref() {
            Some(s) => s.parse(),
            None => Err(ValidationError::MissingStatus),
        }
    }

    fn limit(&self) -> Result<usize, ValidationError> {
        match self.limit.as_deref() {
            None => Ok(BEST_MATCH_LIMIT),
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ValidationError::NotANumber("limit", raw.to_string())),
        }
    }

    fn max_distance(&self) -> Result<Option<f64>, ValidationError> {
        match self.max_distance.as_deref() {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| ValidationError::NotANumber("max_distance", raw.to_string())),
        }
    }
}

/// Create proximity API router
pub fn create_proximity_router(state: ProximityAppState) -> Router {
    Router::new()
        .route("/api/v1/cab/available", get(best_available))
        .route("/api/v1/cab/busy", get(nearby_busy))
        .route("/api/v1/cab/nearest", get(find_nearest))
        .route_layer(middleware::from_fn_with_state(state.auth.clone(), require_auth))
        .with_state(state)
}

/// GET /api/v1/cab/available - closest available cab
async fn best_available(
    State(state): State<ProximityAppState>,
    Query(params): Query<ProximityParams>,
) -> Result<Json<Vec<NearbyCab>>, QueryError> {
    let point = params.point()?;
    let cabs = state.service.best_available(point).await?;
    info!(results = cabs.len(), "Fetched best available cab");
    Ok(Json(cabs))
}

/// GET /api/v1/cab/busy - busy cabs within 5 km
async fn nearby_busy(
    State(state): State<ProximityAppState>,
    Query(params): Query<ProximityParams>,
) -> Result<Json<Vec<NearbyCab>>, QueryError> {
    let point = params.point()?;
    let cabs = state.service.nearby_busy(point).await?;
    info!(results = cabs.len(), "Fetched nearby busy cabs");
    Ok(Json(cabs))
}

/// GET /api/v1/cab/nearest - general form
///
/// Query parameters:
/// - `latitude`, `longitude`: required decimal strings
/// - `status`: required, `Available` or `Busy`
/// - `limit`: result cap, default 1
/// - `max_distance`: meters, optional
async fn find_nearest(
    State(state): State<ProximityAppState>,
    Query(params): Query<ProximityParams>,
) -> Result<Json<Vec<NearbyCab>>, QueryError> {
    let point = params.point()?;
    let status = params.status()?;
    let limit = params.limit()?;
    let max_distance = params.max_distance()?;

    let cabs = state
        .service
        .find_nearest(point, status, limit, max_distance)
        .await?;
    Ok(Json(cabs))
}
