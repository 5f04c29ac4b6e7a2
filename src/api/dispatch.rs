use crate::auth::{extract_bearer_token, require_auth, AuthGate};
use crate::cab::NearbyCab;
use crate::dispatch::{DispatchError, ProximityClient};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    middleware,
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use tracing::{info, warn};

/// Shared state for the trip API
#[derive(Clone)]
pub struct DispatchAppState {
    pub client: ProximityClient,
    pub auth: AuthGate,
}

/// Rider position as decimal strings, forwarded untouched
#[derive(Debug, Deserialize)]
struct RiderLocation {
    latitude: String,
    longitude: String,
}

fn parse_location(body: &[u8]) -> Result<RiderLocation, DispatchError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "Invalid trip request body");
        DispatchError::InvalidRequest("Invalid request body".to_string())
    })
}

/// Create trip API router
pub fn create_dispatch_router(state: DispatchAppState) -> Router {
    Router::new()
        .route("/api/v1/trip/book", post(book_trip))
        .route("/api/v1/trip/nearby", post(nearby_cabs))
        .route_layer(middleware::from_fn_with_state(state.auth.clone(), require_auth))
        .with_state(state)
}

/// POST /api/v1/trip/book - best available cab for the rider
async fn book_trip(
    State(state): State<DispatchAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<NearbyCab>>, DispatchError> {
    let location = parse_location(&body)?;
    let bearer = extract_bearer_token(&headers).ok();

    let cabs = state
        .client
        .best_available(&location.latitude, &location.longitude, bearer.as_deref())
        .await?;

    info!(results = cabs.len(), "Trip booking answered");
    Ok(Json(cabs))
}

/// POST /api/v1/trip/nearby - busy cabs around the rider
async fn nearby_cabs(
    State(state): State<DispatchAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<NearbyCab>>, DispatchError> {
    let location = parse_location(&body)?;
    let bearer = extract_bearer_token(&headers).ok();

    let cabs = state
        .client
        .nearby_busy(&location.latitude, &location.longitude, bearer.as_deref())
        .await?;

    info!(results = cabs.len(), "Nearby cabs answered");
    Ok(Json(cabs))
}
