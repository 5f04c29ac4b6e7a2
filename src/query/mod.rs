// Proximity queries over the spatial store

use crate::cab::{CabStatus, GeoPoint, NearbyCab, ValidationError, MAX_LIMIT};
use crate::store::{with_timeout, NearestQuery, SpatialStore, StoreTimeout};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};


/// Best match: the single closest available cab, any distance
pub const BEST_MATCH_LIMIT: usize = 1;

/// Nearby busy cabs shown to a rider
pub const NEARBY_BUSY_LIMIT: usize = 5;

/// Radius for nearby busy cabs (meters)
pub const NEARBY_BUSY_RADIUS_M: f64 = 5000.0;

/// Proximity query errors
#[derive(Debug)]
pub enum QueryError {
    /// Bad input; no query was issued
    Validation(ValidationError),
    /// Store did not answer in time
    Timeout(StoreTimeout),
    /// Any other store failure
    Store(String),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::Validation(e) => write!(f, "{}", e),
            QueryError::Timeout(e) => write!(f, "{}", e),
            QueryError::Store(msg) => write!(f, "Store error: {}", msg),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<ValidationError> for QueryError {
    fn from(e: ValidationError) -> Self {
        QueryError::Validation(e)
    }
}

impl From<anyhow::Error> for QueryError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<StoreTimeout>() {
            Ok(timeout) => QueryError::Timeout(timeout),
            Err(e) => QueryError::Store(format!("{:#}", e)),
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueryError::Validation(_) => StatusCode::BAD_REQUEST,
            QueryError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Distance-ranked cab lookups with input validation and a store deadline
pub struct ProximityQueryService {
    store: Arc<dyn SpatialStore>,
    timeout: Duration,
}

impl ProximityQueryService {
    pub fn new(store: Arc<dyn SpatialStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Up to `limit` cabs with `status`, nearest first.
    ///
    /// Equal distances are ordered by id. `max_distance_m` caps the search
    /// radius when given.
    pub async fn find_nearest(
        &self,
        point: GeoPoint,
        status: CabStatus,
        limit: usize,
        max_distance_m: Option<f64>,
    ) -> Result<Vec<NearbyCab>, QueryError> {
        if limit == 0 || limit > MAX_LIMIT {
            return Err(ValidationError::InvalidLimit(limit).into());
        }
        if let Some(max) = max_distance_m {
            if !max.is_finite() || max < 0.0 {
                return Err(ValidationError::InvalidMaxDistance(max).into());
            }
        }

        let query = NearestQuery {
            near: point,
            status: Some(status),
            limit,
            max_distance_m,
        };

        let results = with_timeout(self.timeout, "query", self.store.find_nearest(&query))
            .await
            .map_err(|e| {
                error!(error = %e, status = %status, "Proximity query failed");
                QueryError::from(e)
            })?;

        debug!(
            latitude = point.latitude(),
            longitude = point.longitude(),
            status = %status,
            results = results.len(),
            "Proximity query answered"
        );

        Ok(results)
    }

    /// Closest available cab
    pub async fn best_available(&self, point: GeoPoint) -> Result<Vec<NearbyCab>, QueryError> {
        self.find_nearest(point, CabStatus::Available, BEST_MATCH_LIMIT, None)
            .await
    }

    /// Up to five busy cabs within 5 km
    pub async fn nearby_busy(&self, point: GeoPoint) -> Result<Vec<NearbyCab>, QueryError> {
        self.find_nearest(
            point,
            CabStatus::Busy,
            NEARBY_BUSY_LIMIT,
            Some(NEARBY_BUSY_RADIUS_M),
        )
        .await
    }
}
