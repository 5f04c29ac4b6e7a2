use super::{CabStatus, CabUpdate, GeoJsonPoint, GeoPoint, HQ_LATITUDE, HQ_LONGITUDE};
use serde::Deserialize;
use std::fmt;

/// Validation errors for inbound cab data
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MalformedMessage(String),
    MissingIdentity,
    MissingLocation,
    MissingStatus,
    UnknownStatus(String),
    InvalidPointType(String),
    InvalidCoordinateCount(usize),
    NonFiniteCoordinate,
    InvalidLongitude(String),
    InvalidLatitude(String),
    InvalidLimit(usize),
    InvalidMaxDistance(f64),
    /// Named query parameter that is not a number
    NotANumber(&'static str, String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MalformedMessage(msg) => write!(f, "malformed message: {}", msg),
            ValidationError::MissingIdentity => write!(f, "id is required"),
            ValidationError::MissingLocation => write!(f, "location is required"),
            ValidationError::MissingStatus => write!(f, "status is required"),
            ValidationError::UnknownStatus(s) => {
                write!(f, "unknown status '{}': must be Available or Busy", s)
            }
            ValidationError::InvalidPointType(t) => {
                write!(f, "invalid location type '{}': must be Point", t)
            }
            ValidationError::InvalidCoordinateCount(n) => {
                write!(f, "location must have exactly 2 coordinates, got {}", n)
            }
            ValidationError::NonFiniteCoordinate => write!(f, "coordinates must be finite"),
            ValidationError::InvalidLongitude(v) => write!(f, "Invalid longitude: {}", v),
            ValidationError::InvalidLatitude(v) => write!(f, "Invalid latitude: {}", v),
            ValidationError::InvalidLimit(n) => {
                write!(f, "limit must be between 1 and {}, got {}", MAX_LIMIT, n)
            }
            ValidationError::InvalidMaxDistance(d) => {
                write!(f, "max distance must be a non-negative number, got {}", d)
            }
            ValidationError::NotANumber(name, value) => {
                write!(f, "Invalid {}: {}", name, value)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Largest result count a single proximity query may request
pub const MAX_LIMIT: usize = 100;

/// Ingestion frame before validation. Every field is optional so that a
/// missing field maps to a specific error instead of a generic decode failure.
#[derive(Deserialize)]
struct RawCabUpdate {
    id: Option<String>,
    location: Option<GeoJsonPoint>,
    status: Option<String>,
}

/// Decode and validate one ingestion frame.
///
/// Validation rules:
/// - Frame must be a JSON object
/// - `id`: required, non-empty after trimming
/// - `location`: GeoJSON Point with exactly [lon, lat] in range
/// - `status`: `Available` or `Busy` (case-sensitive)
pub fn parse_update(bytes: &[u8]) -> Result<CabUpdate, ValidationError> {
    let raw: RawCabUpdate = serde_json::from_slice(bytes)
        .map_err(|e| ValidationError::MalformedMessage(e.to_string()))?;

    let id = raw
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or(ValidationError::MissingIdentity)?;

    let location = raw.location.ok_or(ValidationError::MissingLocation)?;
    let location = point_from_geojson(&location)?;

    let status = raw
        .status
        .ok_or(ValidationError::MissingStatus)?
        .parse::<CabStatus>()?;

    Ok(CabUpdate {
        id,
        location,
        status,
    })
}

/// Decode and validate a cab registration body.
///
/// Same rules as [`parse_update`] except `location` and `status` are
/// optional: a new cab starts `Available` at headquarters unless the body
/// says otherwise.
pub fn parse_registration(bytes: &[u8]) -> Result<CabUpdate, ValidationError> {
    let raw: RawCabUpdate = serde_json::from_slice(bytes)
        .map_err(|e| ValidationError::MalformedMessage(e.to_string()))?;

    let id = raw
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or(ValidationError::MissingIdentity)?;

    let location = match raw.location {
        Some(location) => point_from_geojson(&location)?,
        None => GeoPoint::new(HQ_LONGITUDE, HQ_LATITUDE)?,
    };

    let status = match raw.status {
        Some(status) => status.parse::<CabStatus>()?,
        None => CabStatus::Available,
    };

    Ok(CabUpdate {
        id,
        location,
        status,
    })
}

pub(super) fn point_from_geojson(raw: &GeoJsonPoint) -> Result<GeoPoint, ValidationError> {
    if raw.kind != "Point" {
        return Err(ValidationError::InvalidPointType(raw.kind.clone()));
    }
    match raw.coordinates.as_slice() {
        [longitude, latitude] => GeoPoint::new(*longitude, *latitude),
        other => Err(ValidationError::InvalidCoordinateCount(other.len())),
    }
}

pub(super) fn validate_point(longitude: f64, latitude: f64) -> Result<(), ValidationError> {
    if !longitude.is_finite() || !latitude.is_finite() {
        return Err(ValidationError::NonFiniteCoordinate);
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ValidationError::InvalidLongitude(longitude.to_string()));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(ValidationError::InvalidLatitude(latitude.to_string()));
    }
    Ok(())
}

/// Parse the decimal-string coordinates carried by proximity requests.
///
/// Latitude is checked first so that a request with both fields broken
/// reports the latitude, matching the order the fields are documented in.
pub fn parse_coordinates(latitude: &str, longitude: &str) -> Result<GeoPoint, ValidationError> {
    let lat = latitude
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && (-90.0..=90.0).contains(v))
        .ok_or_else(|| ValidationError::InvalidLatitude(latitude.to_string()))?;
    let lon = longitude
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && (-180.0..=180.0).contains(v))
        .ok_or_else(|| ValidationError::InvalidLongitude(longitude.to_string()))?;
    GeoPoint::new(lon, lat)
}
