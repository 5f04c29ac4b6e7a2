use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod validation;
#[cfg(test)]
mod tests;

pub use validation::{parse_coordinates, ValidationError, MAX_LIMIT};

/// Where newly registered cabs start when no location is given
pub const HQ_LONGITUDE: f64 = 77.64344998289836;
pub const HQ_LATITUDE: f64 = 12.912447107980537;

/// Geographic point in degrees.
///
/// Always structurally valid: both coordinates are finite, longitude lies in
/// [-180, 180] and latitude in [-90, 90]. Serialized as a GeoJSON `Point`
/// (`{"type": "Point", "coordinates": [lon, lat]}`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeoJsonPoint", into = "GeoJsonPoint")]
pub struct GeoPoint {
    longitude: f64,
    latitude: f64,
}

impl GeoPoint {
    /// Build a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, ValidationError> {
        validation::validate_point(longitude, latitude)?;
        Ok(Self {
            longitude,
            latitude,
        })
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }
}

/// GeoJSON wire form of [`GeoPoint`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeoJsonPoint {
    #[serde(rename = "type", default = "point_type")]
    pub kind: String,
    pub coordinates: Vec<f64>,
}

fn point_type() -> String {
    "Point".to_string()
}

impl TryFrom<GeoJsonPoint> for GeoPoint {
    type Error = ValidationError;

    fn try_from(raw: GeoJsonPoint) -> Result<Self, Self::Error> {
        validation::point_from_geojson(&raw)
    }
}

impl From<GeoPoint> for GeoJsonPoint {
    fn from(point: GeoPoint) -> Self {
        Self {
            kind: point_type(),
            coordinates: vec![point.longitude, point.latitude],
        }
    }
}

/// Operational state of a cab
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CabStatus {
    Available,
    Busy,
}

impl CabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabStatus::Available => "Available",
            CabStatus::Busy => "Busy",
        }
    }
}

impl fmt::Display for CabStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CabStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Available" => Ok(CabStatus::Available),
            "Busy" => Ok(CabStatus::Busy),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// A validated position/status report for one cab.
///
/// Produced by [`CabUpdate::parse`] at the ingestion boundary; never carries
/// a client timestamp because `last_updated` is assigned at merge time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CabUpdate {
    pub id: String,
    pub location: GeoPoint,
    pub status: CabStatus,
}

impl CabUpdate {
    /// Decode and validate one ingestion frame.
    pub fn parse(bytes: &[u8]) -> Result<Self, ValidationError> {
        validation::parse_update(bytes)
    }

    /// Decode a registration body, defaulting to `Available` at headquarters.
    pub fn parse_registration(bytes: &[u8]) -> Result<Self, ValidationError> {
        validation::parse_registration(bytes)
    }
}

/// Current state of a cab as held by the spatial store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CabRecord {
    /// Stable identity (e.g. "cab-17")
    pub id: String,

    pub location: GeoPoint,

    pub status: CabStatus,

    /// Server receipt time of the last accepted write
    pub last_updated: DateTime<Utc>,
}

impl CabRecord {
    /// Full replacement of a record from an update
    pub fn from_update(update: &CabUpdate, now: DateTime<Utc>) -> Self {
        Self {
            id: update.id.clone(),
            location: update.location,
            status: update.status,
            last_updated: now,
        }
    }
}

/// A record annotated with its great-circle distance (meters) from a query point
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NearbyCab {
    #[serde(flatten)]
    pub record: CabRecord,
    pub distance: f64,
}
