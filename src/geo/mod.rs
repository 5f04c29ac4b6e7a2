//! Spherical geometry: great-circle distances and the H3-backed
//! nearest-neighbor index used by the spatial store.

use crate::cab::GeoPoint;

mod index;

pub use index::{IndexHit, SphericalIndex};

/// Mean Earth radius used for all distance calculations
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two (lat, lng) pairs in degrees, in meters.
pub fn haversine(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Great-circle distance between two points in meters
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    haversine(a.latitude(), a.longitude(), b.latitude(), b.longitude())
}
