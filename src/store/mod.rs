// Spatial store: current cab state plus the spherical index

mod memory;

pub use memory::MemoryStore;

use crate::cab::{CabRecord, CabStatus, CabUpdate, GeoPoint, NearbyCab};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::time::Duration;


/// A distance-ranked query.
///
/// Stages apply in order: distance annotation (nearest first), status
/// filter, then the `limit` cap, so the result is "the closest matching"
/// rather than "the closest of an arbitrary subset".
#[derive(Clone, Debug, PartialEq)]
pub struct NearestQuery {
    pub near: GeoPoint,
    pub status: Option<CabStatus>,
    pub limit: usize,
    pub max_distance_m: Option<f64>,
}

/// Keyed cab collection with a spherical nearest-neighbor index.
///
/// Implementations must make `upsert` atomic with respect to `find_nearest`:
/// a query never sees a record whose index position disagrees with its
/// stored location.
#[async_trait]
pub trait SpatialStore: Send + Sync {
    /// Create the spherical index. Idempotent.
    async fn ensure_index(&self) -> Result<()>;

    /// Insert or fully replace the record for `update.id`
    async fn upsert(&self, update: &CabUpdate, now: DateTime<Utc>) -> Result<CabRecord>;

    async fn find_nearest(&self, query: &NearestQuery) -> Result<Vec<NearbyCab>>;

    async fn get(&self, id: &str) -> Result<Option<CabRecord>>;

    async fn count(&self) -> Result<usize>;
}

/// Error raised when a store call exceeds its time budget
#[derive(Debug, Clone, PartialEq)]
pub struct StoreTimeout {
    pub operation: &'static str,
    pub after: Duration,
}

impl fmt::Display for StoreTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "store {} timed out after {}ms",
            self.operation,
            self.after.as_millis()
        )
    }
}

impl std::error::Error for StoreTimeout {}

/// Run a store call under a deadline.
///
/// On expiry the call is abandoned and a [`StoreTimeout`] is returned, which
/// callers can recover with `downcast_ref`.
pub async fn with_timeout<T, F>(after: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreTimeout { operation, after }.into()),
    }
}
