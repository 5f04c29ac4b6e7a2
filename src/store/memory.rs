use super::{NearestQuery, SpatialStore};
use crate::cab::{CabRecord, CabUpdate, NearbyCab};
use crate::config::StoreConfig;
use crate::geo::SphericalIndex;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use h3o::Resolution;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// In-process spatial store.
///
/// Records live in a `DashMap` for lock-free point lookups; the spherical
/// index sits behind an `RwLock`. Writers take the index write lock before
/// touching the map, so a reader holding the read lock always sees the two
/// in agreement.
pub struct MemoryStore {
    records: DashMap<String, CabRecord>,
    index: RwLock<SphericalIndex>,
    index_ready: AtomicBool,
}

impl MemoryStore {
    pub fn new(resolution: Resolution, max_rings: u32) -> Self {
        Self {
            records: DashMap::new(),
            index: RwLock::new(SphericalIndex::new(resolution, max_rings)),
            index_ready: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let resolution = Resolution::try_from(config.h3_resolution)
            .with_context(|| format!("Invalid H3 resolution {}", config.h3_resolution))?;
        Ok(Self::new(resolution, config.max_rings))
    }

    fn read_index(&self) -> Result<RwLockReadGuard<'_, SphericalIndex>> {
        self.index
            .read()
            .map_err(|_| anyhow!("spatial index lock poisoned"))
    }

    fn write_index(&self) -> Result<RwLockWriteGuard<'_, SphericalIndex>> {
        self.index
            .write()
            .map_err(|_| anyhow!("spatial index lock poisoned"))
    }

    pub fn is_index_ready(&self) -> bool {
        self.index_ready.load(Ordering::SeqCst)
    }

    /// Create the index if it does not exist yet; later calls are no-ops
    pub fn create_index(&self) {
        if self
            .index_ready
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!(records = self.records.len(), "Spherical index created on 'location'");
        }
    }

    /// Insert or replace one record (core state mutation)
    pub fn apply(&self, update: &CabUpdate, now: DateTime<Utc>) -> Result<CabRecord> {
        let record = CabRecord::from_update(update, now);

        let mut index = self.write_index()?;
        index.upsert(&record.id, record.location, record.status)?;
        let previous = self.records.insert(record.id.clone(), record.clone());
        drop(index);

        debug!(
            cab_id = %record.id,
            status = %record.status,
            created = previous.is_none(),
            "Cab record upserted"
        );

        Ok(record)
    }

    pub fn nearest(&self, query: &NearestQuery) -> Result<Vec<NearbyCab>> {
        if !self.is_index_ready() {
            bail!("spherical index on 'location' has not been created");
        }

        let index = self.read_index()?;
        let hits = index.nearest(query.near, query.status, query.limit, query.max_distance_m)?;

        let results = hits
            .into_iter()
            .filter_map(|hit| {
                self.records.get(&hit.id).map(|record| NearbyCab {
                    record: record.clone(),
                    distance: hit.distance,
                })
            })
            .collect();

        Ok(results)
    }

    /// Get record by id
    pub fn get_record(&self, id: &str) -> Option<CabRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    /// Get all records
    pub fn all_records(&self) -> Vec<CabRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replace all state with `records` and rebuild the index from them
    pub fn load_records(&self, records: HashMap<String, CabRecord>) -> Result<()> {
        let mut index = self.write_index()?;
        index.clear();
        self.records.clear();

        for (id, record) in records {
            index.upsert(&id, record.location, record.status)?;
            self.records.insert(id, record);
        }

        info!(records = self.records.len(), "Loaded cab records");
        Ok(())
    }
}

#[async_trait]
impl SpatialStore for MemoryStore {
    async fn ensure_index(&self) -> Result<()> {
        self.create_index();
        Ok(())
    }

    async fn upsert(&self, update: &CabUpdate, now: DateTime<Utc>) -> Result<CabRecord> {
        self.apply(update, now)
    }

    async fn find_nearest(&self, query: &NearestQuery) -> Result<Vec<NearbyCab>> {
        self.nearest(query)
    }

    async fn get(&self, id: &str) -> Result<Option<CabRecord>> {
        Ok(self.get_record(id))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.len())
    }
}
