//! H3 cell index for nearest-neighbor queries.
//!
//! Records are bucketed by the H3 cell containing their location. A nearest
//! query walks grid rings outward from the query cell. After ring `k` has
//! been scanned, anything not yet seen lies outside the disk of radius `k`,
//! and any path from the query point to it crosses a ring-`k` cell, so
//! `min(dist(P, center(c)) - circumradius(c))` over ring-`k` cells bounds the
//! distance of every unseen record from below. The walk stops once the
//! requested number of matches is strictly closer than that bound, or the
//! bound exceeds the distance cap. Past `max_rings` it falls back to a full
//! scan, so results are always exact.

use super::{distance_meters, haversine};
use crate::cab::{CabStatus, GeoPoint};
use anyhow::{Context, Result};
use h3o::{CellIndex, LatLng, Resolution};
use std::cmp::Ordering;
use std::collections::HashMap;

/// One record as seen by the index
#[derive(Clone, Debug)]
struct IndexEntry {
    cell: CellIndex,
    location: GeoPoint,
    status: CabStatus,
}

/// A query match: identity plus distance in meters
#[derive(Clone, Debug, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub distance: f64,
}

/// Spherical nearest-neighbor index over cab locations
#[derive(Debug)]
pub struct SphericalIndex {
    resolution: Resolution,
    max_rings: u32,
    /// H3 cell -> ids located in that cell
    cells: HashMap<CellIndex, Vec<String>>,
    /// Reverse mapping: id -> current cell and attributes
    entries: HashMap<String, IndexEntry>,
}

impl SphericalIndex {
    pub fn new(resolution: Resolution, max_rings: u32) -> Self {
        Self {
            resolution,
            max_rings,
            cells: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// H3 cell containing `point` at this index's resolution
    pub fn cell_of(&self, point: GeoPoint) -> Result<CellIndex> {
        let ll = LatLng::new(point.latitude(), point.longitude())
            .with_context(|| format!("Invalid coordinates for H3: {:?}", point))?;
        Ok(ll.to_cell(self.resolution))
    }

    /// Insert or move an id. Replaces location and status in full.
    pub fn upsert(&mut self, id: &str, location: GeoPoint, status: CabStatus) -> Result<()> {
        let cell = self.cell_of(location)?;

        if let Some(entry) = self.entries.get_mut(id) {
            let old_cell = entry.cell;
            entry.cell = cell;
            entry.location = location;
            entry.status = status;
            if old_cell != cell {
                self.detach(id, old_cell);
                self.cells.entry(cell).or_default().push(id.to_string());
            }
            return Ok(());
        }

        self.entries.insert(
            id.to_string(),
            IndexEntry {
                cell,
                location,
                status,
            },
        );
        self.cells.entry(cell).or_default().push(id.to_string());
        Ok(())
    }

    fn detach(&mut self, id: &str, cell: CellIndex) {
        if let Some(ids) = self.cells.get_mut(&cell) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    /// Current cell of an id, if indexed
    pub fn cell_for_id(&self, id: &str) -> Option<CellIndex> {
        self.entries.get(id).map(|e| e.cell)
    }

    /// Drop all entries (snapshot reload)
    pub fn clear(&mut self) {
        self.cells.clear();
        self.entries.clear();
    }

    /// Closest ids to `near`, ascending by distance then id.
    ///
    /// Only records matching `status` (when given) and lying within
    /// `max_distance` meters (when given) are returned; at most `limit`.
    pub fn nearest(
        &self,
        near: GeoPoint,
        status: Option<CabStatus>,
        limit: usize,
        max_distance: Option<f64>,
    ) -> Result<Vec<IndexHit>> {
        if limit == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let origin = self.cell_of(near)?;
        let total = self.entries.len();
        let mut seen = 0usize;
        let mut hits: Vec<IndexHit> = Vec::new();

        for k in 0..=self.max_rings {
            let ring = ring_cells(origin, k);

            for cell in &ring {
                let Some(ids) = self.cells.get(cell) else {
                    continue;
                };
                for id in ids {
                    seen += 1;
                    if let Some(hit) = self.evaluate(id, near, status, max_distance) {
                        hits.push(hit);
                    }
                }
            }

            if seen >= total {
                return Ok(finish(hits, limit));
            }

            let bound = ring
                .iter()
                .map(|cell| lower_bound(near, *cell))
                .fold(f64::INFINITY, f64::min);

            if let Some(max) = max_distance {
                if bound > max {
                    return Ok(finish(hits, limit));
                }
            }

            if hits.len() >= limit {
                hits.sort_by(compare_hits);
                if bound > hits[limit - 1].distance {
                    return Ok(finish(hits, limit));
                }
            }
        }

        // Sparse data far from the query point: exact scan
        Ok(self.scan(near, status, limit, max_distance))
    }

    /// Exhaustive nearest query, ignoring the cell structure
    pub fn scan(
        &self,
        near: GeoPoint,
        status: Option<CabStatus>,
        limit: usize,
        max_distance: Option<f64>,
    ) -> Vec<IndexHit> {
        let hits = self
            .entries
            .keys()
            .filter_map(|id| self.evaluate(id, near, status, max_distance))
            .collect();
        finish(hits, limit)
    }

    fn evaluate(
        &self,
        id: &str,
        near: GeoPoint,
        status: Option<CabStatus>,
        max_distance: Option<f64>,
    ) -> Option<IndexHit> {
        let entry = self.entries.get(id)?;
        if let Some(wanted) = status {
            if entry.status != wanted {
                return None;
            }
        }
        let distance = distance_meters(near, entry.location);
        if let Some(max) = max_distance {
            if distance > max {
                return None;
            }
        }
        Some(IndexHit {
            id: id.to_string(),
            distance,
        })
    }
}

fn compare_hits(a: &IndexHit, b: &IndexHit) -> Ordering {
    a.distance
        .partial_cmp(&b.distance)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

fn finish(mut hits: Vec<IndexHit>, limit: usize) -> Vec<IndexHit> {
    hits.sort_by(compare_hits);
    hits.truncate(limit);
    hits
}

/// Cells at grid distance exactly `k` from `origin`.
///
/// `grid_ring_fast` gives up near pentagons; fall back to filtering the disk.
fn ring_cells(origin: CellIndex, k: u32) -> Vec<CellIndex> {
    if k == 0 {
        return vec![origin];
    }
    let fast: Option<Vec<CellIndex>> = origin.grid_ring_fast(k).collect();
    fast.unwrap_or_else(|| {
        origin
            .grid_disk_distances::<Vec<_>>(k)
            .into_iter()
            .filter(|(_, distance)| *distance == k)
            .map(|(cell, _)| cell)
            .collect()
    })
}

/// Lower bound on the distance from `point` to anything inside `cell`.
///
/// Cell edges are great-circle arcs, so every point of the cell lies within
/// the largest center-to-vertex distance of its center.
fn lower_bound(point: GeoPoint, cell: CellIndex) -> f64 {
    let center = LatLng::from(cell);
    let boundary = cell.boundary();
    let radius = boundary
        .iter()
        .map(|v| haversine(center.lat(), center.lng(), v.lat(), v.lng()))
        .fold(0.0, f64::max);
    let to_center = haversine(point.latitude(), point.longitude(), center.lat(), center.lng());
    // Slack for floating point error in the vertex distances
    (to_center - radius * 1.001 - 1.0).max(0.0)
}
