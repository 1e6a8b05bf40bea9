//! In-memory spatial index.
//!
//! Points live in a gid-keyed ordered map, so range queries come back in
//! ascending gid order and replays are deterministic. Building footprints
//! are `geo` polygons; LOS segment tests against the (static) building set
//! are memoised in an LRU cache.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use geo::{coord, Intersects, Line, Point, Polygon, Rect};
use lru::LruCache;

use crate::cells::METERS_TO_DEGREES;
use crate::gis::{FeatureClass, GisError, SpatialIndex};

/// LOS cache capacity (segment endpoints → verdict).
const LOS_CACHE_SIZE: usize = 10_000;

/// Bit patterns of the four segment endpoints. Buildings never move, so a
/// cached verdict stays valid for the whole run.
type SegmentKey = (u64, u64, u64, u64);

#[derive(Debug, Clone, Copy)]
struct PointRecord {
    class: FeatureClass,
    xgeo: f64,
    ygeo: f64,
}

pub struct MemoryGis {
    points: BTreeMap<u32, PointRecord>,
    buildings: Vec<Polygon<f64>>,
    next_gid: u32,
    los_cache: Mutex<LruCache<SegmentKey, bool>>,
}

impl Default for MemoryGis {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGis {
    pub fn new() -> Self {
        Self {
            points: BTreeMap::new(),
            buildings: Vec::new(),
            next_gid: 1,
            los_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(LOS_CACHE_SIZE).expect("cache size must be non-zero"),
            )),
        }
    }

    pub fn add_building(&mut self, footprint: Polygon<f64>) {
        self.buildings.push(footprint);
    }

    /// Axis-aligned rectangular footprint, degrees.
    pub fn add_building_rect(&mut self, xmin: f64, ymin: f64, xmax: f64, ymax: f64) {
        let rect = Rect::new(coord! { x: xmin, y: ymin }, coord! { x: xmax, y: ymax });
        self.buildings.push(rect.to_polygon());
    }

    pub fn building_count(&self) -> usize {
        self.buildings.len()
    }

    fn segment_blocked(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> bool {
        let line = Line::new(coord! { x: x1, y: y1 }, coord! { x: x2, y: y2 });
        self.buildings.iter().any(|b| b.intersects(&line))
    }
}

impl SpatialIndex for MemoryGis {
    fn add_point(
        &mut self,
        xgeo: f64,
        ygeo: f64,
        _id: u16,
        class: FeatureClass,
    ) -> Result<u32, GisError> {
        let gid = self.next_gid;
        self.next_gid = self
            .next_gid
            .checked_add(1)
            .ok_or_else(|| GisError::Backend("gid space exhausted".into()))?;
        self.points.insert(gid, PointRecord { class, xgeo, ygeo });
        Ok(gid)
    }

    fn update_point(&mut self, gid: u32, xgeo: f64, ygeo: f64) -> Result<(), GisError> {
        let record = self.points.get_mut(&gid).ok_or(GisError::NotFound(gid))?;
        record.xgeo = xgeo;
        record.ygeo = ygeo;
        Ok(())
    }

    fn delete_class(&mut self, class: FeatureClass) -> Result<(), GisError> {
        self.points.retain(|_, record| record.class != class);
        Ok(())
    }

    fn point_coords(&self, gid: u32) -> Result<(f64, f64), GisError> {
        let record = self.points.get(&gid).ok_or(GisError::NotFound(gid))?;
        Ok((record.xgeo, record.ygeo))
    }

    fn points_in_range(
        &self,
        xcenter: f64,
        ycenter: f64,
        range_m: u32,
        class: FeatureClass,
    ) -> Result<Vec<u32>, GisError> {
        let range_deg = range_m as f64 * METERS_TO_DEGREES;
        let range_sq = range_deg * range_deg;
        Ok(self
            .points
            .iter()
            .filter(|(_, record)| record.class == class)
            .filter(|(_, record)| {
                let dx = record.xgeo - xcenter;
                let dy = record.ygeo - ycenter;
                dx * dx + dy * dy <= range_sq
            })
            .map(|(&gid, _)| gid)
            .collect())
    }

    fn distance_to_point(&self, xgeo: f64, ygeo: f64, gid: u32) -> Result<u32, GisError> {
        let record = self.points.get(&gid).ok_or(GisError::NotFound(gid))?;
        let dx = record.xgeo - xgeo;
        let dy = record.ygeo - ygeo;
        let degrees = (dx * dx + dy * dy).sqrt();
        Ok((degrees / METERS_TO_DEGREES) as u32)
    }

    fn line_of_sight(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> Result<bool, GisError> {
        let key = (x1.to_bits(), y1.to_bits(), x2.to_bits(), y2.to_bits());
        let mut cache = self
            .los_cache
            .lock()
            .map_err(|_| GisError::Backend("LOS cache poisoned".into()))?;
        let blocked = *cache.get_or_insert(key, || self.segment_blocked(x1, y1, x2, y2));
        Ok(!blocked)
    }

    fn is_point_obstructed(&self, xgeo: f64, ygeo: f64) -> Result<bool, GisError> {
        let point = Point::new(xgeo, ygeo);
        if self.buildings.iter().any(|b| b.intersects(&point)) {
            return Ok(true);
        }
        Ok(self
            .points
            .values()
            .any(|record| record.xgeo == xgeo && record.ygeo == ygeo))
    }
}
