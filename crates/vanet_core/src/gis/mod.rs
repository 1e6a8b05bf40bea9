//! Geodesic point store.
//!
//! The simulation core only needs a handful of spatial operations: point
//! insert/update/delete, range search filtered by feature class, distance,
//! and line-of-sight against building geometry. They are expressed as a
//! trait so the backing store stays swappable; the crate ships an in-memory
//! implementation in [`memory`].

pub mod memory;

use bevy_ecs::prelude::Resource;
use thiserror::Error;

pub use memory::MemoryGis;

/// Feature classes partitioning the index. The discriminants are the wire
/// codes used by the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FeatureClass {
    Vehicle = 2222,
    Rsu = 2223,
    Building = 9790,
}

impl FeatureClass {
    pub fn code(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Error)]
pub enum GisError {
    #[error("spatial backend failure: {0}")]
    Backend(String),
    #[error("no point with gid {0} in the spatial index")]
    NotFound(u32),
}

/// Abstract geodesic point store. Coordinates are WGS84 degrees; every call
/// is independent, and only insert/update/delete mutate.
pub trait SpatialIndex {
    /// Insert a point and return its fresh, non-zero gid.
    fn add_point(
        &mut self,
        xgeo: f64,
        ygeo: f64,
        id: u16,
        class: FeatureClass,
    ) -> Result<u32, GisError>;

    /// Relocate an existing point.
    fn update_point(&mut self, gid: u32, xgeo: f64, ygeo: f64) -> Result<(), GisError>;

    /// Remove every point of one feature class.
    fn delete_class(&mut self, class: FeatureClass) -> Result<(), GisError>;

    fn point_coords(&self, gid: u32) -> Result<(f64, f64), GisError>;

    /// Gids of every `class` point within `range_m` metres (Euclidean in
    /// degrees). May include the query centre's own gid; callers filter.
    fn points_in_range(
        &self,
        xcenter: f64,
        ycenter: f64,
        range_m: u32,
        class: FeatureClass,
    ) -> Result<Vec<u32>, GisError>;

    /// Distance in whole metres (truncated) from a coordinate to a point.
    fn distance_to_point(&self, xgeo: f64, ygeo: f64, gid: u32) -> Result<u32, GisError>;

    /// True iff no building geometry crosses the segment.
    fn line_of_sight(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> Result<bool, GisError>;

    /// True iff the point intersects any stored geometry.
    fn is_point_obstructed(&self, xgeo: f64, ygeo: f64) -> Result<bool, GisError>;
}

/// The process-wide spatial index handle.
#[derive(Resource)]
pub struct Gis(pub Box<dyn SpatialIndex + Send + Sync>);
