//! Map geometry: WGS84↔cell transforms, per-RSU coverage maps, city grids.
//!
//! The simulated tile is anchored at a fixed top-left reference corner. A
//! cell is an integer arc-second bucket: `floor(|coord − REF| · 3600)`.
//! Within the tile a locally-linear scalar converts metres to degrees, which
//! keeps every distance computation a plain Euclidean one.

use thiserror::Error;

/// Top-left reference corner, longitude (degrees).
pub const XREFERENCE: f64 = -8.62444;
/// Top-left reference corner, latitude (degrees).
pub const YREFERENCE: f64 = 41.17056;
/// Map centre, longitude (degrees). Used to locate the accident source.
pub const XCENTER: f64 = -8.617485;
/// Map centre, latitude (degrees).
pub const YCENTER: f64 = 41.163535;

/// City grid width in cells.
pub const CITY_WIDTH: usize = 60;
/// City grid height in cells.
pub const CITY_HEIGHT: usize = 41;

/// Coverage map side length (cells). The RSU sits at the centre cell.
pub const PARKED_CELL_COVERAGE: usize = 11;
/// Coverage map half-width (cells); 155 m is just over 5 arc-second cells.
pub const PARKED_CELL_RANGE: i32 = 5;

/// Locally-linear metres→degrees scalar, 1/(3600·30.89).
pub const METERS_TO_DEGREES: f64 = 8.9925e-6;
/// Maximum radio range in metres.
pub const MAXRANGE: u32 = 155;

/// Grid value reserved for the RSU marker in rendered output.
pub const RSU_MARKER: i32 = -1;

/// Arc-second cell indices for a WGS84 coordinate, relative to the
/// reference corner. Both axes grow away from the corner (east and south).
pub fn cell_from_wgs84(xgeo: f64, ygeo: f64) -> (u16, u16) {
    let xcell = ((xgeo - XREFERENCE).abs() * 3600.0).floor() as u16;
    let ycell = ((ygeo - YREFERENCE).abs() * 3600.0).floor() as u16;
    (xcell, ycell)
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    /// A coverage overlay tried to write outside the city grid. RSUs must be
    /// placed inside the interior margin, so this is a programmer error.
    #[error("cell ({x},{y}) is outside the {CITY_WIDTH}x{CITY_HEIGHT} city grid")]
    OutOfGrid { x: i32, y: i32 },
}

/// 11×11 grid of signal levels around one RSU.
///
/// Local cell `(xx, yy)` corresponds to global cell
/// `(xcenter − 5 + xx, ycenter − 5 + yy)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageMap {
    map: [[u8; PARKED_CELL_COVERAGE]; PARKED_CELL_COVERAGE],
    xcenter: u16,
    ycenter: u16,
}

impl CoverageMap {
    /// Blank map centred on the given global cell.
    pub fn new(xcenter: u16, ycenter: u16) -> Self {
        Self {
            map: [[0; PARKED_CELL_COVERAGE]; PARKED_CELL_COVERAGE],
            xcenter,
            ycenter,
        }
    }

    pub fn xcenter(&self) -> u16 {
        self.xcenter
    }

    pub fn ycenter(&self) -> u16 {
        self.ycenter
    }

    pub fn get(&self, xx: usize, yy: usize) -> u8 {
        self.map[xx][yy]
    }

    pub fn set(&mut self, xx: usize, yy: usize, signal: u8) {
        self.map[xx][yy] = signal;
    }

    /// Local indices of a global cell, or `None` when it falls outside the
    /// 11×11 window.
    pub fn local_offset(&self, xcell: u16, ycell: u16) -> Option<(usize, usize)> {
        let dx = PARKED_CELL_RANGE + (xcell as i32 - self.xcenter as i32);
        let dy = PARKED_CELL_RANGE + (ycell as i32 - self.ycenter as i32);
        let max = PARKED_CELL_COVERAGE as i32;
        if (0..max).contains(&dx) && (0..max).contains(&dy) {
            Some((dx as usize, dy as usize))
        } else {
            None
        }
    }

    /// Global cell of a local index.
    pub fn global_cell(&self, xx: usize, yy: usize) -> (i32, i32) {
        (
            self.xcenter as i32 - PARKED_CELL_RANGE + xx as i32,
            self.ycenter as i32 - PARKED_CELL_RANGE + yy as i32,
        )
    }

    /// Number of cells with signal above zero.
    pub fn covered_cells(&self) -> u32 {
        self.map
            .iter()
            .flat_map(|col| col.iter())
            .filter(|&&s| s > 0)
            .count() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.map.iter().flat_map(|col| col.iter()).all(|&s| s == 0)
    }

    /// Covered cells as `(local xx, local yy, signal)`, signal > 0 only.
    pub fn covered(&self) -> impl Iterator<Item = (usize, usize, u8)> + '_ {
        (0..PARKED_CELL_COVERAGE).flat_map(move |xx| {
            (0..PARKED_CELL_COVERAGE).filter_map(move |yy| {
                let s = self.map[xx][yy];
                (s > 0).then_some((xx, yy, s))
            })
        })
    }
}

/// Fixed-size signed-integer grid over the whole city tile. Used for the
/// global signal map, redundancy counts, and rendered vehicle maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityGrid {
    cells: [[i32; CITY_HEIGHT]; CITY_WIDTH],
}

impl Default for CityGrid {
    fn default() -> Self {
        Self {
            cells: [[0; CITY_HEIGHT]; CITY_WIDTH],
        }
    }
}

impl CityGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill(&mut self, value: i32) {
        for col in self.cells.iter_mut() {
            col.fill(value);
        }
    }

    fn index(x: i32, y: i32) -> Result<(usize, usize), GridError> {
        if (0..CITY_WIDTH as i32).contains(&x) && (0..CITY_HEIGHT as i32).contains(&y) {
            Ok((x as usize, y as usize))
        } else {
            Err(GridError::OutOfGrid { x, y })
        }
    }

    pub fn get(&self, x: i32, y: i32) -> Result<i32, GridError> {
        let (x, y) = Self::index(x, y)?;
        Ok(self.cells[x][y])
    }

    pub fn set(&mut self, x: i32, y: i32, value: i32) -> Result<(), GridError> {
        let (x, y) = Self::index(x, y)?;
        self.cells[x][y] = value;
        Ok(())
    }

    /// Overlay a coverage map, keeping `max(existing, incoming)` per cell.
    pub fn apply_upgrade(&mut self, coverage: &CoverageMap) -> Result<(), GridError> {
        for (xx, yy, signal) in coverage.covered() {
            let (gx, gy) = coverage.global_cell(xx, yy);
            let (ix, iy) = Self::index(gx, gy)?;
            if self.cells[ix][iy] < signal as i32 {
                self.cells[ix][iy] = signal as i32;
            }
        }
        Ok(())
    }

    /// Overlay a coverage map, incrementing each cell the map covers.
    pub fn apply_count(&mut self, coverage: &CoverageMap) -> Result<(), GridError> {
        for (xx, yy, _) in coverage.covered() {
            let (gx, gy) = coverage.global_cell(xx, yy);
            let (ix, iy) = Self::index(gx, gy)?;
            self.cells[ix][iy] += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_transform_matches_reference_corner() {
        assert_eq!(cell_from_wgs84(XREFERENCE, YREFERENCE), (0, 0));
        // The map centre sits in the grid interior.
        let (xc, yc) = cell_from_wgs84(XCENTER, YCENTER);
        assert_eq!((xc, yc), (25, 25));
        assert!((xc as usize) < CITY_WIDTH && (yc as usize) < CITY_HEIGHT);
    }

    #[test]
    fn cell_transform_buckets_by_arcsecond() {
        let one_arcsec = 1.0 / 3600.0;
        let (x0, _) = cell_from_wgs84(XREFERENCE + 0.9 * one_arcsec, YREFERENCE);
        let (x1, _) = cell_from_wgs84(XREFERENCE + 1.1 * one_arcsec, YREFERENCE);
        assert_eq!(x0, 0);
        assert_eq!(x1, 1);
    }

    #[test]
    fn local_offset_round_trips_global_cell() {
        let map = CoverageMap::new(25, 25);
        assert_eq!(map.local_offset(25, 25), Some((5, 5)));
        assert_eq!(map.local_offset(20, 30), Some((0, 10)));
        assert_eq!(map.local_offset(19, 25), None);
        assert_eq!(map.local_offset(25, 31), None);
        assert_eq!(map.global_cell(5, 5), (25, 25));
        assert_eq!(map.global_cell(0, 10), (20, 30));
    }

    #[test]
    fn covered_cells_counts_nonzero_entries() {
        let mut map = CoverageMap::new(25, 25);
        assert_eq!(map.covered_cells(), 0);
        assert!(map.is_empty());
        map.set(5, 5, 3);
        map.set(0, 0, 1);
        assert_eq!(map.covered_cells(), 2);
        assert!(!map.is_empty());
    }

    #[test]
    fn upgrade_keeps_strongest_signal() {
        let mut grid = CityGrid::new();
        let mut a = CoverageMap::new(25, 25);
        a.set(5, 5, 2);
        let mut b = CoverageMap::new(25, 25);
        b.set(5, 5, 4);

        grid.apply_upgrade(&a).expect("in grid");
        grid.apply_upgrade(&b).expect("in grid");
        assert_eq!(grid.get(25, 25), Ok(4));

        // A weaker overlay must not downgrade.
        grid.apply_upgrade(&a).expect("in grid");
        assert_eq!(grid.get(25, 25), Ok(4));
    }

    #[test]
    fn count_increments_per_overlapping_map() {
        let mut grid = CityGrid::new();
        let mut a = CoverageMap::new(25, 25);
        a.set(5, 5, 2);
        a.set(6, 5, 5);

        grid.apply_count(&a).expect("in grid");
        grid.apply_count(&a).expect("in grid");
        assert_eq!(grid.get(25, 25), Ok(2));
        assert_eq!(grid.get(26, 25), Ok(2));
        assert_eq!(grid.get(27, 25), Ok(0));
    }

    #[test]
    fn overlay_outside_grid_is_an_error() {
        let mut grid = CityGrid::new();
        let mut edge = CoverageMap::new(2, 2);
        edge.set(0, 0, 1); // global (-3, -3)
        assert_eq!(
            grid.apply_upgrade(&edge),
            Err(GridError::OutOfGrid { x: -3, y: -3 })
        );
    }
}
