//! Run statistics: coverage levels, overcoverage, packet propagation, and
//! the offline RSU-subset enumerator.

use bevy_ecs::prelude::Resource;
use serde::Serialize;

use crate::cells::{CityGrid, CoverageMap, GridError, CITY_HEIGHT, CITY_WIDTH};

/// Default redundancy cap for the overcoverage metric: one RSU per cell is
/// useful, everything beyond counts as waste.
pub const DEFAULT_OVERCOVERAGE_CAP: i32 = 1;

/// Accumulated statistics for one run.
#[derive(Debug, Default, Resource)]
pub struct SimStats {
    /// Packets first-delivered per simulation timestamp, in time order.
    propagation: Vec<(f64, u32)>,
}

impl SimStats {
    /// Record one first-delivery at the given simulation time. Times arrive
    /// monotonically (the clock enforces it), so same-tick deliveries
    /// coalesce into the trailing bucket.
    pub fn record_delivery(&mut self, now: f64) {
        match self.propagation.last_mut() {
            Some((time, count)) if *time == now => *count += 1,
            _ => self.propagation.push((now, 1)),
        }
    }

    /// Propagation histogram: `(simulation time, deliveries)` per tick that
    /// saw any.
    pub fn propagation(&self) -> &[(f64, u32)] {
        &self.propagation
    }

    /// Total first-deliveries across the run.
    pub fn deliveries_total(&self) -> u64 {
        self.propagation.iter().map(|&(_, c)| c as u64).sum()
    }
}

/// Number of cells at each signal level 0..5.
pub fn coverage_statistics(grid: &CityGrid) -> [u64; 6] {
    let mut counts = [0u64; 6];
    for x in 0..CITY_WIDTH as i32 {
        for y in 0..CITY_HEIGHT as i32 {
            let level = grid.get(x, y).expect("iterating inside the grid");
            if (0..=5).contains(&level) {
                counts[level as usize] += 1;
            }
        }
    }
    counts
}

/// Redundant coverage above `cap`, summed over all cells of a count grid.
pub fn overcoverage_metric(counts: &CityGrid, cap: i32) -> i64 {
    let mut total = 0i64;
    for x in 0..CITY_WIDTH as i32 {
        for y in 0..CITY_HEIGHT as i32 {
            let c = counts.get(x, y).expect("iterating inside the grid");
            total += (c - cap).max(0) as i64;
        }
    }
    total
}

/// Metrics for one RSU subset, identified by its bitmask over the RSU list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CombinationResult {
    pub mask: u32,
    pub covered_cells: u32,
    pub overcoverage: i64,
}

/// Evaluate one subset of coverage maps (bit i of `mask` selects `maps[i]`).
pub fn evaluate_combination(
    maps: &[CoverageMap],
    mask: u32,
    cap: i32,
) -> Result<CombinationResult, GridError> {
    let mut signal = CityGrid::new();
    let mut counts = CityGrid::new();
    for (i, map) in maps.iter().enumerate() {
        if mask & (1 << i) != 0 {
            signal.apply_upgrade(map)?;
            counts.apply_count(map)?;
        }
    }
    let levels = coverage_statistics(&signal);
    let covered_cells = levels[1..].iter().sum::<u64>() as u32;
    Ok(CombinationResult {
        mask,
        covered_cells,
        overcoverage: overcoverage_metric(&counts, cap),
    })
}

/// Walk every subset of up to 32 RSUs and keep the ones that push a running
/// per-metric high-water mark: strictly more coverage, or strictly less
/// overcoverage, than anything seen before.
pub fn enumerate_combinations(
    maps: &[CoverageMap],
    cap: i32,
) -> Result<Vec<CombinationResult>, GridError> {
    assert!(maps.len() <= 32, "subset enumeration is capped at 32 RSUs");
    let mut kept = Vec::new();
    let mut best_covered = 0u32;
    let mut best_overcoverage = i64::MAX;

    for mask in 1..(1u64 << maps.len()) {
        let result = evaluate_combination(maps, mask as u32, cap)?;
        let improves =
            result.covered_cells > best_covered || result.overcoverage < best_overcoverage;
        if improves {
            best_covered = best_covered.max(result.covered_cells);
            best_overcoverage = best_overcoverage.min(result.overcoverage);
            kept.push(result);
        }
    }
    Ok(kept)
}
