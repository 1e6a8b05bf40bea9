//! RSU activation decisions.
//!
//! Each RSU periodically re-evaluates whether staying active is worth it,
//! using only its own coverage map and the maps its neighbours last
//! broadcast. Two classifiers exist; the run configuration picks one. Both
//! are pure over their inputs, so replaying identical gossip yields
//! identical activation state.

use crate::cells::{CityGrid, GridError};
use crate::ecs::Rsu;

/// Minimum share of exclusively covered cells that keeps an RSU active
/// under [`DecisionMode::ExclusiveRatio`].
const EXCLUSIVE_RATIO_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionMode {
    /// Mode 1: signed utility over per-cell gain and redundancy.
    Utility,
    /// Mode 2: fraction of cells no neighbour covers.
    ExclusiveRatio,
}

impl DecisionMode {
    /// Wire value from the CLI (`decision-mode=1|2`).
    pub fn from_mode(mode: u8) -> Option<Self> {
        match mode {
            1 => Some(Self::Utility),
            2 => Some(Self::ExclusiveRatio),
            _ => None,
        }
    }
}

/// Utility terms retained for inspection (mode 1 only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtilityBreakdown {
    pub utility: i64,
    pub positive: i64,
    pub negative: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub active: bool,
    pub breakdown: Option<UtilityBreakdown>,
}

/// Re-evaluate one RSU. Only reads the RSU; the caller applies the outcome.
pub fn decide(mode: DecisionMode, rsu: &Rsu) -> Result<DecisionOutcome, GridError> {
    match mode {
        DecisionMode::ExclusiveRatio => decide_exclusive_ratio(rsu),
        DecisionMode::Utility => decide_utility(rsu),
    }
}

/// Mode 2: an RSU stays active while more than 10% of its covered cells are
/// covered by no neighbour. The RSU's own map is not part of the overlay.
fn decide_exclusive_ratio(rsu: &Rsu) -> Result<DecisionOutcome, GridError> {
    let mut neighbor_grid = CityGrid::new();
    for map in rsu.neighbor_maps.values() {
        neighbor_grid.apply_upgrade(map)?;
    }

    let mut exclusive = 0u32;
    for (xx, yy, _) in rsu.coverage.covered() {
        let (gx, gy) = rsu.coverage.global_cell(xx, yy);
        if neighbor_grid.get(gx, gy)? == 0 {
            exclusive += 1;
        }
    }

    let ratio = if rsu.covered_cell_count == 0 {
        0.0
    } else {
        exclusive as f64 / rsu.covered_cell_count as f64
    };
    Ok(DecisionOutcome {
        active: ratio > EXCLUSIVE_RATIO_THRESHOLD,
        breakdown: None,
    })
}

/// Mode 1: per covered cell, credit the signal improvement this RSU offers
/// over the best neighbour (or its full signal where it is the better
/// provider) and debit one point per neighbour already covering the cell.
fn decide_utility(rsu: &Rsu) -> Result<DecisionOutcome, GridError> {
    let mut signal_grid = CityGrid::new();
    let mut redundancy_grid = CityGrid::new();
    for map in rsu.neighbor_maps.values() {
        signal_grid.apply_upgrade(map)?;
        redundancy_grid.apply_count(map)?;
    }

    let mut positive = 0i64;
    let mut negative = 0i64;
    for (xx, yy, signal) in rsu.coverage.covered() {
        let own = signal as i64;
        let (gx, gy) = rsu.coverage.global_cell(xx, yy);
        let best_neighbor = signal_grid.get(gx, gy)? as i64;
        if best_neighbor < own {
            positive += own - best_neighbor;
        } else {
            positive += own;
        }
        let redundancy = redundancy_grid.get(gx, gy)? as i64;
        if redundancy > 0 {
            negative += redundancy;
        }
    }

    let utility = positive - negative;
    Ok(DecisionOutcome {
        active: utility > 0,
        breakdown: Some(UtilityBreakdown {
            utility,
            positive,
            negative,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::CoverageMap;

    /// RSU at cell (25,25) covering `n` cells along its local row at the
    /// given signal level, counters kept consistent.
    fn rsu_with_row(n: usize, signal: u8) -> Rsu {
        let mut rsu = Rsu::new(25, 25);
        for xx in 0..n {
            rsu.coverage.set(xx, 5, signal);
        }
        rsu.covered_cell_count = rsu.coverage.covered_cells();
        rsu
    }

    fn map_with_row(n: usize, signal: u8) -> CoverageMap {
        let mut map = CoverageMap::new(25, 25);
        for xx in 0..n {
            map.set(xx, 5, signal);
        }
        map
    }

    #[test]
    fn lone_rsu_keeps_full_exclusive_coverage() {
        let rsu = rsu_with_row(10, 3);
        let outcome = decide(DecisionMode::ExclusiveRatio, &rsu).expect("decide");
        assert!(outcome.active);
        assert!(outcome.breakdown.is_none());
    }

    #[test]
    fn fully_shadowed_rsu_shuts_down() {
        let mut rsu = rsu_with_row(10, 3);
        rsu.neighbor_maps.insert(10002, map_with_row(10, 3));
        let outcome = decide(DecisionMode::ExclusiveRatio, &rsu).expect("decide");
        assert!(!outcome.active);
    }

    #[test]
    fn exclusive_ratio_threshold_is_strict() {
        // 1 exclusive cell out of 10 is exactly 10%: not enough.
        let mut rsu = rsu_with_row(10, 3);
        rsu.neighbor_maps.insert(10002, map_with_row(9, 3));
        let outcome = decide(DecisionMode::ExclusiveRatio, &rsu).expect("decide");
        assert!(!outcome.active);

        // 2 of 10 is 20%: stays up.
        let mut rsu = rsu_with_row(10, 3);
        rsu.neighbor_maps.insert(10002, map_with_row(8, 3));
        let outcome = decide(DecisionMode::ExclusiveRatio, &rsu).expect("decide");
        assert!(outcome.active);
    }

    #[test]
    fn empty_coverage_counts_as_zero_ratio() {
        let rsu = Rsu::new(25, 25);
        let outcome = decide(DecisionMode::ExclusiveRatio, &rsu).expect("decide");
        assert!(!outcome.active);
    }

    #[test]
    fn utility_rewards_unmatched_coverage() {
        let rsu = rsu_with_row(4, 3);
        let outcome = decide(DecisionMode::Utility, &rsu).expect("decide");
        let breakdown = outcome.breakdown.expect("mode 1 breakdown");
        assert_eq!(breakdown.positive, 12);
        assert_eq!(breakdown.negative, 0);
        assert_eq!(breakdown.utility, 12);
        assert!(outcome.active);
    }

    #[test]
    fn utility_debits_redundant_neighbors() {
        // Weak RSU (signal 1) under two neighbours covering the same row:
        // each cell earns 1 and pays 2.
        let mut rsu = rsu_with_row(4, 1);
        rsu.neighbor_maps.insert(10002, map_with_row(4, 5));
        rsu.neighbor_maps.insert(10003, map_with_row(4, 5));
        let outcome = decide(DecisionMode::Utility, &rsu).expect("decide");
        let breakdown = outcome.breakdown.expect("mode 1 breakdown");
        assert_eq!(breakdown.positive, 4);
        assert_eq!(breakdown.negative, 8);
        assert_eq!(breakdown.utility, -4);
        assert!(!outcome.active);
    }

    #[test]
    fn utility_credits_only_the_improvement_over_neighbors() {
        // Own signal 5 against a neighbour at 2: each cell earns the 3-point
        // improvement and pays 1 for the redundancy.
        let mut rsu = rsu_with_row(4, 5);
        rsu.neighbor_maps.insert(10002, map_with_row(4, 2));
        let outcome = decide(DecisionMode::Utility, &rsu).expect("decide");
        let breakdown = outcome.breakdown.expect("mode 1 breakdown");
        assert_eq!(breakdown.positive, 12);
        assert_eq!(breakdown.negative, 4);
        assert_eq!(breakdown.utility, 8);
        assert!(outcome.active);
    }

    #[test]
    fn identical_inputs_decide_identically() {
        let mut rsu = rsu_with_row(6, 4);
        rsu.neighbor_maps.insert(10002, map_with_row(3, 4));
        for mode in [DecisionMode::ExclusiveRatio, DecisionMode::Utility] {
            let a = decide(mode, &rsu).expect("decide");
            let b = decide(mode, &rsu).expect("decide");
            assert_eq!(a, b);
        }
    }
}
