//! Global map rebuild: city-wide signal and redundancy grids.
//!
//! Rebuilt from scratch every tick so the grids reflect only the RSUs that
//! are active right now; a deactivated RSU's footprint disappears the same
//! tick.

use bevy_ecs::prelude::{Query, Res, ResMut, Resource};

use crate::cells::CityGrid;
use crate::ecs::{NodeDirectory, RoadNode, Rsu};
use crate::error::SimFault;

/// City-wide overlays of every active RSU's coverage map.
#[derive(Debug, Default, Resource)]
pub struct GlobalGrids {
    /// Strongest signal per cell.
    pub signal: CityGrid,
    /// Number of active RSUs covering each cell.
    pub counts: CityGrid,
}

pub fn global_map_system(
    directory: Res<NodeDirectory>,
    mut grids: ResMut<GlobalGrids>,
    mut fault: ResMut<SimFault>,
    rsus: Query<(&RoadNode, &Rsu)>,
) {
    grids.signal.fill(0);
    grids.counts.fill(0);

    for (_, entity) in directory.rsu_entities() {
        let Ok((node, rsu)) = rsus.get(entity) else {
            continue;
        };
        if !node.active {
            continue;
        }
        if let Err(error) = grids.signal.apply_upgrade(&rsu.coverage) {
            fault.record(error);
            return;
        }
        if let Err(error) = grids.counts.apply_count(&rsu.coverage) {
            fault.record(error);
            return;
        }
    }
}
