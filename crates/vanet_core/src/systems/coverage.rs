//! Per-RSU coverage upkeep.
//!
//! Each RSU scans the vehicle points in radio range and folds the observed
//! signal levels into its 11×11 coverage map. The map is upgrade-only: a
//! cell's stored level is replaced only by a strictly greater one, so
//! `covered_cell_count` never decreases. Crossing the broadcast threshold
//! arms the RSU's map-broadcast trigger.

use bevy_ecs::prelude::{Query, Res, ResMut};
use tracing::{debug, trace};

use crate::cells::{cell_from_wgs84, MAXRANGE};
use crate::clock::SimulationClock;
use crate::ecs::{GeoPosition, NodeDirectory, Rsu};
use crate::error::{SimError, SimFault};
use crate::gis::{FeatureClass, Gis, SpatialIndex};
use crate::scenario::params::DebugOptions;
use crate::signal::signal_quality;

/// New covered cells since the last broadcast needed to arm the trigger.
const BROADCAST_DELTA: u32 = 5;

/// Condition: coverage upkeep only matters when RSUs are simulated.
pub fn rsu_enabled(flags: Res<crate::scenario::params::RunFlags>) -> bool {
    flags.rsu_enabled
}

pub fn coverage_system(
    clock: Res<SimulationClock>,
    gis: Res<Gis>,
    directory: Res<NodeDirectory>,
    debug_opts: Res<DebugOptions>,
    mut fault: ResMut<SimFault>,
    mut rsus: Query<(&GeoPosition, &mut Rsu)>,
) {
    let now = clock.now();

    for (id, entity) in directory.rsu_entities() {
        let Ok((position, mut rsu)) = rsus.get_mut(entity) else {
            continue;
        };

        let result = (|| -> Result<(), SimError> {
            let in_range = gis.0.points_in_range(
                position.xgeo,
                position.ygeo,
                MAXRANGE,
                FeatureClass::Vehicle,
            )?;

            for gid in in_range {
                let distance = gis.0.distance_to_point(position.xgeo, position.ygeo, gid)?;
                if distance == 0 {
                    // Self-matches and co-located points carry no coverage
                    // information.
                    continue;
                }
                let (nx, ny) = gis.0.point_coords(gid)?;
                let (ncellx, ncelly) = cell_from_wgs84(nx, ny);
                let los = gis.0.line_of_sight(position.xgeo, position.ygeo, nx, ny)?;
                let signal = signal_quality(distance, los);
                if signal == 0 {
                    continue;
                }

                let Some((dx, dy)) = rsu.coverage.local_offset(ncellx, ncelly) else {
                    // Numerical artefact: the range query admitted a point
                    // whose cell falls outside the 11×11 window.
                    trace!(rsu = id, gid, "neighbour cell outside coverage window");
                    continue;
                };

                if rsu.coverage.get(dx, dy) == 0 {
                    rsu.covered_cell_count += 1;
                    rsu.last_time_updated = now;
                }
                if signal > rsu.coverage.get(dx, dy) {
                    rsu.coverage.set(dx, dy, signal);
                }
            }
            Ok(())
        })();
        if let Err(error) = result {
            fault.record(error);
            return;
        }

        if rsu.covered_cell_count - rsu.covered_cells_on_last_broadcast > BROADCAST_DELTA {
            rsu.trigger_broadcast = true;
            rsu.covered_cells_on_last_broadcast = rsu.covered_cell_count;
            debug!(
                rsu = id,
                covered = rsu.covered_cell_count,
                "coverage map broadcast armed"
            );
        }

        if debug_opts.rsu_map == Some(id) && rsu.last_time_updated == now {
            debug!(rsu = id, covered = rsu.covered_cell_count, "coverage map grew");
        }
    }
}
