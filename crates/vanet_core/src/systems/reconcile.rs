//! FCD reconciliation: folds the current frame into the vehicle store.
//!
//! Vehicles appear on first sighting and are updated in place afterwards.
//! Nothing is ever removed: a vehicle that leaves the trace goes inactive
//! and its last reported position lingers in the spatial index, where
//! downstream active-filters mask it.

use bevy_ecs::prelude::{Commands, Query, Res, ResMut};
use tracing::{debug, trace};

use crate::clock::SimulationClock;
use crate::ecs::{GeoPosition, NodeDirectory, Packet, RoadNode, Vehicle};
use crate::error::SimFault;
use crate::fcd::CurrentFrame;
use crate::gis::{FeatureClass, Gis, SpatialIndex};
use crate::scenario::params::DebugOptions;

pub fn reconcile_system(
    mut commands: Commands,
    frame: Res<CurrentFrame>,
    clock: Res<SimulationClock>,
    debug_opts: Res<DebugOptions>,
    mut gis: ResMut<Gis>,
    mut directory: ResMut<NodeDirectory>,
    mut fault: ResMut<SimFault>,
    mut vehicles: Query<(&mut RoadNode, &mut GeoPosition, &mut Vehicle)>,
) {
    // A vehicle is active iff it appears in this frame.
    for (mut node, _, _) in vehicles.iter_mut() {
        node.active = false;
    }

    let now = clock.now();
    for record in &frame.0.vehicles {
        match directory.vehicle(record.id) {
            Some(entity) => {
                let Ok((mut node, mut position, mut vehicle)) = vehicles.get_mut(entity) else {
                    continue;
                };
                if let Err(error) = gis.0.update_point(node.gid, record.xgeo, record.ygeo) {
                    fault.record(error);
                    return;
                }
                position.relocate(record.xgeo, record.ygeo);
                vehicle.speed = record.speed;
                vehicle.parked = record.speed == 0.0;
                node.active = true;
                if debug_opts.locations {
                    trace!(
                        id = record.id,
                        xgeo = record.xgeo,
                        ygeo = record.ygeo,
                        "vehicle moved"
                    );
                }
            }
            None => {
                let gid = match gis.0.add_point(
                    record.xgeo,
                    record.ygeo,
                    record.id,
                    FeatureClass::Vehicle,
                ) {
                    Ok(gid) => gid,
                    Err(error) => {
                        fault.record(error);
                        return;
                    }
                };
                let entity = commands
                    .spawn((
                        RoadNode {
                            id: record.id,
                            gid,
                            active: true,
                            time_added: now,
                            packet: Packet::NONE,
                        },
                        GeoPosition::new(record.xgeo, record.ygeo),
                        Vehicle::new(record.speed),
                    ))
                    .id();
                directory.insert_vehicle(record.id, entity);
                if debug_opts.locations {
                    debug!(id = record.id, gid, "vehicle first seen");
                }
            }
        }
    }
}
