//! RSU deployment: places the configured sites at their load tick.

use bevy_ecs::prelude::{Commands, Res, ResMut};
use thiserror::Error;
use tracing::{info, warn};

use crate::clock::SimulationClock;
use crate::ecs::{GeoPosition, NodeDirectory, Packet, RoadNode, Rsu};
use crate::error::SimFault;
use crate::gis::{FeatureClass, Gis, GisError, SpatialIndex};
use crate::scenario::params::{RsuDeployment, RsuLoadTime, RunFlags, FIRST_RSU_ID};

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("RSU {id} at ({xgeo}, {ygeo}) is inside a building")]
    Obstructed { id: u16, xgeo: f64, ygeo: f64 },
    #[error(transparent)]
    Gis(#[from] GisError),
}

/// Validate a site and register its point. Fails `Obstructed` before any
/// mutation: no gid is reserved for a site inside a building.
pub fn register_rsu_point(
    gis: &mut dyn SpatialIndex,
    id: u16,
    xgeo: f64,
    ygeo: f64,
) -> Result<u32, PlacementError> {
    if gis.is_point_obstructed(xgeo, ygeo)? {
        return Err(PlacementError::Obstructed { id, xgeo, ygeo });
    }
    Ok(gis.add_point(xgeo, ygeo, id, FeatureClass::Rsu)?)
}

/// Condition: RSUs are enabled, still pending, and their load time has come.
pub fn should_load_rsus(
    flags: Res<RunFlags>,
    deployment: Res<RsuDeployment>,
    clock: Res<SimulationClock>,
    load_time: Option<Res<RsuLoadTime>>,
) -> bool {
    flags.rsu_enabled
        && !deployment.loaded
        && load_time.map_or(true, |t| clock.now() >= t.0)
}

/// Place the whole deployment. Obstructed sites are skipped with a warning
/// and recorded on the deployment so the process can exit non-zero; backend
/// errors abort the run.
pub fn rsu_load_system(
    mut commands: Commands,
    clock: Res<SimulationClock>,
    mut gis: ResMut<Gis>,
    mut directory: ResMut<NodeDirectory>,
    mut deployment: ResMut<RsuDeployment>,
    mut fault: ResMut<SimFault>,
) {
    deployment.loaded = true;

    let sites = deployment.sites.clone();
    for (index, (xgeo, ygeo)) in sites.into_iter().enumerate() {
        let id = FIRST_RSU_ID + index as u16;
        match register_rsu_point(gis.0.as_mut(), id, xgeo, ygeo) {
            Ok(gid) => {
                let position = GeoPosition::new(xgeo, ygeo);
                let entity = commands
                    .spawn((
                        RoadNode {
                            id,
                            gid,
                            active: true,
                            time_added: clock.now(),
                            packet: Packet::NONE,
                        },
                        position,
                        Rsu::new(position.xcell, position.ycell),
                    ))
                    .id();
                directory.insert_rsu(id, entity);
            }
            Err(PlacementError::Obstructed { id, xgeo, ygeo }) => {
                warn!(id, xgeo, ygeo, "skipping RSU site inside a building");
                deployment.skipped.push(id);
            }
            Err(PlacementError::Gis(error)) => {
                fault.record(error);
                return;
            }
        }
    }
    info!(
        count = directory.rsu_count(),
        time = clock.now(),
        "RSU deployment placed"
    );
}
