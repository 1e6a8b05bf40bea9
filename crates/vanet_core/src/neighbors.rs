//! Neighbour resolution: who can talk to whom, at what signal level.
//!
//! Systems snapshot the entities they need into [`NodeView`] maps keyed by
//! gid, then resolve range queries against the spatial index. Helpers return
//! ids, never references; callers re-resolve through the directory when they
//! mutate.

use std::collections::BTreeMap;

use bevy_ecs::prelude::Entity;

use crate::cells::MAXRANGE;
use crate::ecs::Packet;
use crate::gis::{FeatureClass, GisError, SpatialIndex};
use crate::signal::{signal_quality, MIN_USABLE_SIGNAL};

/// Flat copy of one road node, taken at the start of a system pass.
#[derive(Debug, Clone, Copy)]
pub struct NodeView {
    pub entity: Entity,
    pub id: u16,
    pub gid: u32,
    pub xgeo: f64,
    pub ygeo: f64,
    pub active: bool,
    pub packet: Packet,
    /// SCF duty; always false for RSUs.
    pub scf: bool,
}

/// Which RSUs a range query may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsuFilter {
    /// Active and inactive alike (decision gossip must reach sleeping RSUs).
    All,
    /// Only active RSUs (packet forwarding).
    ActiveOnly,
}

/// Distance, LOS, and signal level between a coordinate and an indexed point.
pub fn link_quality(
    gis: &dyn SpatialIndex,
    xgeo: f64,
    ygeo: f64,
    target_gid: u32,
    target_x: f64,
    target_y: f64,
) -> Result<(u32, bool, u8), GisError> {
    let distance = gis.distance_to_point(xgeo, ygeo, target_gid)?;
    let los = gis.line_of_sight(xgeo, ygeo, target_x, target_y)?;
    Ok((distance, los, signal_quality(distance, los)))
}

/// Ids of active vehicles within radio range of `src` with a usable link.
/// `src` itself is excluded. Results come back in ascending gid order.
pub fn vehicles_in_range(
    gis: &dyn SpatialIndex,
    src_gid: u32,
    src_x: f64,
    src_y: f64,
    vehicles: &BTreeMap<u32, NodeView>,
) -> Result<Vec<u16>, GisError> {
    let mut neighbors = Vec::new();
    for gid in gis.points_in_range(src_x, src_y, MAXRANGE, FeatureClass::Vehicle)? {
        if gid == src_gid {
            continue;
        }
        // Stale gids (inactive vehicles linger in the index) resolve to
        // inactive views and drop out here.
        let Some(view) = vehicles.get(&gid) else {
            continue;
        };
        if !view.active {
            continue;
        }
        let (_, _, signal) = link_quality(gis, src_x, src_y, gid, view.xgeo, view.ygeo)?;
        if signal >= MIN_USABLE_SIGNAL {
            neighbors.push(view.id);
        }
    }
    Ok(neighbors)
}

/// Ids of RSUs within radio range of `src` with a usable link.
pub fn rsus_in_range(
    gis: &dyn SpatialIndex,
    src_gid: u32,
    src_x: f64,
    src_y: f64,
    rsus: &BTreeMap<u32, NodeView>,
    filter: RsuFilter,
) -> Result<Vec<u16>, GisError> {
    let mut neighbors = Vec::new();
    for gid in gis.points_in_range(src_x, src_y, MAXRANGE, FeatureClass::Rsu)? {
        if gid == src_gid {
            continue;
        }
        let Some(view) = rsus.get(&gid) else {
            continue;
        };
        if filter == RsuFilter::ActiveOnly && !view.active {
            continue;
        }
        let (_, _, signal) = link_quality(gis, src_x, src_y, gid, view.xgeo, view.ygeo)?;
        if signal >= MIN_USABLE_SIGNAL {
            neighbors.push(view.id);
        }
    }
    Ok(neighbors)
}

/// Ids of vehicles within `range_m` of a point, no signal filtering. Used to
/// pick the accident source near the map centre.
pub fn vehicles_near_point(
    gis: &dyn SpatialIndex,
    xgeo: f64,
    ygeo: f64,
    range_m: u32,
    vehicles: &BTreeMap<u32, NodeView>,
) -> Result<Vec<u16>, GisError> {
    let mut found = Vec::new();
    for gid in gis.points_in_range(xgeo, ygeo, range_m, FeatureClass::Vehicle)? {
        if let Some(view) = vehicles.get(&gid) {
            found.push(view.id);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::{METERS_TO_DEGREES, XCENTER, YCENTER};
    use crate::gis::MemoryGis;

    fn meters(m: f64) -> f64 {
        m * METERS_TO_DEGREES
    }

    fn view(entity_index: u32, id: u16, gid: u32, xgeo: f64, ygeo: f64, active: bool) -> NodeView {
        NodeView {
            entity: Entity::from_raw(entity_index),
            id,
            gid,
            xgeo,
            ygeo,
            active,
            packet: Packet::NONE,
            scf: false,
        }
    }

    /// Distances on a clear line step down exactly with the LOS table.
    #[test]
    fn clear_line_signal_steps() {
        let mut gis = MemoryGis::new();
        let (x0, y0) = (-8.6170, 41.1635);
        let expected = [(50.0, 5), (60.0, 5), (100.0, 4), (120.0, 3), (140.0, 2), (160.0, 0)];
        for (d, want) in expected {
            let gid = gis
                .add_point(x0 + meters(d), y0, 1, FeatureClass::Vehicle)
                .expect("add");
            let (_, los, signal) =
                link_quality(&gis, x0, y0, gid, x0 + meters(d), y0).expect("link");
            assert!(los);
            assert_eq!(signal, want, "LOS at {d} m");
        }
    }

    /// The same distances behind a building follow the NLOS table.
    #[test]
    fn obstructed_line_signal_steps() {
        let mut gis = MemoryGis::new();
        let (x0, y0) = (-8.6170, 41.1635);
        // A thin wall just east of the source cuts every segment.
        gis.add_building_rect(
            x0 + meters(5.0),
            y0 - meters(2.0),
            x0 + meters(6.0),
            y0 + meters(2.0),
        );
        let expected = [(50.0, 5), (60.0, 4), (100.0, 3), (120.0, 2), (140.0, 0), (160.0, 0)];
        for (d, want) in expected {
            let gid = gis
                .add_point(x0 + meters(d), y0, 1, FeatureClass::Vehicle)
                .expect("add");
            let (_, los, signal) =
                link_quality(&gis, x0, y0, gid, x0 + meters(d), y0).expect("link");
            assert!(!los);
            assert_eq!(signal, want, "NLOS at {d} m");
        }
    }

    #[test]
    fn range_helper_drops_self_inactive_and_weak_links() {
        let mut gis = MemoryGis::new();
        let (x0, y0) = (XCENTER, YCENTER);
        let src_gid = gis.add_point(x0, y0, 1, FeatureClass::Vehicle).expect("add");

        let mut vehicles = BTreeMap::new();
        vehicles.insert(src_gid, view(0, 1, src_gid, x0, y0, true));

        let near = gis
            .add_point(x0 + meters(50.0), y0, 2, FeatureClass::Vehicle)
            .expect("add");
        vehicles.insert(near, view(1, 2, near, x0 + meters(50.0), y0, true));

        let sleeping = gis
            .add_point(x0 - meters(50.0), y0, 3, FeatureClass::Vehicle)
            .expect("add");
        vehicles.insert(sleeping, view(2, 3, sleeping, x0 - meters(50.0), y0, false));

        let weak = gis
            .add_point(x0, y0 + meters(140.0), 4, FeatureClass::Vehicle)
            .expect("add");
        vehicles.insert(weak, view(3, 4, weak, x0, y0 + meters(140.0), true));

        let ids = vehicles_in_range(&gis, src_gid, x0, y0, &vehicles).expect("range");
        // 140 m LOS is signal 2: still usable. Only self and the inactive
        // vehicle drop out.
        assert_eq!(ids, vec![2, 4]);

        let anyone = vehicles_near_point(&gis, x0, y0, 155, &vehicles).expect("near");
        assert_eq!(anyone, vec![1, 2, 3, 4]);
    }

    #[test]
    fn rsu_filter_controls_inactive_visibility() {
        let mut gis = MemoryGis::new();
        let (x0, y0) = (XCENTER, YCENTER);
        let src_gid = gis.add_point(x0, y0, 1, FeatureClass::Vehicle).expect("add");

        let mut rsus = BTreeMap::new();
        let awake = gis
            .add_point(x0 + meters(60.0), y0, 10001, FeatureClass::Rsu)
            .expect("add");
        rsus.insert(awake, view(0, 10001, awake, x0 + meters(60.0), y0, true));
        let asleep = gis
            .add_point(x0 - meters(60.0), y0, 10002, FeatureClass::Rsu)
            .expect("add");
        rsus.insert(asleep, view(1, 10002, asleep, x0 - meters(60.0), y0, false));

        let all = rsus_in_range(&gis, src_gid, x0, y0, &rsus, RsuFilter::All).expect("range");
        assert_eq!(all, vec![10001, 10002]);
        let active =
            rsus_in_range(&gis, src_gid, x0, y0, &rsus, RsuFilter::ActiveOnly).expect("range");
        assert_eq!(active, vec![10001]);
    }
}
