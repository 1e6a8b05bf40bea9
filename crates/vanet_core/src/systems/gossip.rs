//! Coverage-map gossip and activation decisions.
//!
//! Runs after every RSU's coverage update, in stable id order, two phases:
//!
//! 1. **Spread**: every RSU whose broadcast trigger armed sends its map to
//!    all RSUs in range (active or not) and owes itself a decision.
//! 2. **Decide**: every RSU with a pending decision re-evaluates `active`.
//!    An activity transition broadcasts immediately: the RSU's own map when
//!    it switches on, an empty map when it switches off, so neighbours stop
//!    counting coverage that is no longer provided.
//!
//! Deliveries are immediate; RSUs later in id order observe maps delivered
//! earlier in the same pass, which is what makes mutual-shadowing pairs
//! resolve deterministically (the lower id decides first and yields).

use std::collections::BTreeMap;

use bevy_ecs::prelude::{Query, Res, ResMut};
use tracing::debug;

use crate::cells::CoverageMap;
use crate::decision::decide;
use crate::ecs::{GeoPosition, NodeDirectory, RoadNode, Rsu};
use crate::error::SimFault;
use crate::gis::Gis;
use crate::neighbors::{rsus_in_range, NodeView, RsuFilter};
use crate::scenario::params::{DebugOptions, DecisionConfig, RunFlags};

/// Condition: gossip runs only with RSUs present and map spread enabled.
pub fn map_spread_enabled(flags: Res<RunFlags>) -> bool {
    flags.rsu_enabled && flags.map_spread_enabled
}

type RsuQuery<'w, 's> = Query<'w, 's, (&'static mut RoadNode, &'static GeoPosition, &'static mut Rsu)>;

fn deliver_map(
    gis: &Gis,
    directory: &NodeDirectory,
    views: &BTreeMap<u32, NodeView>,
    rsus: &mut RsuQuery<'_, '_>,
    fault: &mut SimFault,
    sender_id: u16,
    sender_gid: u32,
    xgeo: f64,
    ygeo: f64,
    payload: CoverageMap,
    log_broadcast: bool,
) {
    let receivers = match rsus_in_range(gis.0.as_ref(), sender_gid, xgeo, ygeo, views, RsuFilter::All)
    {
        Ok(receivers) => receivers,
        Err(error) => {
            fault.record(error);
            return;
        }
    };
    if log_broadcast {
        debug!(
            sender = sender_id,
            receivers = receivers.len(),
            empty = payload.is_empty(),
            "coverage map broadcast"
        );
    }
    for receiver_id in receivers {
        let Some(entity) = directory.rsu(receiver_id) else {
            continue;
        };
        let Ok((_, _, mut receiver)) = rsus.get_mut(entity) else {
            continue;
        };
        receiver.neighbor_maps.insert(sender_id, payload);
        receiver.trigger_decision = true;
    }
}

pub fn gossip_system(
    gis: Res<Gis>,
    directory: Res<NodeDirectory>,
    config: Res<DecisionConfig>,
    debug_opts: Res<DebugOptions>,
    mut fault: ResMut<SimFault>,
    mut rsus: RsuQuery<'_, '_>,
) {
    // Transport snapshot: gid and position of every RSU. Activity changes
    // mid-pass do not matter here, deliveries go to active and inactive
    // RSUs alike.
    let mut views: BTreeMap<u32, NodeView> = BTreeMap::new();
    for (id, entity) in directory.rsu_entities() {
        let Ok((node, position, _)) = rsus.get(entity) else {
            continue;
        };
        views.insert(
            node.gid,
            NodeView {
                entity,
                id,
                gid: node.gid,
                xgeo: position.xgeo,
                ygeo: position.ygeo,
                active: node.active,
                packet: node.packet,
                scf: false,
            },
        );
    }

    // Phase 1: spread armed map broadcasts.
    for (id, entity) in directory.rsu_entities() {
        let Ok((node, position, mut rsu)) = rsus.get_mut(entity) else {
            continue;
        };
        if !rsu.trigger_broadcast {
            continue;
        }
        rsu.trigger_broadcast = false;
        // The sender re-evaluates its own activation as well.
        rsu.trigger_decision = true;
        if !node.active {
            continue;
        }
        let payload = rsu.coverage;
        let (sender_gid, xgeo, ygeo) = (node.gid, position.xgeo, position.ygeo);
        deliver_map(
            &gis,
            &directory,
            &views,
            &mut rsus,
            &mut fault,
            id,
            sender_gid,
            xgeo,
            ygeo,
            payload,
            debug_opts.map_broadcast,
        );
    }

    // Phase 2: pending decisions, with immediate transition broadcasts.
    for (id, entity) in directory.rsu_entities() {
        let Ok((mut node, position, mut rsu)) = rsus.get_mut(entity) else {
            continue;
        };
        if !rsu.trigger_decision {
            continue;
        }
        rsu.trigger_decision = false;

        let was_active = node.active;
        let outcome = match decide(config.mode, &rsu) {
            Ok(outcome) => outcome,
            Err(error) => {
                fault.record(error);
                return;
            }
        };
        node.active = outcome.active;
        if let Some(breakdown) = outcome.breakdown {
            rsu.utility = breakdown.utility;
            rsu.util_pos = breakdown.positive;
            rsu.util_neg = breakdown.negative;
        }

        if was_active == outcome.active {
            continue;
        }
        debug!(
            rsu = id,
            active = outcome.active,
            "activation decision flipped"
        );
        // Switching off poisons the stored maps with an empty payload.
        let payload = if outcome.active {
            rsu.coverage
        } else {
            CoverageMap::new(rsu.coverage.xcenter(), rsu.coverage.ycenter())
        };
        let (sender_gid, xgeo, ygeo) = (node.gid, position.xgeo, position.ygeo);
        deliver_map(
            &gis,
            &directory,
            &views,
            &mut rsus,
            &mut fault,
            id,
            sender_gid,
            xgeo,
            ygeo,
            payload,
            debug_opts.map_broadcast,
        );
    }
}
