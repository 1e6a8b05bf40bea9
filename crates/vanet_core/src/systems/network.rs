//! UVCAST network step.
//!
//! Order within a tick: store-carry-forward rebroadcasts, RSU origination,
//! then accident injection when the configured time arrives. The system
//! works on an id-keyed snapshot of packet and SCF state, runs the flood as
//! an iterative worklist (cluster depth would blow the stack recursively),
//! and writes the final state back through the directory. No step here can
//! fail on an empty neighbourhood; only spatial-backend errors abort.

use std::collections::{BTreeMap, VecDeque};

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::{debug, info};

use crate::cells::{XCENTER, YCENTER};
use crate::clock::SimulationClock;
use crate::ecs::{GeoPosition, NodeDirectory, Packet, RoadNode, Vehicle, EMERGENCY_ID};
use crate::error::SimError;
use crate::error::SimFault;
use crate::gis::{Gis, SpatialIndex};
use crate::neighbors::{
    rsus_in_range, vehicles_in_range, vehicles_near_point, NodeView, RsuFilter,
};
use crate::scenario::params::{AccidentTime, NetworkState, RunFlags};
use crate::stats::SimStats;
use crate::uvcast::{neighbor_angle_deltas, scf_duty};

/// Initial accident-source search radius in metres; doubles until a vehicle
/// turns up.
const ACCIDENT_SEARCH_START_M: u32 = 8;
/// Search cap: past this the map is treated as empty and injection retries
/// next tick.
const ACCIDENT_SEARCH_LIMIT_M: u32 = 8192;

/// Condition: the network step only runs when dissemination is enabled.
pub fn network_enabled(flags: Res<RunFlags>) -> bool {
    flags.network_enabled
}

#[derive(Debug, Clone, Copy)]
struct NetNode {
    entity: Entity,
    gid: u32,
    xgeo: f64,
    ygeo: f64,
    active: bool,
}

/// Mutable working state for one network step.
struct NetStep<'a> {
    gis: &'a dyn SpatialIndex,
    now: f64,
    vehicles: &'a BTreeMap<u16, NetNode>,
    rsus: &'a BTreeMap<u16, NetNode>,
    vehicle_views: BTreeMap<u32, NodeView>,
    rsu_views: BTreeMap<u32, NodeView>,
    vehicle_packets: BTreeMap<u16, Packet>,
    vehicle_scf: BTreeMap<u16, bool>,
    rsu_packets: BTreeMap<u16, Packet>,
}

impl NetStep<'_> {
    fn vehicle_packet(&self, id: u16) -> Packet {
        self.vehicle_packets.get(&id).copied().unwrap_or(Packet::NONE)
    }

    fn rsu_packet(&self, id: u16) -> Packet {
        self.rsu_packets.get(&id).copied().unwrap_or(Packet::NONE)
    }

    /// Position of a node that delivered a packet (vehicle or RSU).
    fn node_position(&self, id: u16) -> Option<(f64, f64)> {
        self.vehicles
            .get(&id)
            .or_else(|| self.rsus.get(&id))
            .map(|n| (n.xgeo, n.ygeo))
    }

    /// Non-recursive push of `packet` to every neighbour lacking it.
    fn push_to_neighbors(
        &mut self,
        stats: &mut SimStats,
        from_id: u16,
        from: NetNode,
        packet: Packet,
    ) -> Result<(), SimError> {
        let vehicles =
            vehicles_in_range(self.gis, from.gid, from.xgeo, from.ygeo, &self.vehicle_views)?;
        for vid in vehicles {
            if self.vehicle_packet(vid).packet_id != packet.packet_id {
                self.vehicle_packets.insert(
                    vid,
                    Packet {
                        src_id: from_id,
                        packet_id: packet.packet_id,
                        tx_time: self.now,
                    },
                );
                stats.record_delivery(self.now);
            }
        }
        let rsus = rsus_in_range(
            self.gis,
            from.gid,
            from.xgeo,
            from.ygeo,
            &self.rsu_views,
            RsuFilter::ActiveOnly,
        )?;
        for rid in rsus {
            if self.rsu_packet(rid).packet_id != packet.packet_id {
                self.rsu_packets.insert(
                    rid,
                    Packet {
                        src_id: from_id,
                        packet_id: packet.packet_id,
                        tx_time: self.now,
                    },
                );
                stats.record_delivery(self.now);
            }
        }
        Ok(())
    }

    /// Worklist flood. Entries are `(vehicle, parent)` where `parent` is the
    /// node that delivered the packet; the packet-id check is the visited
    /// bit, so every vehicle in the connected cluster is handled once.
    fn flood(
        &mut self,
        stats: &mut SimStats,
        mut queue: VecDeque<(u16, u16)>,
    ) -> Result<(), SimError> {
        while let Some((vid, parent)) = queue.pop_front() {
            let Some(&node) = self.vehicles.get(&vid) else {
                continue;
            };
            let packet = self.vehicle_packet(vid);
            if packet.is_none() {
                continue;
            }

            let neighbors =
                vehicles_in_range(self.gis, node.gid, node.xgeo, node.ygeo, &self.vehicle_views)?;
            for &nid in &neighbors {
                if self.vehicle_packet(nid).packet_id != packet.packet_id {
                    self.vehicle_packets.insert(
                        nid,
                        Packet {
                            src_id: vid,
                            packet_id: packet.packet_id,
                            tx_time: self.now,
                        },
                    );
                    stats.record_delivery(self.now);
                    queue.push_back((nid, vid));
                }
            }

            // Active RSUs in range pick the packet up, without recursing.
            let rsus = rsus_in_range(
                self.gis,
                node.gid,
                node.xgeo,
                node.ygeo,
                &self.rsu_views,
                RsuFilter::ActiveOnly,
            )?;
            for rid in rsus {
                if self.rsu_packet(rid).packet_id != packet.packet_id {
                    self.rsu_packets.insert(
                        rid,
                        Packet {
                            src_id: vid,
                            packet_id: packet.packet_id,
                            tx_time: self.now,
                        },
                    );
                    stats.record_delivery(self.now);
                }
            }

            // Gift-wrapping SCF assignment; the origin keeps no duty.
            if vid != packet.src_id {
                if neighbors.len() < 2 {
                    self.vehicle_scf.insert(vid, true);
                } else if let Some(parent_pos) = self.node_position(parent) {
                    let neighbor_pos: Vec<(f64, f64)> = neighbors
                        .iter()
                        .filter_map(|nid| self.vehicles.get(nid))
                        .map(|n| (n.xgeo, n.ygeo))
                        .collect();
                    let deltas =
                        neighbor_angle_deltas(parent_pos, (node.xgeo, node.ygeo), &neighbor_pos);
                    self.vehicle_scf.insert(vid, scf_duty(&deltas));
                }
            }
        }
        Ok(())
    }

    /// Per-tick SCF rebroadcast: carriers push their packet to anyone in
    /// range lacking it. No recursion, no new SCF duties.
    fn scf_rebroadcast(&mut self, stats: &mut SimStats) -> Result<(), SimError> {
        let carriers: Vec<u16> = self
            .vehicles
            .iter()
            .filter(|&(&id, node)| {
                node.active
                    && self.vehicle_scf.get(&id).copied().unwrap_or(false)
                    && self.vehicle_packet(id).is_some()
            })
            .map(|(&id, _)| id)
            .collect();

        for vid in carriers {
            let node = self.vehicles[&vid];
            let packet = self.vehicle_packet(vid);
            self.push_to_neighbors(stats, vid, node, packet)?;
        }
        Ok(())
    }

    /// Active RSUs holding a packet hand it to the rest of the active fleet
    /// (flat gossip) and seed the flood into vehicles in range.
    fn originate_from_rsus(&mut self, stats: &mut SimStats) -> Result<(), SimError> {
        let holders: Vec<u16> = self
            .rsus
            .iter()
            .filter(|&(&id, node)| node.active && self.rsu_packet(id).is_some())
            .map(|(&id, _)| id)
            .collect();

        for rid in holders {
            let node = self.rsus[&rid];
            let packet = self.rsu_packet(rid);

            let fleet: Vec<u16> = self
                .rsus
                .iter()
                .filter(|(_, other)| other.active)
                .map(|(&id, _)| id)
                .collect();
            for oid in fleet {
                if self.rsu_packet(oid).packet_id != packet.packet_id {
                    self.rsu_packets.insert(
                        oid,
                        Packet {
                            src_id: rid,
                            packet_id: packet.packet_id,
                            tx_time: self.now,
                        },
                    );
                    stats.record_delivery(self.now);
                }
            }

            let vehicles =
                vehicles_in_range(self.gis, node.gid, node.xgeo, node.ygeo, &self.vehicle_views)?;
            let mut queue = VecDeque::new();
            for vid in vehicles {
                if self.vehicle_packet(vid).packet_id != packet.packet_id {
                    self.vehicle_packets.insert(
                        vid,
                        Packet {
                            src_id: rid,
                            packet_id: packet.packet_id,
                            tx_time: self.now,
                        },
                    );
                    stats.record_delivery(self.now);
                    queue.push_back((vid, rid));
                }
            }
            self.flood(stats, queue)?;
        }
        Ok(())
    }

    /// Inject the emergency packet at the vehicle closest to the map
    /// centre, then flood its cluster. Returns the chosen source, or `None`
    /// when no vehicle is on the map yet.
    fn inject_accident(&mut self, stats: &mut SimStats) -> Result<Option<u16>, SimError> {
        let mut radius = ACCIDENT_SEARCH_START_M;
        let candidates = loop {
            let found =
                vehicles_near_point(self.gis, XCENTER, YCENTER, radius, &self.vehicle_views)?;
            if !found.is_empty() {
                break found;
            }
            radius = radius.saturating_mul(2);
            if radius > ACCIDENT_SEARCH_LIMIT_M {
                return Ok(None);
            }
        };

        let mut best: Option<(u32, u16)> = None;
        for vid in candidates {
            let Some(node) = self.vehicles.get(&vid) else {
                continue;
            };
            let distance = self.gis.distance_to_point(XCENTER, YCENTER, node.gid)?;
            let closer = match best {
                None => true,
                Some((bd, bid)) => distance < bd || (distance == bd && vid < bid),
            };
            if closer {
                best = Some((distance, vid));
            }
        }
        let Some((_, source)) = best else {
            return Ok(None);
        };

        self.vehicle_packets.insert(
            source,
            Packet {
                src_id: source,
                packet_id: EMERGENCY_ID,
                tx_time: self.now,
            },
        );
        let mut queue = VecDeque::new();
        queue.push_back((source, source));
        self.flood(stats, queue)?;
        Ok(Some(source))
    }
}

#[allow(clippy::too_many_arguments, clippy::type_complexity)]
pub fn network_system(
    clock: Res<SimulationClock>,
    gis: Res<Gis>,
    directory: Res<NodeDirectory>,
    accident: Option<Res<AccidentTime>>,
    mut state: ResMut<NetworkState>,
    mut stats: ResMut<SimStats>,
    mut fault: ResMut<SimFault>,
    mut nodes: Query<(&mut RoadNode, &GeoPosition, Option<&mut Vehicle>)>,
) {
    // Snapshot every node; mutations run on the snapshot and are written
    // back at the end, so no query borrow lives across a mutation point.
    let mut vehicles = BTreeMap::new();
    let mut vehicle_packets = BTreeMap::new();
    let mut vehicle_scf = BTreeMap::new();
    for (id, entity) in directory.vehicle_entities() {
        let Ok((node, position, vehicle)) = nodes.get(entity) else {
            continue;
        };
        vehicles.insert(
            id,
            NetNode {
                entity,
                gid: node.gid,
                xgeo: position.xgeo,
                ygeo: position.ygeo,
                active: node.active,
            },
        );
        vehicle_packets.insert(id, node.packet);
        vehicle_scf.insert(id, vehicle.map_or(false, |v| v.scf));
    }

    let mut rsus = BTreeMap::new();
    let mut rsu_packets = BTreeMap::new();
    for (id, entity) in directory.rsu_entities() {
        let Ok((node, position, _)) = nodes.get(entity) else {
            continue;
        };
        rsus.insert(
            id,
            NetNode {
                entity,
                gid: node.gid,
                xgeo: position.xgeo,
                ygeo: position.ygeo,
                active: node.active,
            },
        );
        rsu_packets.insert(id, node.packet);
    }

    let vehicle_views: BTreeMap<u32, NodeView> = vehicles
        .iter()
        .map(|(&id, n)| {
            (
                n.gid,
                NodeView {
                    entity: n.entity,
                    id,
                    gid: n.gid,
                    xgeo: n.xgeo,
                    ygeo: n.ygeo,
                    active: n.active,
                    packet: vehicle_packets[&id],
                    scf: vehicle_scf[&id],
                },
            )
        })
        .collect();
    let rsu_views: BTreeMap<u32, NodeView> = rsus
        .iter()
        .map(|(&id, n)| {
            (
                n.gid,
                NodeView {
                    entity: n.entity,
                    id,
                    gid: n.gid,
                    xgeo: n.xgeo,
                    ygeo: n.ygeo,
                    active: n.active,
                    packet: rsu_packets[&id],
                    scf: false,
                },
            )
        })
        .collect();

    let mut step = NetStep {
        gis: gis.0.as_ref(),
        now: clock.now(),
        vehicles: &vehicles,
        rsus: &rsus,
        vehicle_views,
        rsu_views,
        vehicle_packets,
        vehicle_scf,
        rsu_packets,
    };

    let inject_due = accident.map_or(false, |t| clock.now() >= t.0) && !state.accident_injected;
    let result = (|| -> Result<(), SimError> {
        step.scf_rebroadcast(&mut stats)?;
        step.originate_from_rsus(&mut stats)?;
        if inject_due {
            if let Some(source) = step.inject_accident(&mut stats)? {
                state.accident_injected = true;
                info!(source, time = clock.now(), "emergency packet injected");
            } else {
                debug!(time = clock.now(), "no vehicle near the map centre yet");
            }
        }
        Ok(())
    })();
    if let Err(error) = result {
        fault.record(error);
        return;
    }

    // Write the snapshot back.
    for (id, packet) in &step.vehicle_packets {
        let Some(entity) = directory.vehicle(*id) else {
            continue;
        };
        let Ok((mut node, _, vehicle)) = nodes.get_mut(entity) else {
            continue;
        };
        node.packet = *packet;
        if let Some(mut v) = vehicle {
            v.scf = step.vehicle_scf.get(id).copied().unwrap_or(false);
        }
    }
    for (id, packet) in &step.rsu_packets {
        let Some(entity) = directory.rsu(*id) else {
            continue;
        };
        let Ok((mut node, _, _)) = nodes.get_mut(entity) else {
            continue;
        };
        node.packet = *packet;
    }
}
