//! Entity Component System: components and lookup tables for road objects.
//!
//! Vehicles and RSUs share a common identity/position block and differ in
//! their payload component. Cross-entity lookups go through the id-keyed
//! [`NodeDirectory`] resource; systems resolve ids to entities at the point
//! of mutation instead of holding references across mutation points.

use std::collections::BTreeMap;

use bevy_ecs::prelude::{Component, Entity, Resource};

use crate::cells::{cell_from_wgs84, CoverageMap};

/// Packet id of the single emergency message.
pub const EMERGENCY_ID: u16 = 31337;

/// A network packet slot. `packet_id == 0` means the slot is empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Packet {
    pub src_id: u16,
    pub packet_id: u16,
    pub tx_time: f64,
}

impl Packet {
    pub const NONE: Packet = Packet {
        src_id: 0,
        packet_id: 0,
        tx_time: 0.0,
    };

    pub fn is_none(&self) -> bool {
        self.packet_id == 0
    }

    pub fn is_some(&self) -> bool {
        self.packet_id != 0
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::NONE
    }
}

/// WGS84 position plus the derived arc-second cell indices. The cell pair
/// is refreshed on every move so the two representations never diverge.
#[derive(Debug, Clone, Copy, PartialEq, Component)]
pub struct GeoPosition {
    pub xgeo: f64,
    pub ygeo: f64,
    pub xcell: u16,
    pub ycell: u16,
}

impl GeoPosition {
    pub fn new(xgeo: f64, ygeo: f64) -> Self {
        let (xcell, ycell) = cell_from_wgs84(xgeo, ygeo);
        Self {
            xgeo,
            ygeo,
            xcell,
            ycell,
        }
    }

    pub fn relocate(&mut self, xgeo: f64, ygeo: f64) {
        *self = Self::new(xgeo, ygeo);
    }
}

/// Identity block shared by vehicles and RSUs.
#[derive(Debug, Clone, Copy, PartialEq, Component)]
pub struct RoadNode {
    /// Stable, externally assigned id.
    pub id: u16,
    /// Spatial-index id assigned on insert; non-zero.
    pub gid: u32,
    pub active: bool,
    /// Simulation time the node first appeared.
    pub time_added: f64,
    pub packet: Packet,
}

#[derive(Debug, Clone, Copy, PartialEq, Component)]
pub struct Vehicle {
    pub speed: f64,
    pub parked: bool,
    /// Store-carry-forward duty for the currently held packet.
    pub scf: bool,
}

impl Vehicle {
    pub fn new(speed: f64) -> Self {
        Self {
            speed,
            parked: speed == 0.0,
            scf: false,
        }
    }
}

/// Road-side unit state: the local coverage map plus everything the gossip
/// and decision steps need.
#[derive(Debug, Clone, PartialEq, Component)]
pub struct Rsu {
    pub coverage: CoverageMap,
    /// Last coverage map received from each neighbouring RSU.
    pub neighbor_maps: BTreeMap<u16, CoverageMap>,
    /// Cells with signal > 0 in `coverage`.
    pub covered_cell_count: u32,
    /// Watermark: `covered_cell_count` at the last map broadcast.
    pub covered_cells_on_last_broadcast: u32,
    pub trigger_broadcast: bool,
    pub trigger_decision: bool,
    /// Simulation time the coverage map last gained a cell.
    pub last_time_updated: f64,
    pub utility: i64,
    pub util_pos: i64,
    pub util_neg: i64,
}

impl Rsu {
    pub fn new(xcell: u16, ycell: u16) -> Self {
        Self {
            coverage: CoverageMap::new(xcell, ycell),
            neighbor_maps: BTreeMap::new(),
            covered_cell_count: 0,
            covered_cells_on_last_broadcast: 0,
            trigger_broadcast: false,
            trigger_decision: false,
            last_time_updated: 0.0,
            utility: 0,
            util_pos: 0,
            util_neg: 0,
        }
    }
}

/// Id-keyed entity lookup. Ordered maps keep per-tick iteration in stable
/// id order, which makes gossip and flood processing deterministic.
#[derive(Debug, Default, Resource)]
pub struct NodeDirectory {
    vehicles: BTreeMap<u16, Entity>,
    rsus: BTreeMap<u16, Entity>,
}

impl NodeDirectory {
    pub fn insert_vehicle(&mut self, id: u16, entity: Entity) {
        self.vehicles.insert(id, entity);
    }

    pub fn insert_rsu(&mut self, id: u16, entity: Entity) {
        self.rsus.insert(id, entity);
    }

    pub fn vehicle(&self, id: u16) -> Option<Entity> {
        self.vehicles.get(&id).copied()
    }

    pub fn rsu(&self, id: u16) -> Option<Entity> {
        self.rsus.get(&id).copied()
    }

    pub fn vehicle_entities(&self) -> impl Iterator<Item = (u16, Entity)> + '_ {
        self.vehicles.iter().map(|(&id, &e)| (id, e))
    }

    pub fn rsu_entities(&self) -> impl Iterator<Item = (u16, Entity)> + '_ {
        self.rsus.iter().map(|(&id, &e)| (id, e))
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn rsu_count(&self) -> usize {
        self.rsus.len()
    }
}
