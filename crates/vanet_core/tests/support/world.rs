#![allow(dead_code)]

use bevy_ecs::prelude::World;

use vanet_core::cells::METERS_TO_DEGREES;
use vanet_core::decision::DecisionMode;
use vanet_core::fcd::{FcdFrame, FcdVehicle};
use vanet_core::gis::MemoryGis;
use vanet_core::scenario::{build_world, ScenarioParams};

/// Metres to WGS84 degrees inside the map tile.
pub fn meters(m: f64) -> f64 {
    m * METERS_TO_DEGREES
}

/// Build one FCD frame from `(id, xgeo, ygeo)` triples; every vehicle moves
/// at a nominal speed.
pub fn frame(time: f64, vehicles: &[(u16, f64, f64)]) -> FcdFrame {
    FcdFrame {
        time,
        vehicles: vehicles
            .iter()
            .map(|&(id, xgeo, ygeo)| FcdVehicle {
                id,
                xgeo,
                ygeo,
                speed: 8.0,
            })
            .collect(),
    }
}

/// Builder that assembles a world with an in-memory GIS backend, mirroring
/// what the CLI wires up from files.
#[derive(Default)]
pub struct TestWorldBuilder {
    frames: Vec<FcdFrame>,
    rsu_sites: Vec<(f64, f64)>,
    buildings: Vec<(f64, f64, f64, f64)>,
    network: Option<f64>,
    stop_time: Option<f64>,
    rsu_load_time: Option<f64>,
    decision_mode: Option<DecisionMode>,
    disable_map_spread: bool,
}

impl TestWorldBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames(mut self, frames: Vec<FcdFrame>) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_rsus(mut self, sites: Vec<(f64, f64)>) -> Self {
        self.rsu_sites = sites;
        self
    }

    /// Add an axis-aligned building rectangle (degrees).
    pub fn with_building(mut self, xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        self.buildings.push((xmin, ymin, xmax, ymax));
        self
    }

    /// Enable UVCAST with an accident at the given simulation time.
    pub fn with_network(mut self, accident_time: f64) -> Self {
        self.network = Some(accident_time);
        self
    }

    pub fn with_stop_time(mut self, stop_time: f64) -> Self {
        self.stop_time = Some(stop_time);
        self
    }

    pub fn with_rsu_load_time(mut self, load_time: f64) -> Self {
        self.rsu_load_time = Some(load_time);
        self
    }

    pub fn with_decision_mode(mut self, mode: DecisionMode) -> Self {
        self.decision_mode = Some(mode);
        self
    }

    pub fn without_map_spread(mut self) -> Self {
        self.disable_map_spread = true;
        self
    }

    pub fn build(self) -> World {
        let mut gis = MemoryGis::new();
        for (xmin, ymin, xmax, ymax) in self.buildings {
            gis.add_building_rect(xmin, ymin, xmax, ymax);
        }

        let mut params = ScenarioParams::default().with_frames(self.frames);
        if !self.rsu_sites.is_empty() {
            params = params.with_rsu_sites(self.rsu_sites);
        }
        if let Some(accident_time) = self.network {
            params = params.with_network(accident_time);
        }
        if let Some(mode) = self.decision_mode {
            params = params.with_decision_mode(mode);
        }
        params.stop_time = self.stop_time;
        params.rsu_load_time = self.rsu_load_time;
        if self.disable_map_spread {
            params.flags.map_spread_enabled = false;
        }

        let mut world = World::new();
        build_world(&mut world, Box::new(gis), params).expect("world builds");
        world
    }
}
