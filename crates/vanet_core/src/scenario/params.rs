//! Run configuration resources.
//!
//! Everything the original exposed as mutable module state lives here as
//! immutable resources inserted once at world build. Systems read them; only
//! the bookkeeping resources ([`RsuDeployment`], [`NetworkState`]) mutate.

use bevy_ecs::prelude::Resource;

use crate::decision::DecisionMode;

/// Which subsystems the run exercises.
#[derive(Debug, Clone, Copy, Resource)]
pub struct RunFlags {
    /// UVCAST dissemination and accident injection.
    pub network_enabled: bool,
    /// RSU loading, coverage, gossip, decisions.
    pub rsu_enabled: bool,
    /// Coverage-map gossip and activation decisions. Off leaves every RSU
    /// active with whatever map it builds locally.
    pub map_spread_enabled: bool,
}

impl Default for RunFlags {
    fn default() -> Self {
        Self {
            network_enabled: false,
            rsu_enabled: false,
            map_spread_enabled: true,
        }
    }
}

/// Activation-decision classifier selection.
#[derive(Debug, Clone, Copy, Resource)]
pub struct DecisionConfig {
    pub mode: DecisionMode,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            mode: DecisionMode::ExclusiveRatio,
        }
    }
}

/// Simulation time at which the emergency packet is injected.
#[derive(Debug, Clone, Copy, Resource)]
pub struct AccidentTime(pub f64);

/// Simulation time after which no further frames are processed.
#[derive(Debug, Clone, Copy, Resource)]
pub struct StopTime(pub f64);

/// Simulation time at which the RSU deployment is placed. Absent means the
/// first frame.
#[derive(Debug, Clone, Copy, Resource)]
pub struct RsuLoadTime(pub f64);

/// Diagnostics toggles, mapped from the CLI debug flags onto `tracing`
/// events.
#[derive(Debug, Clone, Copy, Default, Resource)]
pub struct DebugOptions {
    pub level: u8,
    pub locations: bool,
    pub cell_maps: bool,
    pub map_broadcast: bool,
    /// Dump one RSU's coverage map whenever it changes.
    pub rsu_map: Option<u16>,
}

/// RSU sites awaiting placement, in file order. Ids are assigned
/// sequentially from [`FIRST_RSU_ID`].
#[derive(Debug, Default, Resource)]
pub struct RsuDeployment {
    pub sites: Vec<(f64, f64)>,
    pub loaded: bool,
    /// Ids of sites skipped because they were inside a building. The run
    /// continues without them but must exit non-zero.
    pub skipped: Vec<u16>,
}

/// First id handed to a deployed RSU.
pub const FIRST_RSU_ID: u16 = 10001;

/// Mutable network bookkeeping.
#[derive(Debug, Default, Resource)]
pub struct NetworkState {
    pub accident_injected: bool,
}
