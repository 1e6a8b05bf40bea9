//! Scenario configuration and world assembly.

pub mod build;
pub mod params;

pub use build::{build_world, load_building_rects, load_rsu_sites, ScenarioError, ScenarioParams};
pub use params::{
    AccidentTime, DebugOptions, DecisionConfig, NetworkState, RsuDeployment, RsuLoadTime,
    RunFlags, StopTime, FIRST_RSU_ID,
};
