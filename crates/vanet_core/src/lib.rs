//! # Urban VANET Coverage Simulator Core
//!
//! A turn-based simulator of vehicular networks in a city tile, driven by a
//! floating-car-data (FCD) trace. Per tick it:
//!
//! - reconciles the vehicle store against the incoming frame,
//! - updates every RSU's local coverage map from distance and line-of-sight,
//! - gossips coverage maps between RSUs and re-decides which stay active,
//! - runs the UVCAST dissemination step (flood, store-carry-forward), and
//! - rebuilds the city-wide signal and redundancy grids.
//!
//! ## Key concepts
//!
//! - **Deterministic**: all per-tick iteration is in stable id order; given
//!   identical inputs a run is bit-identical.
//! - **Id-keyed state**: systems look entities up through [`ecs::NodeDirectory`]
//!   at the point of mutation; no references live across mutation points.
//! - **Abstract GIS**: spatial queries go through the [`gis::SpatialIndex`]
//!   trait; [`gis::MemoryGis`] is the bundled backend.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bevy_ecs::prelude::World;
//! use vanet_core::fcd::load_fcd_file;
//! use vanet_core::gis::MemoryGis;
//! use vanet_core::runner::{run_to_completion, tick_schedule};
//! use vanet_core::scenario::{build_world, ScenarioParams};
//!
//! let frames = load_fcd_file("trace.xml").expect("trace");
//! let mut world = World::new();
//! let params = ScenarioParams::default().with_frames(frames);
//! build_world(&mut world, Box::new(MemoryGis::new()), params).expect("build");
//!
//! let mut schedule = tick_schedule();
//! let frames_run = run_to_completion(&mut world, &mut schedule).expect("run");
//! ```

pub mod cells;
pub mod clock;
pub mod decision;
pub mod ecs;
pub mod error;
pub mod fcd;
pub mod gis;
pub mod neighbors;
pub mod runner;
pub mod scenario;
pub mod signal;
pub mod stats;
pub mod systems;
pub mod uvcast;
