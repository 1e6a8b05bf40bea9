//! Scenario assembly: input loading and world construction.
//!
//! All file handles are opened and drained here, before the first frame
//! runs. The builder purges stale vehicle/RSU points from whatever backend
//! it is handed, then inserts every resource the tick schedule needs.

use std::path::Path;

use bevy_ecs::prelude::World;
use thiserror::Error;

use crate::clock::SimulationClock;
use crate::decision::DecisionMode;
use crate::ecs::NodeDirectory;
use crate::error::SimFault;
use crate::fcd::{FcdError, FcdFrame, FcdTrace};
use crate::gis::{FeatureClass, Gis, GisError, SpatialIndex};
use crate::scenario::params::{
    AccidentTime, DebugOptions, DecisionConfig, NetworkState, RsuDeployment, RsuLoadTime,
    RunFlags, StopTime,
};
use crate::stats::SimStats;
use crate::systems::global_map::GlobalGrids;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("cannot read input file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Fcd(#[from] FcdError),
    #[error(transparent)]
    Gis(#[from] GisError),
    #[error("malformed input table: {0}")]
    Csv(#[from] csv::Error),
    #[error("record {record} of {context}: {message}")]
    Config {
        context: String,
        record: usize,
        message: String,
    },
}

fn parse_field(
    context: &str,
    record_index: usize,
    record: &csv::StringRecord,
    field: usize,
) -> Result<f64, ScenarioError> {
    let raw = record.get(field).unwrap_or("").trim();
    raw.parse().map_err(|_| ScenarioError::Config {
        context: context.to_string(),
        record: record_index,
        message: format!("expected a number in column {}, got {raw:?}", field + 1),
    })
}

/// Load RSU sites from a tab-separated `xgeo<TAB>ygeo` file. Blank lines are
/// skipped; ids are assigned later, in file order.
pub fn load_rsu_sites<P: AsRef<Path>>(path: P) -> Result<Vec<(f64, f64)>, ScenarioError> {
    let context = path.as_ref().display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path.as_ref())?;

    let mut sites = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let x = parse_field(&context, index, &record, 0)?;
        let y = parse_field(&context, index, &record, 1)?;
        sites.push((x, y));
    }
    Ok(sites)
}

/// Load building footprints from a tab-separated
/// `xmin<TAB>ymin<TAB>xmax<TAB>ymax` rectangle file.
pub fn load_building_rects<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<(f64, f64, f64, f64)>, ScenarioError> {
    let context = path.as_ref().display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path.as_ref())?;

    let mut rects = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rects.push((
            parse_field(&context, index, &record, 0)?,
            parse_field(&context, index, &record, 1)?,
            parse_field(&context, index, &record, 2)?,
            parse_field(&context, index, &record, 3)?,
        ));
    }
    Ok(rects)
}

/// Parameters for building a simulation world.
#[derive(Debug, Clone)]
pub struct ScenarioParams {
    pub frames: Vec<FcdFrame>,
    pub rsu_sites: Vec<(f64, f64)>,
    pub flags: RunFlags,
    pub decision_mode: DecisionMode,
    pub accident_time: Option<f64>,
    pub stop_time: Option<f64>,
    pub rsu_load_time: Option<f64>,
    pub debug: DebugOptions,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            rsu_sites: Vec::new(),
            flags: RunFlags::default(),
            decision_mode: DecisionMode::ExclusiveRatio,
            accident_time: None,
            stop_time: None,
            rsu_load_time: None,
            debug: DebugOptions::default(),
        }
    }
}

impl ScenarioParams {
    pub fn with_frames(mut self, frames: Vec<FcdFrame>) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_rsu_sites(mut self, sites: Vec<(f64, f64)>) -> Self {
        self.rsu_sites = sites;
        self.flags.rsu_enabled = true;
        self
    }

    pub fn with_network(mut self, accident_time: f64) -> Self {
        self.flags.network_enabled = true;
        self.accident_time = Some(accident_time);
        self
    }

    pub fn with_decision_mode(mut self, mode: DecisionMode) -> Self {
        self.decision_mode = mode;
        self
    }
}

/// Populate a world with every resource the tick schedule needs. The
/// backend is purged of vehicle and RSU points left over from prior runs
/// before it is handed to the world.
pub fn build_world(
    world: &mut World,
    mut backend: Box<dyn SpatialIndex + Send + Sync>,
    params: ScenarioParams,
) -> Result<(), ScenarioError> {
    backend.delete_class(FeatureClass::Vehicle)?;
    backend.delete_class(FeatureClass::Rsu)?;

    world.insert_resource(SimulationClock::default());
    world.insert_resource(FcdTrace::new(params.frames));
    world.insert_resource(NodeDirectory::default());
    world.insert_resource(Gis(backend));
    world.insert_resource(SimStats::default());
    world.insert_resource(GlobalGrids::default());
    world.insert_resource(SimFault::default());
    world.insert_resource(params.flags);
    world.insert_resource(DecisionConfig {
        mode: params.decision_mode,
    });
    world.insert_resource(params.debug);
    world.insert_resource(RsuDeployment {
        sites: params.rsu_sites,
        loaded: false,
        skipped: Vec::new(),
    });
    world.insert_resource(NetworkState::default());

    if let Some(t) = params.accident_time {
        world.insert_resource(AccidentTime(t));
    }
    if let Some(t) = params.stop_time {
        world.insert_resource(StopTime(t));
    }
    if let Some(t) = params.rsu_load_time {
        world.insert_resource(RsuLoadTime(t));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gis::MemoryGis;
    use std::io::Write;

    #[test]
    fn rsu_sites_load_in_file_order() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "-8.6175\t41.1635").expect("write");
        writeln!(file).expect("write");
        writeln!(file, "-8.6180\t41.1640").expect("write");

        let sites = load_rsu_sites(file.path()).expect("load");
        assert_eq!(sites, vec![(-8.6175, 41.1635), (-8.6180, 41.1640)]);
    }

    #[test]
    fn bad_rsu_row_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "-8.6175\tnorth").expect("write");
        assert!(matches!(
            load_rsu_sites(file.path()),
            Err(ScenarioError::Config { record: 0, .. })
        ));
    }

    #[test]
    fn building_rects_need_four_columns() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "-8.620\t41.163\t-8.619\t41.164").expect("write");
        let rects = load_building_rects(file.path()).expect("load");
        assert_eq!(rects, vec![(-8.620, 41.163, -8.619, 41.164)]);

        let mut short = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(short, "-8.620\t41.163").expect("write");
        assert!(matches!(
            load_building_rects(short.path()),
            Err(ScenarioError::Config { .. })
        ));
    }

    #[test]
    fn build_world_purges_stale_points() {
        let mut backend = MemoryGis::new();
        backend
            .add_point(-8.62, 41.165, 5, FeatureClass::Vehicle)
            .expect("add");
        backend
            .add_point(-8.62, 41.165, 10001, FeatureClass::Rsu)
            .expect("add");

        let mut world = World::new();
        build_world(&mut world, Box::new(backend), ScenarioParams::default()).expect("build");

        let gis = world.resource::<Gis>();
        assert!(gis
            .0
            .points_in_range(-8.62, 41.165, 1000, FeatureClass::Vehicle)
            .expect("range")
            .is_empty());
        assert!(gis
            .0
            .points_in_range(-8.62, 41.165, 1000, FeatureClass::Rsu)
            .expect("range")
            .is_empty());
    }
}
