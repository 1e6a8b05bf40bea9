//! Simulator command line.
//!
//! Loads the FCD trace, building footprints, and RSU sites, builds the
//! simulation world, runs it to completion, and prints whatever maps and
//! statistics the flags ask for. Exit code 1 covers usage errors,
//! unreadable inputs, and RSU sites rejected as obstructed (the run itself
//! continues without those sites).

mod render;

use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

use bevy_ecs::prelude::World;
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vanet_core::decision::DecisionMode;
use vanet_core::ecs::{NodeDirectory, RoadNode, Rsu};
use vanet_core::fcd::load_fcd_file;
use vanet_core::gis::MemoryGis;
use vanet_core::runner::{run_to_completion_with_hook, tick_schedule};
use vanet_core::scenario::{
    build_world, load_building_rects, load_rsu_sites, DebugOptions, RsuDeployment, RunFlags,
    ScenarioParams,
};
use vanet_core::stats::{
    coverage_statistics, enumerate_combinations, evaluate_combination, overcoverage_metric,
    SimStats, DEFAULT_OVERCOVERAGE_CAP,
};
use vanet_core::systems::global_map::GlobalGrids;

#[derive(Parser)]
#[command(
    name = "vanet-sim",
    about = "Urban VANET coverage and dissemination simulator",
    long_about = "Replays a SUMO floating-car-data trace against a building map,\n\
                  maintains per-RSU coverage grids, disseminates an emergency\n\
                  packet with UVCAST, and decides which RSUs stay active."
)]
struct Cli {
    /// FCD trace (SUMO fcd-export XML with geographic coordinates)
    #[arg(long, value_name = "PATH")]
    fcd_data: PathBuf,

    /// RSU sites, tab-separated xgeo/ygeo lines
    #[arg(long, value_name = "PATH")]
    rsu_data: Option<PathBuf>,

    /// Building footprints, tab-separated rectangles (xmin ymin xmax ymax)
    #[arg(long, value_name = "PATH")]
    building_data: Option<PathBuf>,

    /// Enable UVCAST dissemination and accident injection
    #[arg(long)]
    enable_network: bool,

    /// Load and simulate RSUs
    #[arg(long)]
    enable_rsu: bool,

    /// Activation classifier: 1 = utility, 2 = exclusive-coverage ratio
    #[arg(long, value_name = "MODE", default_value_t = 2)]
    decision_mode: u8,

    /// Disable coverage-map gossip and activation decisions
    #[arg(long)]
    disable_map_spread: bool,

    /// Enumerate RSU subsets at the end of the run
    #[arg(long)]
    bruteforce: bool,

    /// Simulation time at which the emergency packet is injected
    #[arg(long, value_name = "T")]
    accident_time: Option<f64>,

    /// Halt once the next frame would pass this simulation time
    #[arg(long, value_name = "T")]
    stop_time: Option<f64>,

    /// Simulation time at which the RSU deployment is placed
    #[arg(long, value_name = "T")]
    rsu_load_time: Option<f64>,

    /// Render ASCII vehicle positions each tick
    #[arg(long)]
    print_vehicle_map: bool,

    /// Render ASCII signal levels each tick
    #[arg(long)]
    print_signal_map: bool,

    /// Print per-tick coverage statistics
    #[arg(long)]
    print_statistics: bool,

    /// Print final coverage and propagation statistics (JSON)
    #[arg(long)]
    print_end_statistics: bool,

    /// Print each RSU's map-completion time at the end
    #[arg(long)]
    print_map_time: bool,

    /// Print stats for one RSU subset bitmask at the end
    #[arg(long, value_name = "MASK")]
    print_combination: Option<u32>,

    /// Wall-clock sleep per tick, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pause: u64,

    /// Diagnostic verbosity (0 = info, 1 = debug, 2+ = trace)
    #[arg(long, value_name = "N", default_value_t = 0)]
    debug: u8,

    /// Log vehicle creation and movement
    #[arg(long)]
    debug_locations: bool,

    /// Dump every RSU coverage map each tick
    #[arg(long)]
    debug_cell_maps: bool,

    /// Log coverage-map broadcasts
    #[arg(long)]
    debug_map_broadcast: bool,

    /// Dump one RSU's coverage map whenever it grows
    #[arg(long, value_name = "ID")]
    debug_rsu_map: Option<u16>,
}

#[derive(Serialize)]
struct PropagationPoint {
    time: f64,
    delivered: u32,
}

#[derive(Serialize)]
struct EndReport {
    frames: u64,
    rsus: usize,
    coverage_levels: [u64; 6],
    covered_cells: u64,
    overcoverage: i64,
    deliveries_total: u64,
    propagation: Vec<PropagationPoint>,
}

fn init_logging(debug_level: u8) {
    let default = match debug_level {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::try_parse().unwrap_or_else(|error| {
        let _ = error.print();
        exit(1);
    });
    init_logging(cli.debug);

    match run(cli) {
        Ok(code) => exit(code),
        Err(error) => {
            eprintln!("error: {error}");
            exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let mode = DecisionMode::from_mode(cli.decision_mode)
        .ok_or("decision-mode must be 1 (utility) or 2 (exclusive ratio)")?;

    let frames = load_fcd_file(&cli.fcd_data)?;
    info!(frames = frames.len(), "FCD trace loaded");

    let mut gis = MemoryGis::new();
    if let Some(path) = &cli.building_data {
        for (xmin, ymin, xmax, ymax) in load_building_rects(path)? {
            gis.add_building_rect(xmin, ymin, xmax, ymax);
        }
        info!(buildings = gis.building_count(), "building map loaded");
    }

    let rsu_sites = match &cli.rsu_data {
        Some(path) => load_rsu_sites(path)?,
        None => Vec::new(),
    };
    if cli.enable_rsu && rsu_sites.is_empty() {
        return Err("--enable-rsu needs --rsu-data with at least one site".into());
    }

    let params = ScenarioParams {
        frames,
        rsu_sites,
        flags: RunFlags {
            network_enabled: cli.enable_network,
            rsu_enabled: cli.enable_rsu,
            map_spread_enabled: !cli.disable_map_spread,
        },
        decision_mode: mode,
        accident_time: cli.accident_time,
        stop_time: cli.stop_time,
        rsu_load_time: cli.rsu_load_time,
        debug: DebugOptions {
            level: cli.debug,
            locations: cli.debug_locations,
            cell_maps: cli.debug_cell_maps,
            map_broadcast: cli.debug_map_broadcast,
            rsu_map: cli.debug_rsu_map,
        },
    };

    let mut world = World::new();
    build_world(&mut world, Box::new(gis), params)?;
    let mut schedule = tick_schedule();

    let pause = Duration::from_millis(cli.pause);
    let frames_run = run_to_completion_with_hook(&mut world, &mut schedule, |world, frame| {
        if cli.print_vehicle_map {
            println!("t={} vehicles", frame.time);
            print!("{}", render::vehicle_map(world));
        }
        if cli.print_signal_map {
            println!("t={} signal", frame.time);
            print!("{}", render::signal_map(world));
        }
        if cli.debug_cell_maps {
            print!("{}", render::coverage_maps(world));
        }
        if cli.print_statistics {
            let grids = world.resource::<GlobalGrids>();
            let levels = coverage_statistics(&grids.signal);
            let overcoverage = overcoverage_metric(&grids.counts, DEFAULT_OVERCOVERAGE_CAP);
            let covered: u64 = levels[1..].iter().sum();
            println!(
                "t={} covered={covered} levels={levels:?} overcoverage={overcoverage}",
                frame.time
            );
        }
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
    })?;
    info!(frames = frames_run, "run complete");

    if cli.print_map_time {
        print_map_times(&world);
    }
    if let Some(mask) = cli.print_combination {
        print_combination(&world, mask)?;
    }
    if cli.bruteforce {
        print_bruteforce(&world)?;
    }
    if cli.print_end_statistics {
        print_end_statistics(&world, frames_run)?;
    }

    let skipped = &world.resource::<RsuDeployment>().skipped;
    if !skipped.is_empty() {
        eprintln!("error: {} RSU site(s) were inside buildings: {skipped:?}", skipped.len());
        return Ok(1);
    }
    Ok(0)
}

fn rsu_coverage_maps(world: &World) -> Vec<(u16, vanet_core::cells::CoverageMap)> {
    let directory = world.resource::<NodeDirectory>();
    directory
        .rsu_entities()
        .filter_map(|(id, entity)| world.get::<Rsu>(entity).map(|rsu| (id, rsu.coverage)))
        .collect()
}

fn print_map_times(world: &World) {
    let directory = world.resource::<NodeDirectory>();
    println!("rsu\tactive\tcovered\tlast_update");
    for (id, entity) in directory.rsu_entities() {
        let (Some(node), Some(rsu)) = (world.get::<RoadNode>(entity), world.get::<Rsu>(entity))
        else {
            continue;
        };
        println!(
            "{id}\t{}\t{}\t{}",
            node.active, rsu.covered_cell_count, rsu.last_time_updated
        );
    }
}

fn print_combination(world: &World, mask: u32) -> Result<(), Box<dyn std::error::Error>> {
    let maps: Vec<_> = rsu_coverage_maps(world)
        .into_iter()
        .map(|(_, map)| map)
        .collect();
    if maps.len() > 32 {
        return Err("combination stats are limited to 32 RSUs".into());
    }
    let result = evaluate_combination(&maps, mask, DEFAULT_OVERCOVERAGE_CAP)?;
    serde_json::to_writer_pretty(std::io::stdout(), &result)?;
    println!();
    Ok(())
}

fn print_bruteforce(world: &World) -> Result<(), Box<dyn std::error::Error>> {
    let maps: Vec<_> = rsu_coverage_maps(world)
        .into_iter()
        .map(|(_, map)| map)
        .collect();
    if maps.len() > 32 {
        return Err("subset enumeration is limited to 32 RSUs".into());
    }
    let kept = enumerate_combinations(&maps, DEFAULT_OVERCOVERAGE_CAP)?;
    serde_json::to_writer_pretty(std::io::stdout(), &kept)?;
    println!();
    Ok(())
}

fn print_end_statistics(world: &World, frames: u64) -> Result<(), Box<dyn std::error::Error>> {
    let grids = world.resource::<GlobalGrids>();
    let stats = world.resource::<SimStats>();
    let levels = coverage_statistics(&grids.signal);
    let report = EndReport {
        frames,
        rsus: world.resource::<NodeDirectory>().rsu_count(),
        coverage_levels: levels,
        covered_cells: levels[1..].iter().sum(),
        overcoverage: overcoverage_metric(&grids.counts, DEFAULT_OVERCOVERAGE_CAP),
        deliveries_total: stats.deliveries_total(),
        propagation: stats
            .propagation()
            .iter()
            .map(|&(time, delivered)| PropagationPoint { time, delivered })
            .collect(),
    };
    serde_json::to_writer_pretty(std::io::stdout(), &report)?;
    println!();
    Ok(())
}
