//! Simulation runner: advances the frame clock and drives the tick schedule.
//!
//! Each step pops the next FCD frame, advances the clock (enforcing strict
//! monotonicity), inserts the frame as [`CurrentFrame`], and runs the
//! schedule. Faults recorded by systems surface here as the step's error.

use bevy_ecs::prelude::{Schedule, World};
use bevy_ecs::schedule::{apply_deferred, IntoSystemConfigs};

use crate::clock::SimulationClock;
use crate::error::{SimError, SimFault};
use crate::fcd::{CurrentFrame, FcdFrame, FcdTrace};
use crate::scenario::params::StopTime;
use crate::systems::coverage::{coverage_system, rsu_enabled};
use crate::systems::global_map::global_map_system;
use crate::systems::gossip::{gossip_system, map_spread_enabled};
use crate::systems::network::{network_enabled, network_system};
use crate::systems::reconcile::reconcile_system;
use crate::systems::rsu_load::{rsu_load_system, should_load_rsus};

/// The per-tick system chain. Order is the simulation's total ordering:
/// deployment, ingest, coverage, gossip, network, global maps.
/// [`apply_deferred`] sits after the spawning systems so entities created
/// this tick are visible to the rest of the chain.
pub fn tick_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            rsu_load_system.run_if(should_load_rsus),
            reconcile_system,
            apply_deferred,
            coverage_system.run_if(rsu_enabled),
            gossip_system.run_if(map_spread_enabled),
            network_system.run_if(network_enabled),
            global_map_system,
        )
            .chain(),
    );
    schedule
}

/// Run one frame and invoke `hook` after the schedule completes. Returns
/// `Ok(false)` when the trace is exhausted or the next frame lies past the
/// configured [`StopTime`].
pub fn run_next_frame_with_hook<F>(
    world: &mut World,
    schedule: &mut Schedule,
    mut hook: F,
) -> Result<bool, SimError>
where
    F: FnMut(&World, &FcdFrame),
{
    let stop_at = world.get_resource::<StopTime>().map(|s| s.0);
    let next_time = world
        .get_resource::<FcdTrace>()
        .and_then(|trace| trace.peek_time());
    let Some(next_time) = next_time else {
        return Ok(false);
    };
    if let Some(stop) = stop_at {
        if next_time > stop {
            return Ok(false);
        }
    }

    let Some(frame) = world.resource_mut::<FcdTrace>().next_frame() else {
        return Ok(false);
    };
    world.resource_mut::<SimulationClock>().advance_to(frame.time)?;
    world.insert_resource(CurrentFrame(frame.clone()));

    schedule.run(world);

    if let Some(error) = world.resource_mut::<SimFault>().take() {
        return Err(error);
    }
    hook(world, &frame);
    Ok(true)
}

/// Run one frame. See [`run_next_frame_with_hook`].
pub fn run_next_frame(world: &mut World, schedule: &mut Schedule) -> Result<bool, SimError> {
    run_next_frame_with_hook(world, schedule, |_, _| {})
}

/// Run frames until the trace ends or the stop time is reached. Returns the
/// number of frames processed.
pub fn run_to_completion(world: &mut World, schedule: &mut Schedule) -> Result<u64, SimError> {
    run_to_completion_with_hook(world, schedule, |_, _| {})
}

/// Run to completion, invoking `hook` after every frame.
pub fn run_to_completion_with_hook<F>(
    world: &mut World,
    schedule: &mut Schedule,
    mut hook: F,
) -> Result<u64, SimError>
where
    F: FnMut(&World, &FcdFrame),
{
    let mut frames = 0;
    while run_next_frame_with_hook(world, schedule, &mut hook)? {
        frames += 1;
    }
    Ok(frames)
}
