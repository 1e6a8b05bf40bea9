//! Simulation time: a frame-driven clock over the FCD timeline.
//!
//! Time is the floating-point timestamp carried by each FCD frame. The clock
//! only ever moves forward; a frame that does not strictly advance it is a
//! corrupt trace and aborts the run.

use bevy_ecs::prelude::Resource;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ClockError {
    #[error("FCD frame at t={next} does not advance the clock past t={now}")]
    NonMonotonicFrame { now: f64, next: f64 },
}

/// Frame clock. `now()` is the timestamp of the frame being processed;
/// `tick()` counts processed frames.
#[derive(Debug, Clone, Copy, Resource)]
pub struct SimulationClock {
    now: f64,
    tick: u64,
    started: bool,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self {
            now: 0.0,
            tick: 0,
            started: false,
        }
    }
}

impl SimulationClock {
    /// Current simulation time (seconds, from the FCD trace).
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Number of frames processed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advance to the next frame's timestamp. Fails unless time strictly
    /// increases (the first frame may carry any timestamp).
    pub fn advance_to(&mut self, next: f64) -> Result<(), ClockError> {
        if self.started && next <= self.now {
            return Err(ClockError::NonMonotonicFrame {
                now: self.now,
                next,
            });
        }
        self.now = next;
        self.tick += 1;
        self.started = true;
        Ok(())
    }
}
