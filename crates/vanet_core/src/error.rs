//! Run-level error taxonomy.
//!
//! Systems cannot return errors through the ECS schedule, so fallible
//! systems record the first failure into the [`SimFault`] resource; the
//! runner checks it after every frame and aborts the run with the recorded
//! error.

use bevy_ecs::prelude::Resource;
use thiserror::Error;

use crate::cells::GridError;
use crate::clock::ClockError;
use crate::fcd::FcdError;
use crate::gis::GisError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Gis(#[from] GisError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Clock(#[from] ClockError),
    #[error(transparent)]
    Fcd(#[from] FcdError),
}

/// First fatal error raised inside the tick schedule, if any.
#[derive(Debug, Default, Resource)]
pub struct SimFault(Option<SimError>);

impl SimFault {
    /// Record an error; later errors in the same frame are dropped (the
    /// first failure is the one worth reporting).
    pub fn record(&mut self, error: impl Into<SimError>) {
        if self.0.is_none() {
            self.0 = Some(error.into());
        }
    }

    pub fn take(&mut self) -> Option<SimError> {
        self.0.take()
    }

    pub fn is_clear(&self) -> bool {
        self.0.is_none()
    }
}
