#![allow(non_snake_case)]

#[macro_use]
extern crate log;

use prelude::*;
use thiserror::Error;

mod command;
pub use command::ActuatorCommand;

mod control_loop;
pub use control_loop::{ControlLoop, Telemetry, TickOutput};

mod frame;
pub use frame::Frame;

pub mod latency;

mod mpc;
pub use mpc::{MpcController, Plan, PlanOutcome};

pub mod mpc_horizon;
pub use mpc_horizon::HorizonProblem;

mod polynomial;
pub use polynomial::{FitError, Polynomial};

mod tracking_error;
pub use tracking_error::TrackingError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed telemetry: {0}")]
    MalformedTelemetry(String),

    #[error("unable to fit reference path: {0}")]
    Fit(#[from] FitError),

    #[error(transparent)]
    Config(#[from] config::LoadError),
}

impl Error {
    /// Whether the control session has to stop. Malformed telemetry only skips a tick.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::MalformedTelemetry(_))
    }
}

/// Optimiser state expressed in the vehicle frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VehicleState {
    pub x: float,
    pub y: float,
    pub psi: float,
    pub v: float,
    pub cte: float,
    pub epsi: float,
}

impl VehicleState {
    /// The vehicle at the origin of its own frame.
    pub fn at_origin(speed: float, error: TrackingError) -> VehicleState {
        VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: speed,
            cte: error.cte,
            epsi: error.epsi,
        }
    }

    pub fn as_array(&self) -> [float; 6] {
        [self.x, self.y, self.psi, self.v, self.cte, self.epsi]
    }
}
