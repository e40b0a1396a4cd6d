#![allow(non_snake_case)]

use prelude::nalgebra::{U2, U4, U6};
use prelude::*;

mod kinematic_bicycle;
pub use kinematic_bicycle::KinematicBicycle;

/// Pose and speed of the vehicle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct State {
    pub position: (float, float),
    pub heading: float,
    pub speed: float,
}

/// Physical actuator values as the model sees them.
///
/// `steering` is the effective steering input (steering angle scaled by the wheelbase constant),
/// `acceleration` the longitudinal acceleration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Actuation {
    pub steering: float,
    pub acceleration: float,
}

pub trait ControlModel {
    fn name() -> &'static str
    where
        Self: Sized;

    /// Advances the state `x = [x, y, heading, speed]` by `dt` under input `u = [steering, acceleration]`.
    fn step(&self, dt: float, x: &Vector<U4>, u: &Vector<U2>) -> Vector<U4>;

    /// Returns the jacobians of `step` with respect to its state and inputs.
    fn linearise(&self, dt: float, x0: &Vector<U4>, u0: &Vector<U2>)
        -> (Matrix<U4, U4>, Matrix<U4, U2>);

    /// Returns `sum_i w[i] * hessian(step_i)` over the stacked vector `[x; u]`.
    fn step_curvature(&self, dt: float, x0: &Vector<U4>, u0: &Vector<U2>, w: &Vector<U4>) -> Matrix<U6, U6>;

    /// Returns the mininum and maximum allowable input values.
    fn input_bounds(&self) -> (Vector<U2>, Vector<U2>);

    fn x_to_state(&self, x: &Vector<U4>) -> State {
        State {
            position: (x[0], x[1]),
            heading: x[2],
            speed: x[3],
        }
    }

    fn x_from_state(&self, state: &State) -> Vector<U4> {
        Vector::<U4>::new(state.position.0, state.position.1, state.heading, state.speed)
    }

    fn u_to_actuation(&self, u: &Vector<U2>) -> Actuation {
        Actuation {
            steering: u[0],
            acceleration: u[1],
        }
    }

    fn u_from_actuation(&self, actuation: &Actuation) -> Vector<U2> {
        Vector::<U2>::new(actuation.steering, actuation.acceleration)
    }

    fn step_state(&self, dt: float, state: &State, actuation: &Actuation) -> State {
        let x = self.step(dt, &self.x_from_state(state), &self.u_from_actuation(actuation));
        self.x_to_state(&x)
    }
}
