// Kinematic bicycle model integrated with a single explicit Euler step.
//
// Positive steering turns the vehicle clockwise, matching the simulator the controller drives.

use prelude::nalgebra::{Matrix4, Matrix4x2, Matrix6, Vector2, Vector4, U2, U4, U6};
use prelude::*;

use crate::ControlModel;

#[derive(Clone, Copy, Debug)]
pub struct KinematicBicycle {
    /// Distance from the front axle to the centre of gravity.
    pub lf: float,
    /// Largest effective steering input, `max_steering_angle * lf`.
    pub max_steering: float,
    pub max_acceleration: float,
}

impl KinematicBicycle {
    pub fn new(lf: float, max_steering_angle: float, max_acceleration: float) -> KinematicBicycle {
        assert!(lf > 0.0);
        KinematicBicycle {
            lf,
            max_steering: max_steering_angle * lf,
            max_acceleration,
        }
    }

    /// Heading rate for the given speed and effective steering input.
    pub fn yaw_rate(&self, v: float, steering: float) -> float {
        -v * steering / self.lf
    }
}

impl ControlModel for KinematicBicycle {
    fn name() -> &'static str {
        "kinematic_bicycle"
    }

    fn step(&self, dt: float, x: &Vector<U4>, u: &Vector<U2>) -> Vector<U4> {
        let [psi, v, delta, a] = unpack(x, u);
        let (sin_psi, cos_psi) = psi.sin_cos();

        Vector4::new(
            x[0] + v * cos_psi * dt,
            x[1] + v * sin_psi * dt,
            psi + self.yaw_rate(v, delta) * dt,
            v + a * dt,
        )
    }

    fn linearise(
        &self,
        dt: float,
        x0: &Vector<U4>,
        u0: &Vector<U2>,
    ) -> (Matrix<U4, U4>, Matrix<U4, U2>) {
        let [psi, v, delta, _a] = unpack(x0, u0);
        let (sin_psi, cos_psi) = psi.sin_cos();
        let lf = self.lf;

        #[rustfmt::skip]
        let A = Matrix4::new(
            1.0, 0.0, -v * sin_psi * dt, cos_psi * dt,
            0.0, 1.0, v * cos_psi * dt, sin_psi * dt,
            0.0, 0.0, 1.0, -delta / lf * dt,
            0.0, 0.0, 0.0, 1.0,
        );

        #[rustfmt::skip]
        let B = Matrix4x2::new(
            0.0, 0.0,
            0.0, 0.0,
            -v / lf * dt, 0.0,
            0.0, dt,
        );

        (A, B)
    }

    fn step_curvature(&self, dt: float, x0: &Vector<U4>, u0: &Vector<U2>, w: &Vector<U4>) -> Matrix<U6, U6> {
        let [psi, v, _delta, _a] = unpack(x0, u0);
        let (sin_psi, cos_psi) = psi.sin_cos();

        // Only x and y curve in heading and speed, heading in speed and steering.
        let psi_psi = -(w[0] * cos_psi + w[1] * sin_psi) * v * dt;
        let psi_v = (-w[0] * sin_psi + w[1] * cos_psi) * dt;
        let v_delta = -w[2] / self.lf * dt;

        let mut H = Matrix6::zeros();
        H[(2, 2)] = psi_psi;
        H[(2, 3)] = psi_v;
        H[(3, 2)] = psi_v;
        H[(3, 4)] = v_delta;
        H[(4, 3)] = v_delta;
        H
    }

    fn input_bounds(&self) -> (Vector<U2>, Vector<U2>) {
        let min = Vector2::new(-self.max_steering, -self.max_acceleration);
        let max = Vector2::new(self.max_steering, self.max_acceleration);
        (min, max)
    }
}

#[inline(always)]
fn unpack(x: &Vector<U4>, u: &Vector<U2>) -> [float; 4] {
    // [psi, v, delta, a]
    [x[2], x[3], u[0], u[1]]
}
