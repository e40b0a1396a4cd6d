// Finite horizon tracking problem.
//
// Decision vector, grouped by quantity:
//
//   [x_0..x_N-1, y_.., psi_.., v_.., cte_.., epsi_.., steering_0..steering_N-2, acceleration_..]
//
// Constraint rows reuse the numbering of the state variables. Row `k * N` pins quantity `k` to the
// initial state, row `k * N + t` for `t > 0` is the dynamics residual of that quantity between
// steps `t - 1` and `t`.

use control_model::{Actuation, ControlModel};
use nlp::Problem;
use prelude::nalgebra::{Vector2, Vector4, U2, U4};
use prelude::*;

use config::{Horizon, Weights};

use crate::{Polynomial, VehicleState};

pub const NS: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Layout {
    pub N: usize,
}

impl Layout {
    pub fn new(N: usize) -> Layout {
        assert!(N >= 2, "horizon needs at least two states");
        Layout { N }
    }

    pub fn x(&self, t: usize) -> usize {
        t
    }

    pub fn y(&self, t: usize) -> usize {
        self.N + t
    }

    pub fn psi(&self, t: usize) -> usize {
        2 * self.N + t
    }

    pub fn v(&self, t: usize) -> usize {
        3 * self.N + t
    }

    pub fn cte(&self, t: usize) -> usize {
        4 * self.N + t
    }

    pub fn epsi(&self, t: usize) -> usize {
        5 * self.N + t
    }

    pub fn steering(&self, t: usize) -> usize {
        NS * self.N + t
    }

    pub fn acceleration(&self, t: usize) -> usize {
        NS * self.N + (self.N - 1) + t
    }

    pub fn num_variables(&self) -> usize {
        NS * self.N + 2 * (self.N - 1)
    }

    pub fn num_constraints(&self) -> usize {
        NS * self.N
    }

    fn model_state(&self, z: &DVector<float>, t: usize) -> Vector<U4> {
        Vector4::new(z[self.x(t)], z[self.y(t)], z[self.psi(t)], z[self.v(t)])
    }

    fn model_input(&self, z: &DVector<float>, t: usize) -> Vector<U2> {
        Vector2::new(z[self.steering(t)], z[self.acceleration(t)])
    }
}

pub struct HorizonProblem<'a, M: ControlModel> {
    model: &'a M,
    reference: &'a Polynomial,
    layout: Layout,
    dt: float,
    initial: [float; NS],
    u_min: Vector<U2>,
    u_max: Vector<U2>,
    // Objective sum_i w_i * (R_i z - r0_i)^2
    R: DMatrix<float>,
    r0: DVector<float>,
    w: DVector<float>,
    H: DMatrix<float>,
}

impl<'a, M: ControlModel> HorizonProblem<'a, M> {
    pub fn new(
        model: &'a M,
        reference: &'a Polynomial,
        initial: &VehicleState,
        horizon: &Horizon,
        weights: &Weights,
    ) -> HorizonProblem<'a, M> {
        let layout = Layout::new(horizon.N);
        let N = layout.N;
        let n = layout.num_variables();
        let (u_min, u_max) = model.input_bounds();

        // (weight, [(column, coefficient)], offset)
        let mut terms: Vec<(float, Vec<(usize, float)>, float)> = Vec::new();
        for t in 0..N {
            terms.push((weights.cte, vec![(layout.cte(t), 1.0)], 0.0));
            terms.push((weights.epsi, vec![(layout.epsi(t), 1.0)], 0.0));
            terms.push((weights.speed, vec![(layout.v(t), 1.0)], horizon.reference_speed));
        }
        for t in 0..N - 1 {
            terms.push((weights.steering, vec![(layout.steering(t), 1.0)], 0.0));
            terms.push((weights.acceleration, vec![(layout.acceleration(t), 1.0)], 0.0));
        }
        for t in 0..N.saturating_sub(2) {
            terms.push((
                weights.steering_rate,
                vec![(layout.steering(t + 1), 1.0), (layout.steering(t), -1.0)],
                0.0,
            ));
            terms.push((
                weights.acceleration_rate,
                vec![(layout.acceleration(t + 1), 1.0), (layout.acceleration(t), -1.0)],
                0.0,
            ));
        }

        let mut R = DMatrix::zeros(terms.len(), n);
        let mut r0 = DVector::zeros(terms.len());
        let mut w = DVector::zeros(terms.len());
        for (i, (weight, entries, offset)) in terms.into_iter().enumerate() {
            for (c, v) in entries {
                R[(i, c)] = v;
            }
            r0[i] = offset;
            w[i] = weight;
        }

        let mut WR = R.clone();
        for (i, mut row) in WR.row_iter_mut().enumerate() {
            row *= w[i];
        }
        let H = R.tr_mul(&WR) * 2.0;

        HorizonProblem {
            model,
            reference,
            layout,
            dt: horizon.dt,
            initial: initial.as_array(),
            u_min,
            u_max,
            R,
            r0,
            w,
            H,
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    fn clamp_input(&self, u: &Vector<U2>) -> Vector<U2> {
        Vector2::new(
            clamp(u[0], self.u_min[0], self.u_max[0]),
            clamp(u[1], self.u_min[1], self.u_max[1]),
        )
    }

    /// A decision vector that satisfies every constraint, holding `actuation` over the horizon.
    pub fn rollout(&self, actuation: &Actuation) -> DVector<float> {
        let l = self.layout;
        let u = self.clamp_input(&self.model.u_from_actuation(actuation));
        let mut z = DVector::zeros(l.num_variables());

        for k in 0..NS {
            z[k * l.N] = self.initial[k];
        }
        for t in 1..l.N {
            let p = t - 1;
            z[l.steering(p)] = u[0];
            z[l.acceleration(p)] = u[1];

            let (next, cte, epsi) = self.propagate(&z, p);
            z[l.x(t)] = next[0];
            z[l.y(t)] = next[1];
            z[l.psi(t)] = next[2];
            z[l.v(t)] = next[3];
            z[l.cte(t)] = cte;
            z[l.epsi(t)] = epsi;
        }
        z
    }

    /// Predicted vehicle state, cross track error and heading error at step `p + 1`.
    fn propagate(&self, z: &DVector<float>, p: usize) -> (Vector<U4>, float, float) {
        let l = self.layout;
        let x = l.model_state(z, p);
        let u = l.model_input(z, p);
        let next = self.model.step(self.dt, &x, &u);

        let f = self.reference.evaluate(x[0]);
        let psi_des = self.reference.derivative(x[0]).atan();
        let cte = (f - x[1]) + x[3] * z[l.epsi(p)].sin() * self.dt;
        let epsi = next[2] - psi_des;

        (next, cte, epsi)
    }

    /// Planned `(x, y)` positions for every step of the horizon.
    pub fn positions(&self, z: &DVector<float>) -> Vec<(float, float)> {
        let l = self.layout;
        (0..l.N).map(|t| (z[l.x(t)], z[l.y(t)])).collect()
    }

    /// First actuation of the plan.
    pub fn first_actuation(&self, z: &DVector<float>) -> Actuation {
        let l = self.layout;
        self.model.u_to_actuation(&l.model_input(z, 0))
    }
}

impl<'a, M: ControlModel> Problem for HorizonProblem<'a, M> {
    fn num_variables(&self) -> usize {
        self.layout.num_variables()
    }

    fn num_constraints(&self) -> usize {
        self.layout.num_constraints()
    }

    fn variable_bounds(&self) -> (DVector<float>, DVector<float>) {
        let l = self.layout;
        let n = l.num_variables();
        let mut lower = DVector::from_element(n, NEG_INFINITY);
        let mut upper = DVector::from_element(n, INFINITY);
        for t in 0..l.N - 1 {
            lower[l.steering(t)] = self.u_min[0];
            upper[l.steering(t)] = self.u_max[0];
            lower[l.acceleration(t)] = self.u_min[1];
            upper[l.acceleration(t)] = self.u_max[1];
        }
        (lower, upper)
    }

    fn constraint_bounds(&self) -> (DVector<float>, DVector<float>) {
        let l = self.layout;
        let mut bounds = DVector::zeros(l.num_constraints());
        for k in 0..NS {
            bounds[k * l.N] = self.initial[k];
        }
        (bounds.clone(), bounds)
    }

    fn objective(&self, z: &DVector<float>) -> float {
        let e = &self.R * z - &self.r0;
        e.dot(&e.component_mul(&self.w))
    }

    fn gradient(&self, z: &DVector<float>) -> DVector<float> {
        let e = &self.R * z - &self.r0;
        self.R.tr_mul(&e.component_mul(&self.w)) * 2.0
    }

    fn hessian(&self, z: &DVector<float>, y: &DVector<float>) -> DMatrix<float> {
        let l = self.layout;
        let mut H = self.H.clone();

        for t in 1..l.N {
            let p = t - 1;
            let x = l.model_state(z, p);
            let u = l.model_input(z, p);
            let cols = [
                l.x(p),
                l.y(p),
                l.psi(p),
                l.v(p),
                l.steering(p),
                l.acceleration(p),
            ];

            // Residuals are `z_t - prediction`, so the prediction curvature enters negated. The
            // heading error row carries the model heading too.
            let w = Vector4::new(y[l.x(t)], y[l.y(t)], y[l.psi(t)] + y[l.epsi(t)], y[l.v(t)]);
            let C = self.model.step_curvature(self.dt, &x, &u, &w);
            for (i, &r) in cols.iter().enumerate() {
                for (j, &c) in cols.iter().enumerate() {
                    H[(r, c)] -= C[(i, j)];
                }
            }

            let slope = self.reference.derivative(x[0]);
            let curvature = self.reference.second_derivative(x[0]);
            let jerk = self.reference.third_derivative(x[0]);
            let q = 1.0 + slope * slope;
            let tangent_curvature = (jerk * q - 2.0 * slope * curvature * curvature) / (q * q);
            let (sin_epsi, cos_epsi) = z[l.epsi(p)].sin_cos();

            let y_cte = y[l.cte(t)];
            H[(l.x(p), l.x(p))] += y[l.epsi(t)] * tangent_curvature - y_cte * curvature;
            H[(l.v(p), l.epsi(p))] -= y_cte * cos_epsi * self.dt;
            H[(l.epsi(p), l.v(p))] -= y_cte * cos_epsi * self.dt;
            H[(l.epsi(p), l.epsi(p))] += y_cte * x[3] * sin_epsi * self.dt;
        }
        H
    }

    fn constraints(&self, z: &DVector<float>) -> DVector<float> {
        let l = self.layout;
        let mut g = DVector::zeros(l.num_constraints());

        for k in 0..NS {
            g[k * l.N] = z[k * l.N];
        }
        for t in 1..l.N {
            let (next, cte, epsi) = self.propagate(z, t - 1);
            g[l.x(t)] = z[l.x(t)] - next[0];
            g[l.y(t)] = z[l.y(t)] - next[1];
            g[l.psi(t)] = z[l.psi(t)] - next[2];
            g[l.v(t)] = z[l.v(t)] - next[3];
            g[l.cte(t)] = z[l.cte(t)] - cte;
            g[l.epsi(t)] = z[l.epsi(t)] - epsi;
        }
        g
    }

    fn jacobian(&self, z: &DVector<float>) -> DMatrix<float> {
        let l = self.layout;
        let mut J = DMatrix::zeros(l.num_constraints(), l.num_variables());

        for k in 0..NS {
            J[(k * l.N, k * l.N)] = 1.0;
        }
        for t in 1..l.N {
            let p = t - 1;
            let x = l.model_state(z, p);
            let u = l.model_input(z, p);
            let (A, B) = self.model.linearise(self.dt, &x, &u);

            let rows = [l.x(t), l.y(t), l.psi(t), l.v(t)];
            let state_cols = [l.x(p), l.y(p), l.psi(p), l.v(p)];
            let input_cols = [l.steering(p), l.acceleration(p)];

            for (i, &r) in rows.iter().enumerate() {
                J[(r, r)] = 1.0;
                for (j, &c) in state_cols.iter().enumerate() {
                    J[(r, c)] -= A[(i, j)];
                }
                for (j, &c) in input_cols.iter().enumerate() {
                    J[(r, c)] -= B[(i, j)];
                }
            }

            let slope = self.reference.derivative(x[0]);
            let curvature = self.reference.second_derivative(x[0]);
            let (sin_epsi, cos_epsi) = z[l.epsi(p)].sin_cos();

            let r = l.cte(t);
            J[(r, r)] = 1.0;
            J[(r, l.x(p))] = -slope;
            J[(r, l.y(p))] = 1.0;
            J[(r, l.v(p))] = -sin_epsi * self.dt;
            J[(r, l.epsi(p))] = -x[3] * cos_epsi * self.dt;

            // epsi is the model's next heading less the tangent angle at x_p
            let r = l.epsi(t);
            J[(r, r)] = 1.0;
            for (j, &c) in state_cols.iter().enumerate() {
                J[(r, c)] -= A[(2, j)];
            }
            for (j, &c) in input_cols.iter().enumerate() {
                J[(r, c)] -= B[(2, j)];
            }
            J[(r, l.x(p))] += curvature / (1.0 + slope * slope);
        }
        J
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use control_model::KinematicBicycle;

    fn model() -> KinematicBicycle {
        KinematicBicycle::new(2.67, 25.0_f64.to_radians(), 1.0)
    }

    fn horizon(N: usize) -> Horizon {
        Horizon {
            N,
            dt: 0.1,
            reference_speed: 20.0,
            polynomial_degree: 3,
        }
    }

    fn initial() -> VehicleState {
        VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: 15.0,
            cte: 0.8,
            epsi: -0.1,
        }
    }

    #[test]
    fn layout_is_contiguous() {
        let l = Layout::new(5);
        assert_eq!(l.num_variables(), 38);
        assert_eq!(l.epsi(4) + 1, l.steering(0));
        assert_eq!(l.steering(3) + 1, l.acceleration(0));
        assert_eq!(l.acceleration(3) + 1, l.num_variables());
    }

    #[test]
    fn rollout_is_feasible() {
        let model = model();
        let reference = Polynomial::new(vec![0.8, 0.1, -0.01, 0.0005]);
        let problem = HorizonProblem::new(&model, &reference, &initial(), &horizon(8), &Weights::default());
        let actuation = Actuation {
            steering: 0.3,
            acceleration: 0.5,
        };

        let z = problem.rollout(&actuation);
        let g = problem.constraints(&z);
        let (lower, upper) = problem.constraint_bounds();

        assert!(nlp::constraint_violation(&g, &lower, &upper) < 1e-9);
        assert_eq!(z[problem.layout().v(0)], 15.0);
        assert_eq!(z[problem.layout().steering(6)], 0.3);
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let model = model();
        let reference = Polynomial::new(vec![0.8, 0.1, -0.01, 0.0005]);
        let problem = HorizonProblem::new(&model, &reference, &initial(), &horizon(4), &Weights::default());

        let mut z = problem.rollout(&Actuation {
            steering: -0.2,
            acceleration: 0.4,
        });
        // Move off the feasible manifold so every term is exercised.
        for i in 0..z.len() {
            z[i] += 0.01 * ((i * 7 % 5) as float - 2.0);
        }

        let J = problem.jacobian(&z);
        let h = 1e-6;
        for c in 0..z.len() {
            let mut zp = z.clone();
            let mut zm = z.clone();
            zp[c] += h;
            zm[c] -= h;
            let column = (problem.constraints(&zp) - problem.constraints(&zm)) / (2.0 * h);
            for r in 0..column.len() {
                assert!(
                    (J[(r, c)] - column[r]).abs() < 1e-5,
                    "J[{}, {}] = {} expected {}",
                    r,
                    c,
                    J[(r, c)],
                    column[r]
                );
            }
        }
    }

    #[test]
    fn hessian_matches_finite_differences() {
        let model = model();
        let reference = Polynomial::new(vec![0.8, 0.1, -0.01, 0.0005]);
        let problem = HorizonProblem::new(&model, &reference, &initial(), &horizon(4), &Weights::default());

        let mut z = problem.rollout(&Actuation {
            steering: 0.3,
            acceleration: 0.2,
        });
        for i in 0..z.len() {
            z[i] += 0.02 * ((i * 3 % 7) as float - 3.0);
        }
        let y = DVector::from_fn(problem.num_constraints(), |i, _| ((i * 5 % 11) as float - 5.0) * 0.3);

        // Gradient of the Lagrangian f + y' g.
        let lagrangian_gradient =
            |z: &DVector<float>| problem.gradient(z) + problem.jacobian(z).tr_mul(&y);

        let H = problem.hessian(&z, &y);
        let h = 1e-6;
        for c in 0..z.len() {
            let mut zp = z.clone();
            let mut zm = z.clone();
            zp[c] += h;
            zm[c] -= h;
            let column = (lagrangian_gradient(&zp) - lagrangian_gradient(&zm)) / (2.0 * h);
            for r in 0..column.len() {
                assert!(
                    (H[(r, c)] - column[r]).abs() < 1e-4 * (1.0 + column[r].abs()),
                    "H[{}, {}] = {} expected {}",
                    r,
                    c,
                    H[(r, c)],
                    column[r]
                );
            }
        }
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let model = model();
        let reference = Polynomial::zero(3);
        let problem = HorizonProblem::new(&model, &reference, &initial(), &horizon(4), &Weights::default());
        let z = problem.rollout(&Actuation {
            steering: 0.1,
            acceleration: -0.3,
        });

        let grad = problem.gradient(&z);
        let h = 1e-5;
        for c in 0..z.len() {
            let mut zp = z.clone();
            let mut zm = z.clone();
            zp[c] += h;
            zm[c] -= h;
            let expected = (problem.objective(&zp) - problem.objective(&zm)) / (2.0 * h);
            assert!((grad[c] - expected).abs() < 1e-3 * (1.0 + expected.abs()), "column {}", c);
        }
    }

    #[test]
    fn cost_penalises_speed_error_and_rates() {
        let model = model();
        let reference = Polynomial::zero(3);
        let weights = Weights {
            cte: 0.0,
            epsi: 0.0,
            speed: 1.0,
            steering: 0.0,
            acceleration: 0.0,
            steering_rate: 1.0,
            acceleration_rate: 0.0,
        };
        let state = VehicleState {
            cte: 0.0,
            epsi: 0.0,
            ..initial()
        };
        let problem = HorizonProblem::new(&model, &reference, &state, &horizon(3), &weights);

        let mut z = DVector::zeros(problem.num_variables());
        let l = problem.layout();
        for t in 0..3 {
            z[l.v(t)] = 18.0;
        }
        z[l.steering(0)] = 0.25;
        z[l.steering(1)] = -0.25;

        // 3 * (18 - 20)^2 + (-0.25 - 0.25)^2
        assert!((problem.objective(&z) - 12.25).abs() < 1e-12);
    }
}
