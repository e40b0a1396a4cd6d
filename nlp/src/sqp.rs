// Sequential quadratic programming.
//
// Each iteration linearises the constraints about the current iterate and solves
//
//   minimise    0.5 d' H d + grad' d
//   subject to  g_l - g(z) <= J d <= g_u - g(z)
//               z_l - z    <=  d  <= z_u - z
//
// with OSQP, where H is the Lagrangian hessian at the previous multipliers with its eigenvalues
// made positive. A rejected full step is retried with a second order correction, then d is
// backtracked on the l1 merit function f(z) + mu * violation(z).

use prelude::*;

use crate::qp::QuadraticProgram;
use crate::{constraint_violation, Problem, Solution, SolveError, Solver};

#[derive(Clone, Debug)]
pub struct SqpSettings {
    pub max_iter: u32,
    pub qp_max_iter: u32,
    /// Convergence tolerance on the step length and the constraint violation.
    pub tol: float,
    /// Smallest eigenvalue of the subproblem hessian.
    pub regularisation: float,
}

impl Default for SqpSettings {
    fn default() -> SqpSettings {
        SqpSettings {
            max_iter: 50,
            qp_max_iter: 4000,
            tol: 1e-6,
            regularisation: 1e-6,
        }
    }
}

pub struct SqpSolver {
    settings: SqpSettings,
}

const ARMIJO: float = 1e-4;
const MIN_STEP: float = 1e-3;

fn norm_inf(v: &DVector<float>) -> float {
    v.iter().fold(0.0, |acc, &x| max(acc, x.abs()))
}

/// Symmetric matrix with the eigenvectors of `H` and eigenvalues `max(|lambda|, floor)`.
fn convexify(H: &DMatrix<float>, floor: float) -> DMatrix<float> {
    let H = (H + H.transpose()) * 0.5;
    let mut eigen = H.symmetric_eigen();
    eigen.eigenvalues.apply(|v| *v = max(v.abs(), floor));
    eigen.recompose()
}

impl SqpSolver {
    pub fn new(settings: SqpSettings) -> SqpSolver {
        SqpSolver { settings }
    }
}

impl Solver for SqpSolver {
    fn solve(&mut self, problem: &dyn Problem, z0: &DVector<float>) -> Result<Solution, SolveError> {
        let _guard = flame::start_guard("sqp solve");

        let n = problem.num_variables();
        let m = problem.num_constraints();
        let (z_l, z_u) = problem.variable_bounds();
        let (g_l, g_u) = problem.constraint_bounds();

        if z0.len() != n || z_l.len() != n || z_u.len() != n {
            return Err(SolveError::InvalidProblem(format!(
                "expected {} variables, initial guess has {}, bounds have {}/{}",
                n,
                z0.len(),
                z_l.len(),
                z_u.len()
            )));
        }
        if g_l.len() != m || g_u.len() != m {
            return Err(SolveError::InvalidProblem(format!(
                "expected {} constraint bounds, found {}/{}",
                m,
                g_l.len(),
                g_u.len()
            )));
        }

        let tol = self.settings.tol;
        let project = |v: DVector<float>| v.zip_zip_map(&z_l, &z_u, |v, l, u| min(max(v, l), u));
        let evaluate = |z: &DVector<float>| {
            let g = problem.constraints(z);
            (problem.objective(z), constraint_violation(&g, &g_l, &g_u))
        };
        // Subproblem bounds for constraints linearised as `J d + offset`.
        let bounds = |offset: &DVector<float>, z: &DVector<float>| {
            let l: Vec<float> = (&g_l - offset).iter().chain((&z_l - z).iter()).cloned().collect();
            let u: Vec<float> = (&g_u - offset).iter().chain((&z_u - z).iter()).cloned().collect();
            (l, u)
        };

        // Start from the initial guess projected into the variable bounds.
        let mut z = project(z0.clone());
        let mut y = DVector::zeros(m);
        let mut mu: float = 1.0;
        let mut violation = INFINITY;

        for iteration in 1..=self.settings.max_iter {
            let f = problem.objective(&z);
            let grad = problem.gradient(&z);
            let g = problem.constraints(&z);
            let J = problem.jacobian(&z);
            let H = problem.hessian(&z, &y);
            violation = constraint_violation(&g, &g_l, &g_u);

            if !f.is_finite() || grad.iter().chain(g.iter()).any(|v| !v.is_finite()) {
                return Err(SolveError::NonFinite { iteration });
            }
            if J.shape() != (m, n) || H.shape() != (n, n) {
                return Err(SolveError::InvalidProblem(format!(
                    "jacobian is {:?} and hessian is {:?} for {} constraints and {} variables",
                    J.shape(),
                    H.shape(),
                    m,
                    n
                )));
            }
            if J.iter().chain(H.iter()).any(|v| !v.is_finite()) {
                return Err(SolveError::NonFinite { iteration });
            }
            let H = convexify(&H, self.settings.regularisation);

            // Stack the linearised constraints on top of the variable bounds.
            let mut A = DMatrix::zeros(m + n, n);
            A.rows_mut(0, m).copy_from(&J);
            A.rows_mut(m, n).fill_with_identity();

            let (l, u) = bounds(&g, &z);
            let qp_max_iter = self.settings.qp_max_iter;
            let mut qp = QuadraticProgram::new(&H, grad.as_slice(), &A, &l, &u, qp_max_iter)?;
            let qp_solution = qp.solve()?;
            let accurate = qp_solution.accurate;
            let d = DVector::from_vec(qp_solution.x);
            y = DVector::from_iterator(m, qp_solution.y.iter().take(m).cloned());

            if norm_inf(&d) <= tol * (1.0 + norm_inf(&z)) && violation <= tol * (1.0 + norm_inf(&g)) {
                debug!("sqp converged in {} iterations", iteration);
                return Ok(Solution {
                    objective: f,
                    z,
                    constraint_violation: violation,
                    iterations: iteration,
                });
            }

            // The penalty must dominate the constraint multipliers for d to be a descent
            // direction of the merit function.
            mu = max(mu, 1.5 * norm_inf(&y));

            let merit = |(f, violation): (float, float)| f + mu * violation;
            let merit_0 = merit((f, violation));
            let slope = min(grad.dot(&d) - mu * violation, 0.0);
            let sufficient = |alpha: float, trial: (float, float)| merit(trial) <= merit_0 + ARMIJO * alpha * slope;

            let full = project(&z + &d);
            let full_trial = evaluate(&full);
            let mut accepted = if sufficient(1.0, full_trial) {
                Some((full, full_trial.1, 1.0))
            } else {
                // Second order correction: re-solve with the constraint curvature seen at z + d.
                let offset = problem.constraints(&full) - &J * &d;
                let (l, u) = bounds(&offset, &z);
                QuadraticProgram::new(&H, grad.as_slice(), &A, &l, &u, qp_max_iter)
                    .and_then(|mut qp| qp.solve())
                    .ok()
                    .map(|soc| project(&z + DVector::from_vec(soc.x)))
                    .map(|corrected| {
                        let trial = evaluate(&corrected);
                        (corrected, trial)
                    })
                    .filter(|&(_, trial)| sufficient(1.0, trial))
                    .map(|(corrected, trial)| (corrected, trial.1, 1.0))
            };

            let mut alpha = 0.5;
            while accepted.is_none() && alpha >= MIN_STEP {
                let candidate = project(&z + &d * alpha);
                let trial = evaluate(&candidate);
                if sufficient(alpha, trial) {
                    accepted = Some((candidate, trial.1, alpha));
                }
                alpha *= 0.5;
            }

            let (z_next, violation_next, alpha) = match accepted {
                Some(step) => step,
                None => {
                    debug!("sqp line search stalled at iteration {}", iteration);
                    return Err(SolveError::Stalled {
                        iterations: iteration,
                        constraint_violation: violation,
                        z,
                    });
                }
            };

            let step = norm_inf(&(&z_next - &z));
            z = z_next;
            violation = violation_next;

            trace!(
                "sqp iteration {}: f {:.6e} violation {:.3e} step {:.3e} alpha {} mu {:.3e} qp accurate {}",
                iteration,
                f,
                violation,
                step,
                alpha,
                mu,
                accurate
            );

            if z.iter().any(|v| !v.is_finite()) {
                return Err(SolveError::NonFinite { iteration });
            }

            if step <= tol * (1.0 + norm_inf(&z)) && violation <= tol * (1.0 + norm_inf(&g)) {
                debug!("sqp converged in {} iterations", iteration);
                return Ok(Solution {
                    objective: problem.objective(&z),
                    z,
                    constraint_violation: violation,
                    iterations: iteration,
                });
            }
        }

        Err(SolveError::NotConverged {
            iterations: self.settings.max_iter,
            constraint_violation: violation,
            z,
        })
    }
}
