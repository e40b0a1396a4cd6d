use log::Level::Trace;
use osqp::{Problem as InnerProblem, Settings, Status};

use prelude::*;

use crate::csc;
use crate::SolveError;

// OSQP treats bounds beyond this magnitude as infinite.
const OSQP_INFINITY: float = 1e30;

/// A convex quadratic program solved by OSQP:
///
/// ```text
/// minimise    0.5 x' P x + q' x
/// subject to  l <= A x <= u
/// ```
pub struct QuadraticProgram {
    inner: InnerProblem,
}

pub struct QpSolution {
    pub x: Vec<float>,
    pub y: Vec<float>,
    pub accurate: bool,
}

impl QuadraticProgram {
    pub fn new(
        P: &DMatrix<float>,
        q: &[float],
        A: &DMatrix<float>,
        l: &[float],
        u: &[float],
        max_iter: u32,
    ) -> Result<QuadraticProgram, SolveError> {
        let _guard = flame::start_guard("osqp setup");

        let l: Vec<_> = l.iter().map(|&v| clamp(v, -OSQP_INFINITY, OSQP_INFINITY)).collect();
        let u: Vec<_> = u.iter().map(|&v| clamp(v, -OSQP_INFINITY, OSQP_INFINITY)).collect();

        let settings = Settings::default()
            .verbose(log_enabled!(Trace))
            .polish(true)
            .eps_abs(1e-7)
            .eps_rel(1e-7)
            .max_iter(max_iter);

        let inner = InnerProblem::new(
            csc::from_dense(P, true),
            q,
            csc::from_dense(A, false),
            &l,
            &u,
            &settings,
        )
        .map_err(|e| SolveError::QpSetup(format!("{:?}", e)))?;

        Ok(QuadraticProgram { inner })
    }

    pub fn solve(&mut self) -> Result<QpSolution, SolveError> {
        let _guard = flame::start_guard("osqp solve");

        match self.inner.solve() {
            Status::Solved(solution) => Ok(QpSolution {
                x: solution.x().to_vec(),
                y: solution.y().to_vec(),
                accurate: true,
            }),
            Status::SolvedInaccurate(solution)
            | Status::MaxIterationsReached(solution)
            | Status::TimeLimitReached(solution) => {
                debug!("quadratic subproblem solved inaccurately");
                Ok(QpSolution {
                    x: solution.x().to_vec(),
                    y: solution.y().to_vec(),
                    accurate: false,
                })
            }
            Status::PrimalInfeasible(_) | Status::PrimalInfeasibleInaccurate(_) => {
                Err(SolveError::QpFailed("primal infeasible".to_owned()))
            }
            Status::DualInfeasible(_) | Status::DualInfeasibleInaccurate(_) => {
                Err(SolveError::QpFailed("dual infeasible".to_owned()))
            }
            _ => Err(SolveError::QpFailed("solver error".to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_constrained_quadratic() {
        // minimise (x0 - 2)^2 + (x1 + 1)^2 with x0 <= 1
        let P = DMatrix::from_diagonal_element(2, 2, 2.0);
        let q = [-4.0, 2.0];
        let A = DMatrix::identity(2, 2);
        let l = [NEG_INFINITY, NEG_INFINITY];
        let u = [1.0, INFINITY];

        let mut qp = QuadraticProgram::new(&P, &q, &A, &l, &u, 4000).unwrap();
        let solution = qp.solve().unwrap();

        assert!((solution.x[0] - 1.0).abs() < 1e-5, "{:?}", solution.x);
        assert!((solution.x[1] + 1.0).abs() < 1e-5, "{:?}", solution.x);
    }

    #[test]
    fn infeasible_bounds_are_reported() {
        let P = DMatrix::from_diagonal_element(1, 1, 1.0);
        let A = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let mut qp = QuadraticProgram::new(&P, &[0.0], &A, &[1.0, -3.0], &[2.0, -2.0], 4000).unwrap();
        assert!(qp.solve().is_err());
    }
}
