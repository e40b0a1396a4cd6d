//! Nonlinear programs of the form
//!
//! ```text
//! minimise    f(z)
//! subject to  g_l <= g(z) <= g_u
//!             z_l <=  z   <= z_u
//! ```
//!
//! Rows with `g_l == g_u` are equality constraints.

#![allow(non_snake_case)]

#[macro_use]
extern crate log;

mod csc;
mod qp;
mod sqp;

pub use sqp::{SqpSettings, SqpSolver};

use prelude::*;
use thiserror::Error;

pub trait Problem {
    fn num_variables(&self) -> usize;

    fn num_constraints(&self) -> usize;

    /// Lower and upper bounds on the decision variables.
    fn variable_bounds(&self) -> (DVector<float>, DVector<float>);

    /// Lower and upper bounds on the constraint residuals.
    fn constraint_bounds(&self) -> (DVector<float>, DVector<float>);

    fn objective(&self, z: &DVector<float>) -> float;

    fn gradient(&self, z: &DVector<float>) -> DVector<float>;

    /// Hessian of the Lagrangian `f(z) + y' g(z)`. It may be indefinite.
    fn hessian(&self, z: &DVector<float>, y: &DVector<float>) -> DMatrix<float>;

    fn constraints(&self, z: &DVector<float>) -> DVector<float>;

    /// Jacobian of `constraints`, one row per constraint.
    fn jacobian(&self, z: &DVector<float>) -> DMatrix<float>;
}

pub trait Solver {
    fn solve(&mut self, problem: &dyn Problem, z0: &DVector<float>) -> Result<Solution, SolveError>;
}

#[derive(Clone, Debug)]
pub struct Solution {
    pub z: DVector<float>,
    pub objective: float,
    pub constraint_violation: float,
    pub iterations: u32,
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("problem dimensions are inconsistent: {0}")]
    InvalidProblem(String),

    #[error("quadratic subproblem setup failed: {0}")]
    QpSetup(String),

    #[error("quadratic subproblem failed: {0}")]
    QpFailed(String),

    #[error("non-finite value in iterate {iteration}")]
    NonFinite { iteration: u32 },

    #[error("no convergence after {iterations} iterations (constraint violation {constraint_violation:e})")]
    NotConverged {
        iterations: u32,
        constraint_violation: float,
        z: DVector<float>,
    },

    #[error("line search stalled at iteration {iterations} (constraint violation {constraint_violation:e})")]
    Stalled {
        iterations: u32,
        constraint_violation: float,
        z: DVector<float>,
    },
}

impl SolveError {
    /// The last iterate and its constraint violation, when the solver got as far as iterating.
    pub fn last_iterate(&self) -> Option<(&DVector<float>, float)> {
        match self {
            SolveError::NotConverged {
                z,
                constraint_violation,
                ..
            }
            | SolveError::Stalled {
                z,
                constraint_violation,
                ..
            } => Some((z, *constraint_violation)),
            _ => None,
        }
    }
}

/// Sum of the amounts by which `g` lies outside `[lower, upper]`.
pub fn constraint_violation(g: &DVector<float>, lower: &DVector<float>, upper: &DVector<float>) -> float {
    g.iter()
        .zip(lower.iter())
        .zip(upper.iter())
        .map(|((&g, &l), &u)| max(0.0, max(l - g, g - u)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_counts_both_sides() {
        let g = DVector::from_column_slice(&[0.0, 2.0, -3.0, 1.0]);
        let l = DVector::from_column_slice(&[0.0, 0.0, -1.0, NEG_INFINITY]);
        let u = DVector::from_column_slice(&[0.0, 1.5, 1.0, INFINITY]);
        assert!((constraint_violation(&g, &l, &u) - 2.5).abs() < 1e-12);
    }
}
