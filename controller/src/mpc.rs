use config::{ControllerConfig, Horizon, Weights};
use control_model::{Actuation, ControlModel, KinematicBicycle};
use nlp::{SqpSettings, SqpSolver, Solver};
use prelude::*;

use crate::mpc_horizon::HorizonProblem;
use crate::{ActuatorCommand, Polynomial, VehicleState};

#[derive(Clone, Debug, PartialEq)]
pub enum PlanOutcome {
    Converged { iterations: u32, objective: float },
    /// The solver stopped early but its last iterate was close enough to feasible to act on.
    Approximate { reason: String, constraint_violation: float },
    /// The solver failed and the previous command is held.
    Fallback { reason: String },
}

impl PlanOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, PlanOutcome::Converged { .. })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, PlanOutcome::Fallback { .. })
    }
}

#[derive(Clone, Debug)]
pub struct Plan {
    pub command: ActuatorCommand,
    /// Planned positions in the vehicle frame, one per horizon step.
    pub trajectory: Vec<(float, float)>,
    pub outcome: PlanOutcome,
}

/// Receding horizon controller for the kinematic bicycle.
pub struct MpcController<S: Solver = SqpSolver> {
    model: KinematicBicycle,
    horizon: Horizon,
    weights: Weights,
    solver: S,
    acceptable_violation: float,
}

impl MpcController<SqpSolver> {
    pub fn from_config(config: &ControllerConfig) -> MpcController<SqpSolver> {
        let solver = SqpSolver::new(SqpSettings {
            max_iter: config.solver.max_iter,
            qp_max_iter: config.solver.qp_max_iter,
            tol: config.solver.tol,
            ..SqpSettings::default()
        });
        let mut mpc = MpcController::with_solver(
            KinematicBicycle::new(
                config.vehicle.lf,
                config.vehicle.max_steering_angle(),
                config.vehicle.max_acceleration,
            ),
            config.horizon.clone(),
            config.weights.clone(),
            solver,
        );
        mpc.acceptable_violation = config.solver.acceptable_violation;
        mpc
    }
}

impl<S: Solver> MpcController<S> {
    pub fn with_solver(model: KinematicBicycle, horizon: Horizon, weights: Weights, solver: S) -> MpcController<S> {
        MpcController {
            model,
            horizon,
            weights,
            solver,
            acceptable_violation: config::Solver::default().acceptable_violation,
        }
    }

    pub fn model(&self) -> &KinematicBicycle {
        &self.model
    }

    /// Plans over the horizon from `state`, warm started by holding `previous`.
    pub fn plan(&mut self, state: &VehicleState, reference: &Polynomial, previous: &Actuation) -> Plan {
        let _guard = flame::start_guard("mpc plan");

        let problem = HorizonProblem::new(&self.model, reference, state, &self.horizon, &self.weights);
        let z0 = problem.rollout(previous);

        let result = self.solver.solve(&problem, &z0);
        let reason = match result {
            Ok(ref solution) if solution.z.iter().all(|v| v.is_finite()) => {
                let actuation = problem.first_actuation(&solution.z);
                debug!(
                    "{} plan converged in {} iterations, objective {:.3}",
                    KinematicBicycle::name(),
                    solution.iterations,
                    solution.objective
                );
                return Plan {
                    command: ActuatorCommand::from_actuation(&actuation, &self.model),
                    trajectory: problem.positions(&solution.z),
                    outcome: PlanOutcome::Converged {
                        iterations: solution.iterations,
                        objective: solution.objective,
                    },
                };
            }
            Ok(_) => "solver returned a non-finite solution".to_owned(),
            Err(err) => {
                let reason = err.to_string();
                match err.last_iterate() {
                    Some((z, violation))
                        if violation <= self.acceptable_violation && z.iter().all(|v| v.is_finite()) =>
                    {
                        warn!("using last iterate: {}", reason);
                        let actuation = problem.first_actuation(z);
                        return Plan {
                            command: ActuatorCommand::from_actuation(&actuation, &self.model),
                            trajectory: problem.positions(z),
                            outcome: PlanOutcome::Approximate {
                                reason,
                                constraint_violation: violation,
                            },
                        };
                    }
                    _ => reason,
                }
            }
        };

        warn!("holding previous command: {}", reason);

        let command = ActuatorCommand::from_actuation(previous, &self.model);
        Plan {
            command,
            trajectory: problem.positions(&z0),
            outcome: PlanOutcome::Fallback { reason },
        }
    }
}
