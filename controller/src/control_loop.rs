use std::time::{Duration, Instant};

use config::ControllerConfig;
use control_model::State;
use prelude::*;

use crate::latency::compensate;
use crate::{ActuatorCommand, Error, Frame, MpcController, PlanOutcome, Polynomial, TrackingError, VehicleState};
use nlp::{Solver, SqpSolver};

/// One telemetry sample in world coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Telemetry {
    pub waypoints: Vec<(float, float)>,
    pub position: (float, float),
    /// Radians, counter-clockwise from the world x axis.
    pub heading: float,
    pub speed: float,
}

impl Telemetry {
    fn check(&self) -> Result<(), Error> {
        let finite = self.position.0.is_finite()
            && self.position.1.is_finite()
            && self.heading.is_finite()
            && self.speed.is_finite();
        if !finite {
            return Err(Error::MalformedTelemetry("non-finite vehicle pose".to_owned()));
        }
        Ok(())
    }
}

/// Everything computed during one tick.
#[derive(Clone, Debug)]
pub struct TickOutput {
    pub command: ActuatorCommand,
    /// Pose at the moment the command takes effect, in world coordinates.
    pub compensated: State,
    pub state: VehicleState,
    pub reference: Polynomial,
    /// Waypoints in the vehicle frame.
    pub waypoints: Vec<(float, float)>,
    /// Planned positions in the vehicle frame.
    pub predicted: Vec<(float, float)>,
    pub outcome: PlanOutcome,
    pub solve_time: Duration,
}

pub struct ControlLoop<S: Solver = SqpSolver> {
    config: ControllerConfig,
    mpc: MpcController<S>,
    previous: ActuatorCommand,
}

impl ControlLoop<SqpSolver> {
    pub fn new(config: ControllerConfig) -> Result<ControlLoop<SqpSolver>, Error> {
        config.validate()?;
        let mpc = MpcController::from_config(&config);
        Ok(ControlLoop::with_controller(config, mpc))
    }
}

impl<S: Solver> ControlLoop<S> {
    pub fn with_controller(config: ControllerConfig, mpc: MpcController<S>) -> ControlLoop<S> {
        ControlLoop {
            config,
            mpc,
            previous: ActuatorCommand::neutral(),
        }
    }

    /// The command most recently issued by `step`.
    pub fn previous_command(&self) -> ActuatorCommand {
        self.previous
    }

    /// Forgets the held command, for a new vehicle session.
    pub fn reset(&mut self) {
        self.previous = ActuatorCommand::neutral();
    }

    /// Computes a command and holds it as the previous command for the next tick.
    pub fn step(&mut self, telemetry: &Telemetry) -> Result<TickOutput, Error> {
        let previous = self.previous;
        let output = self.compute(telemetry, &previous)?;
        self.previous = output.command;
        Ok(output)
    }

    /// Computes the command for `telemetry` given the command that is currently acting.
    ///
    /// Does not touch the held command, so the same inputs always give the same output.
    pub fn compute(&mut self, telemetry: &Telemetry, previous: &ActuatorCommand) -> Result<TickOutput, Error> {
        let _guard = flame::start_guard("control tick");
        telemetry.check()?;

        let model = *self.mpc.model();
        let previous_actuation = previous.to_actuation(&model);

        let measured = State {
            position: telemetry.position,
            heading: telemetry.heading,
            speed: telemetry.speed,
        };
        let compensated = compensate(
            &model,
            &measured,
            &previous_actuation,
            self.config.latency.actuation_delay,
        );

        let frame = Frame::new(compensated.position, compensated.heading);
        let waypoints = frame.points_to_local(&telemetry.waypoints);

        let (xs, ys): (Vec<float>, Vec<float>) = waypoints.iter().cloned().unzip();
        let reference = {
            let _guard = flame::start_guard("fit reference");
            Polynomial::fit(&xs, &ys, self.config.horizon.polynomial_degree)?
        };

        let error = TrackingError::evaluate(&reference);
        let state = VehicleState::at_origin(compensated.speed, error);
        debug!(
            "tick: speed {:.2} cte {:.3} epsi {:.4} with {} waypoints",
            state.v,
            state.cte,
            state.epsi,
            waypoints.len()
        );

        let start = Instant::now();
        let plan = self.mpc.plan(&state, &reference, &previous_actuation);
        let solve_time = start.elapsed();

        info!(
            "steering {:.4} throttle {:.4} solved in {:.1} ms",
            plan.command.steering_angle,
            plan.command.throttle,
            duration_to_secs(solve_time) * 1000.0
        );

        Ok(TickOutput {
            command: plan.command,
            compensated,
            state,
            reference,
            waypoints,
            predicted: plan.trajectory,
            outcome: plan.outcome,
            solve_time,
        })
    }
}
