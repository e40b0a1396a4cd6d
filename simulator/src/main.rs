// Ignore this lint otherwise many warnings are generated for common mathematical notation
#![allow(non_snake_case)]

#[macro_use]
extern crate log;

mod flame_merge;
mod sim_config;

use std::error::Error;
use std::thread;
use std::time::{Duration, Instant};

use control_model::{ControlModel, KinematicBicycle, State};
use controller::{ControlLoop, Telemetry};
use prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let controller_config = config::ControllerConfig::load()?;
    let sim_config = sim_config::SimulatorConfig::load()?;

    let result = run(controller_config, &sim_config);
    flame_merge::write_flame()?;
    result
}

fn run(controller_config: config::ControllerConfig, sim_config: &sim_config::SimulatorConfig) -> Result<(), Box<dyn Error>> {
    let delay = min(controller_config.latency.actuation_delay, sim_config.dt);
    let model = KinematicBicycle::new(
        controller_config.vehicle.lf,
        controller_config.vehicle.max_steering_angle(),
        controller_config.vehicle.max_acceleration,
    );
    let mut control = ControlLoop::new(controller_config)?;
    let mut rng = StdRng::seed_from_u64(sim_config.seed);

    let road = &sim_config.road;
    let mut state = State {
        position: (0.0, road.y(0.0)),
        heading: road.heading(0.0),
        speed: sim_config.initial_speed,
    };

    let n_steps = (sim_config.t / sim_config.dt) as usize;
    let dt_duration = Duration::from_secs_f64(sim_config.dt);
    let mut cte_stats = stats::OnlineStats::new();
    let mut controller_stats = stats::OnlineStats::new();
    let mut max_cte: float = 0.0;
    let mut fallbacks = 0;
    let mut approximate = 0;

    let mut actuation = control.previous_command().to_actuation(&model);

    for i in 0..n_steps {
        let step_start = Instant::now();

        let noise = sim_config.position_noise;
        let mut measured = state.position;
        if noise > 0.0 {
            measured.0 += rng.gen_range(-noise..noise);
            measured.1 += rng.gen_range(-noise..noise);
        }
        let telemetry = Telemetry {
            waypoints: road.waypoints(state.position.0),
            position: measured,
            heading: state.heading,
            speed: state.speed,
        };

        let controller_start = Instant::now();
        let output = control.step(&telemetry)?;
        let controller_millis = duration_to_secs(controller_start.elapsed()) * 1e3;
        controller_stats.add(controller_millis);

        if output.outcome.is_fallback() {
            fallbacks += 1;
        } else if !output.outcome.is_converged() {
            approximate += 1;
        }

        // The previous command acts until the delay has passed.
        state = model.step_state(delay, &state, &actuation);
        actuation = output.command.to_actuation(&model);
        state = model.step_state(sim_config.dt - delay, &state, &actuation);
        state.heading = wrap_angle(state.heading);

        let cte = state.position.1 - road.y(state.position.0);
        cte_stats.add(cte.abs());
        max_cte = max(max_cte, cte.abs());

        info!(
            "t {:.1}: position ({:.1}, {:.2}) speed {:.1} cte {:.3} command {:?}",
            (i + 1) as float * sim_config.dt,
            state.position.0,
            state.position.1,
            state.speed,
            cte,
            output.command
        );

        let step_elapsed = step_start.elapsed();
        if let Some(step_remaining) = dt_duration.checked_sub(step_elapsed) {
            if sim_config.real_time {
                thread::sleep(step_remaining);
            }
        } else {
            warn!(
                "step missed deadline. took {:.1}ms.",
                duration_to_secs(step_elapsed) * 1e3
            );
        }
    }

    println!("{} model, {} steps", KinematicBicycle::name(), n_steps);
    println!(
        "|cte| (mean/m, stdev/m, max/m): {:.3} {:.3} {:.3}",
        cte_stats.mean(),
        cte_stats.stddev(),
        max_cte
    );
    println!(
        "controller (mean/ms, stdev/ms): {:.2} {:.2}",
        controller_stats.mean(),
        controller_stats.stddev()
    );
    println!("approximate ticks: {}, fallback ticks: {}", approximate, fallbacks);

    Ok(())
}
