#![allow(non_snake_case)]

use prelude::*;
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::Path;
use thiserror::Error;

pub static CONFIG_FILE: &str = "controller.toml";

/// An error that occurs while loading a configuration file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unable to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("unable to deserialise {path}: {source}")]
    Deserialise {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub horizon: Horizon,
    pub weights: Weights,
    pub vehicle: Vehicle,
    pub latency: Latency,
    pub solver: Solver,
    pub server: Server,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Horizon {
    /// Number of states in the horizon.
    pub N: usize,
    /// Duration of one horizon step in seconds.
    pub dt: float,
    pub reference_speed: float,
    /// Degree of the reference polynomial fitted to the waypoints.
    pub polynomial_degree: usize,
}

/// Cost term weights. Each multiplies a squared quantity summed over the horizon.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub cte: float,
    pub epsi: float,
    pub speed: float,
    pub steering: float,
    pub acceleration: float,
    pub steering_rate: float,
    pub acceleration_rate: float,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Vehicle {
    /// Distance from the front axle to the centre of gravity.
    pub lf: float,
    pub max_steering_angle_deg: float,
    pub max_acceleration: float,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Latency {
    /// Actuation delay used by the latency compensator.
    pub actuation_delay: float,
    /// Whether the transport waits `actuation_delay` before dispatching each command.
    pub simulate: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Solver {
    /// SQP iteration budget.
    pub max_iter: u32,
    /// OSQP iteration budget for each quadratic subproblem.
    pub qp_max_iter: u32,
    pub tol: float,
    /// Largest constraint violation at which the last iterate of a failed solve is still used.
    pub acceptable_violation: float,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Server {
    pub port: u16,
}

impl Default for Horizon {
    fn default() -> Horizon {
        Horizon {
            N: 10,
            dt: 0.1,
            reference_speed: 40.0,
            polynomial_degree: 3,
        }
    }
}

impl Default for Weights {
    fn default() -> Weights {
        Weights {
            cte: 2000.0,
            epsi: 2000.0,
            speed: 1.0,
            steering: 5.0,
            acceleration: 5.0,
            steering_rate: 200.0,
            acceleration_rate: 10.0,
        }
    }
}

impl Default for Vehicle {
    fn default() -> Vehicle {
        Vehicle {
            lf: 2.67,
            max_steering_angle_deg: 25.0,
            max_acceleration: 1.0,
        }
    }
}

impl Default for Latency {
    fn default() -> Latency {
        Latency {
            actuation_delay: 0.1,
            simulate: true,
        }
    }
}

impl Default for Solver {
    fn default() -> Solver {
        Solver {
            max_iter: 25,
            qp_max_iter: 4000,
            tol: 1e-4,
            acceptable_violation: 1e-2,
        }
    }
}

impl Default for Server {
    fn default() -> Server {
        Server { port: 4567 }
    }
}

impl Vehicle {
    pub fn max_steering_angle(&self) -> float {
        self.max_steering_angle_deg.to_radians()
    }
}

impl ControllerConfig {
    pub fn load() -> Result<ControllerConfig, LoadError> {
        load(CONFIG_FILE)
    }

    pub fn from_toml(config_str: &str) -> Result<ControllerConfig, toml::de::Error> {
        toml::from_str(config_str)
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        let invalid = |msg: &str| Err(LoadError::Invalid(msg.to_owned()));

        if self.horizon.N < 2 {
            return invalid("horizon.N must be at least 2");
        }
        if !(self.horizon.dt > 0.0 && self.horizon.dt.is_finite()) {
            return invalid("horizon.dt must be positive and finite");
        }
        if self.horizon.polynomial_degree < 1 {
            return invalid("horizon.polynomial_degree must be at least 1");
        }
        if !(self.vehicle.lf > 0.0) {
            return invalid("vehicle.lf must be positive");
        }
        if !(self.vehicle.max_steering_angle_deg > 0.0) {
            return invalid("vehicle.max_steering_angle_deg must be positive");
        }
        if !(self.vehicle.max_acceleration > 0.0) {
            return invalid("vehicle.max_acceleration must be positive");
        }
        if !(self.latency.actuation_delay >= 0.0 && self.latency.actuation_delay.is_finite()) {
            return invalid("latency.actuation_delay must be finite and not negative");
        }
        if self.solver.max_iter == 0 || self.solver.qp_max_iter == 0 {
            return invalid("solver iteration budgets must be non-zero");
        }
        if !(self.solver.tol > 0.0) {
            return invalid("solver.tol must be positive");
        }
        if !(self.solver.acceptable_violation >= 0.0) {
            return invalid("solver.acceptable_violation must not be negative");
        }
        Ok(())
    }
}

/// Loads and validates a controller configuration file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<ControllerConfig, LoadError> {
    let path_str = path.as_ref().display().to_string();

    let config_str = read_to_string(path.as_ref()).map_err(|source| LoadError::Read {
        path: path_str.clone(),
        source,
    })?;

    let config = ControllerConfig::from_toml(&config_str).map_err(|source| {
        LoadError::Deserialise {
            path: path_str,
            source,
        }
    })?;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_uses_defaults() {
        let config = ControllerConfig::from_toml(
            r#"
            [horizon]
            N = 12
            reference_speed = 25.0

            [server]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.horizon.N, 12);
        assert_eq!(config.horizon.dt, 0.1);
        assert_eq!(config.horizon.reference_speed, 25.0);
        assert_eq!(config.weights.steering_rate, 200.0);
        assert_eq!(config.server.port, 9000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn shipped_file_matches_defaults() {
        let config_str = include_str!("../../controller.toml");
        let config = ControllerConfig::from_toml(config_str).unwrap();
        let default = ControllerConfig::default();

        assert_eq!(config.horizon.N, default.horizon.N);
        assert_eq!(config.horizon.dt, default.horizon.dt);
        assert_eq!(config.horizon.reference_speed, default.horizon.reference_speed);
        assert_eq!(config.weights.cte, default.weights.cte);
        assert_eq!(config.weights.acceleration_rate, default.weights.acceleration_rate);
        assert_eq!(config.vehicle.lf, default.vehicle.lf);
        assert_eq!(config.latency.actuation_delay, default.latency.actuation_delay);
        assert_eq!(config.solver.max_iter, default.solver.max_iter);
        assert_eq!(config.solver.acceptable_violation, default.solver.acceptable_violation);
        assert_eq!(config.server.port, default.server.port);
    }

    #[test]
    fn rejects_short_horizon() {
        let config = ControllerConfig::from_toml("[horizon]\nN = 1\n").unwrap();
        match config.validate() {
            Err(LoadError::Invalid(msg)) => assert!(msg.contains("horizon.N")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn rejects_infinite_delay() {
        let config = ControllerConfig::from_toml("[latency]\nactuation_delay = inf\n").unwrap();
        match config.validate() {
            Err(LoadError::Invalid(msg)) => assert!(msg.contains("latency.actuation_delay")),
            other => panic!("unexpected result {:?}", other),
        }

        let config = ControllerConfig::from_toml("[horizon]\ndt = inf\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(ControllerConfig::from_toml("[horizon]\nN = \"ten\"\n").is_err());
    }

    #[test]
    fn missing_file_is_read_error() {
        match load("does/not/exist.toml") {
            Err(LoadError::Read { path, .. }) => assert_eq!(path, "does/not/exist.toml"),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
