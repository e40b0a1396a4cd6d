use serde::Deserialize;
use std::error::Error;
use std::fs::read_to_string;

use prelude::*;

pub static CONFIG_FILE: &str = "simulator.toml";

#[derive(Clone, Debug, Deserialize)]
pub struct SimulatorConfig {
    pub t: float,
    pub dt: float,
    pub real_time: bool,
    pub initial_speed: float,
    pub position_noise: float,
    pub seed: u64,
    pub road: Road,
}

/// A sinusoidal road `y = amplitude * sin(2 pi x / wavelength)`.
#[derive(Clone, Debug, Deserialize)]
pub struct Road {
    pub amplitude: float,
    pub wavelength: float,
    pub waypoint_spacing: float,
    pub n_waypoints: usize,
}

impl SimulatorConfig {
    pub fn load() -> Result<SimulatorConfig, Box<dyn Error>> {
        let config_str = read_to_string(CONFIG_FILE).map_err(|e| format!("unable to read {}: {}", CONFIG_FILE, e))?;
        let config: SimulatorConfig = toml::from_str(&config_str)?;
        if !(config.dt > 0.0) || !(config.t > 0.0) {
            return Err("simulation t and dt must be positive".into());
        }
        if !(config.road.waypoint_spacing > 0.0) || !(config.road.wavelength > 0.0) {
            return Err("road wavelength and waypoint spacing must be positive".into());
        }
        Ok(config)
    }
}

impl Road {
    pub fn y(&self, x: float) -> float {
        self.amplitude * (2.0 * PI * x / self.wavelength).sin()
    }

    pub fn heading(&self, x: float) -> float {
        let slope = self.amplitude * 2.0 * PI / self.wavelength * (2.0 * PI * x / self.wavelength).cos();
        slope.atan()
    }

    /// Evenly spaced waypoints starting at the last one behind `x`.
    pub fn waypoints(&self, x: float) -> Vec<(float, float)> {
        let first = (x / self.waypoint_spacing).floor();
        (0..self.n_waypoints)
            .map(|i| {
                let wx = (first + i as float) * self.waypoint_spacing;
                (wx, self.y(wx))
            })
            .collect()
    }
}
