use control_model::{Actuation, KinematicBicycle};
use prelude::*;

/// Normalised actuator command exchanged with the vehicle. Both fields lie in `[-1, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ActuatorCommand {
    pub steering_angle: float,
    pub throttle: float,
}

impl ActuatorCommand {
    pub fn neutral() -> ActuatorCommand {
        ActuatorCommand::default()
    }

    pub fn clamped(self) -> ActuatorCommand {
        ActuatorCommand {
            steering_angle: clamp(self.steering_angle, -1.0, 1.0),
            throttle: clamp(self.throttle, -1.0, 1.0),
        }
    }

    pub fn is_within_bounds(&self) -> bool {
        (-1.0..=1.0).contains(&self.steering_angle) && (-1.0..=1.0).contains(&self.throttle)
    }

    /// Normalises a physical actuation by the model's input bounds.
    pub fn from_actuation(actuation: &Actuation, model: &KinematicBicycle) -> ActuatorCommand {
        ActuatorCommand {
            steering_angle: actuation.steering / model.max_steering,
            throttle: actuation.acceleration / model.max_acceleration,
        }
        .clamped()
    }

    pub fn to_actuation(&self, model: &KinematicBicycle) -> Actuation {
        let command = self.clamped();
        Actuation {
            steering: command.steering_angle * model.max_steering,
            acceleration: command.throttle * model.max_acceleration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> KinematicBicycle {
        KinematicBicycle::new(2.67, 25.0_f64.to_radians(), 1.0)
    }

    #[test]
    fn full_lock_normalises_to_one() {
        let model = model();
        let actuation = Actuation {
            steering: model.max_steering,
            acceleration: -model.max_acceleration,
        };
        let command = ActuatorCommand::from_actuation(&actuation, &model);
        assert!((command.steering_angle - 1.0).abs() < 1e-12);
        assert!((command.throttle + 1.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_is_clamped() {
        let model = model();
        let actuation = Actuation {
            steering: 10.0,
            acceleration: std::f64::NAN,
        };
        let command = ActuatorCommand::from_actuation(&actuation, &model);
        assert_eq!(command.steering_angle, 1.0);
        assert_eq!(command.throttle, 0.0);
        assert!(command.is_within_bounds());
    }

    #[test]
    fn actuation_round_trip() {
        let model = model();
        let command = ActuatorCommand {
            steering_angle: -0.3,
            throttle: 0.6,
        };
        let back = ActuatorCommand::from_actuation(&command.to_actuation(&model), &model);
        assert!((back.steering_angle - command.steering_angle).abs() < 1e-12);
        assert!((back.throttle - command.throttle).abs() < 1e-12);
    }
}
