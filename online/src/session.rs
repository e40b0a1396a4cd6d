use controller::ControlLoop;
use thiserror::Error;

use crate::message::{self, Inbound, MANUAL};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("control loop failed: {0}")]
    Control(#[from] controller::Error),
}

#[derive(Debug, PartialEq)]
pub enum Reply {
    None,
    Manual,
    Steer(String),
}

impl Reply {
    pub fn frame(&self) -> Option<&str> {
        match self {
            Reply::None => None,
            Reply::Manual => Some(MANUAL),
            Reply::Steer(frame) => Some(frame.as_str()),
        }
    }
}

/// Runs one control tick for an inbound frame.
///
/// Anything that is not usable telemetry is acknowledged without touching the held command.
/// Only errors that end the session are returned.
pub fn handle_frame(control: &mut ControlLoop, frame: &str) -> Result<Reply, SessionError> {
    let telemetry = match message::parse(frame) {
        Ok(Inbound::Telemetry(message)) => {
            let echoed = message.echoed_command();
            if echoed != control.previous_command() {
                debug!(
                    "vehicle reports {:?}, controller holds {:?}",
                    echoed,
                    control.previous_command()
                );
            }
            message.telemetry()
        }
        Ok(Inbound::Other(event)) => {
            debug!("ignoring {} event", event);
            return Ok(Reply::None);
        }
        Ok(Inbound::Ignored) => return Ok(Reply::None),
        Err(err) => {
            warn!("{}", err);
            return Ok(Reply::Manual);
        }
    };

    let output = match control.step(&telemetry) {
        Ok(output) => output,
        Err(err) if !err.is_fatal() => {
            warn!("{}", err);
            return Ok(Reply::Manual);
        }
        Err(err) => return Err(err.into()),
    };

    match message::encode_steer(&output) {
        Ok(frame) => Ok(Reply::Steer(frame)),
        Err(err) => {
            warn!("unable to encode command: {}", err);
            Ok(Reply::Manual)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::ControllerConfig;
    use controller::ActuatorCommand;
    use serde_json::Value;

    const STRAIGHT: &str = r#"42["telemetry",{"ptsx":[10.0,20.0,30.0],"ptsy":[0.0,0.0,0.0],"x":0.0,"y":0.0,"psi":0.0,"speed":10.0,"steering_angle":0.0,"throttle":0.0}]"#;

    fn control() -> ControlLoop {
        ControlLoop::new(ControllerConfig::default()).unwrap()
    }

    #[test]
    fn telemetry_gets_steer_command() {
        let mut control = control();

        let frame = match handle_frame(&mut control, STRAIGHT).unwrap() {
            Reply::Steer(frame) => frame,
            other => panic!("unexpected reply {:?}", other),
        };

        assert!(frame.starts_with("42[\"steer\","));
        let (event, body): (String, Value) = serde_json::from_str(&frame[2..]).unwrap();
        assert_eq!(event, "steer");

        let throttle = body["throttle"].as_f64().unwrap();
        let steering = body["steering_angle"].as_f64().unwrap();
        assert!(throttle > 0.5 && throttle <= 1.0);
        assert!(steering.abs() < 1e-3);
        assert_eq!(body["mpc_x"].as_array().unwrap().len(), 10);
        assert_eq!(body["mpc_y"].as_array().unwrap().len(), 10);
        assert_eq!(body["next_x"].as_array().unwrap().len(), 3);
        assert_eq!(control.previous_command().throttle, throttle);
    }

    #[test]
    fn missing_payload_gets_manual_ack() {
        let mut control = control();
        let reply = handle_frame(&mut control, "42[\"telemetry\",null]").unwrap();
        assert_eq!(reply.frame(), Some(MANUAL));
        assert_eq!(control.previous_command(), ActuatorCommand::neutral());
    }

    #[test]
    fn malformed_telemetry_leaves_held_command() {
        let mut control = control();
        handle_frame(&mut control, STRAIGHT).unwrap();
        let held = control.previous_command();

        let malformed = STRAIGHT.replace("\"speed\":10.0", "\"speed\":\"ten\"");
        assert_eq!(handle_frame(&mut control, &malformed).unwrap(), Reply::Manual);
        assert_eq!(control.previous_command(), held);
    }

    #[test]
    fn other_frames_get_no_reply() {
        let mut control = control();
        assert_eq!(handle_frame(&mut control, "2").unwrap(), Reply::None);
        assert_eq!(handle_frame(&mut control, "42[\"reset\",{}]").unwrap(), Reply::None);
    }

    #[test]
    fn empty_waypoints_end_session() {
        let mut control = control();
        let frame = STRAIGHT
            .replace("[10.0,20.0,30.0]", "[]")
            .replace("[0.0,0.0,0.0]", "[]");
        assert!(matches!(
            handle_frame(&mut control, &frame),
            Err(SessionError::Control(_))
        ));
    }
}
