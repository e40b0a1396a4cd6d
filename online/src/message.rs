// Event frames exchanged with the vehicle.
//
// A frame is one text line. Event frames start with "42" followed by a JSON array holding the
// event name and its payload, e.g. `42["telemetry",{...}]`.

use controller::{ActuatorCommand, Telemetry, TickOutput};
use prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const EVENT_PREFIX: &str = "42";
pub const MANUAL: &str = "42[\"manual\",{}]";

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("frame carries no payload")]
    NoPayload,

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{ptsx} ptsx values but {ptsy} ptsy values")]
    LengthMismatch { ptsx: usize, ptsy: usize },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TelemetryMessage {
    pub ptsx: Vec<float>,
    pub ptsy: Vec<float>,
    pub x: float,
    pub y: float,
    pub psi: float,
    pub speed: float,
    pub steering_angle: float,
    pub throttle: float,
}

impl TelemetryMessage {
    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            waypoints: self.ptsx.iter().cloned().zip(self.ptsy.iter().cloned()).collect(),
            position: (self.x, self.y),
            heading: self.psi,
            speed: self.speed,
        }
    }

    /// The command the vehicle reports as currently applied.
    pub fn echoed_command(&self) -> ActuatorCommand {
        ActuatorCommand {
            steering_angle: self.steering_angle,
            throttle: self.throttle,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Inbound {
    /// Not an event frame.
    Ignored,
    /// An event other than telemetry.
    Other(String),
    Telemetry(TelemetryMessage),
}

#[derive(Serialize)]
struct SteerMessage {
    steering_angle: float,
    throttle: float,
    mpc_x: Vec<float>,
    mpc_y: Vec<float>,
    next_x: Vec<float>,
    next_y: Vec<float>,
}

pub fn parse(frame: &str) -> Result<Inbound, MessageError> {
    let frame = frame.trim();
    if frame.len() <= EVENT_PREFIX.len() || !frame.starts_with(EVENT_PREFIX) {
        return Ok(Inbound::Ignored);
    }

    let body = &frame[EVENT_PREFIX.len()..];
    if body.contains("null") {
        return Err(MessageError::NoPayload);
    }
    let payload = match (body.find('['), body.rfind("}]")) {
        (Some(start), Some(end)) if start < end => &body[start..end + 2],
        _ => return Err(MessageError::NoPayload),
    };

    let (event, data): (String, Value) = serde_json::from_str(payload)?;
    if event != "telemetry" {
        return Ok(Inbound::Other(event));
    }

    let message: TelemetryMessage = serde_json::from_value(data)?;
    if message.ptsx.len() != message.ptsy.len() {
        return Err(MessageError::LengthMismatch {
            ptsx: message.ptsx.len(),
            ptsy: message.ptsy.len(),
        });
    }
    Ok(Inbound::Telemetry(message))
}

pub fn encode_steer(output: &TickOutput) -> Result<String, MessageError> {
    let (mpc_x, mpc_y) = output.predicted.iter().cloned().unzip();
    let (next_x, next_y) = output.waypoints.iter().cloned().unzip();
    let message = SteerMessage {
        steering_angle: output.command.steering_angle,
        throttle: output.command.throttle,
        mpc_x,
        mpc_y,
        next_x,
        next_y,
    };
    Ok(format!("{}{}", EVENT_PREFIX, serde_json::to_string(&("steer", message))?))
}
