use control_model::{Actuation, ControlModel, State};
use prelude::*;

/// Predicts the state at the moment a command issued now takes effect.
///
/// The previously issued actuation keeps acting over the whole delay.
pub fn compensate<M: ControlModel>(model: &M, measured: &State, previous: &Actuation, delay: float) -> State {
    if delay <= 0.0 {
        return *measured;
    }
    model.step_state(delay, measured, previous)
}
