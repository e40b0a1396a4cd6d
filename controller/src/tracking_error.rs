use prelude::*;

use crate::Polynomial;

/// Errors of the vehicle, sitting at the origin of its own frame with zero heading, relative to
/// the reference curve.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackingError {
    /// Signed lateral offset of the curve at the vehicle, positive when the curve is to the left.
    pub cte: float,
    /// Vehicle heading minus the curve's tangent angle.
    pub epsi: float,
}

impl TrackingError {
    pub fn evaluate(reference: &Polynomial) -> TrackingError {
        TrackingError {
            cte: reference.evaluate(0.0),
            epsi: -reference.derivative(0.0).atan(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_curve_has_no_error() {
        let error = TrackingError::evaluate(&Polynomial::zero(3));
        assert_eq!(error.cte, 0.0);
        assert_eq!(error.epsi, 0.0);
    }

    #[test]
    fn offset_and_slope() {
        let error = TrackingError::evaluate(&Polynomial::new(vec![1.5, 1.0, 3.0, -2.0]));
        assert_eq!(error.cte, 1.5);
        assert!((error.epsi + PI / 4.0).abs() < 1e-12);
    }
}
