use prelude::*;

/// A vehicle-centred frame: `origin` and `heading` of the vehicle expressed in the world frame.
///
/// Local x points forward along the heading, local y to the left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frame {
    pub origin: (float, float),
    pub heading: float,
}

impl Frame {
    pub fn new(origin: (float, float), heading: float) -> Frame {
        Frame { origin, heading }
    }

    pub fn to_local(&self, (x, y): (float, float)) -> (float, float) {
        let dx = x - self.origin.0;
        let dy = y - self.origin.1;
        let (sin_h, cos_h) = self.heading.sin_cos();
        (dx * cos_h + dy * sin_h, -dx * sin_h + dy * cos_h)
    }

    pub fn to_world(&self, (x, y): (float, float)) -> (float, float) {
        let (sin_h, cos_h) = self.heading.sin_cos();
        (
            x * cos_h - y * sin_h + self.origin.0,
            x * sin_h + y * cos_h + self.origin.1,
        )
    }

    pub fn points_to_local(&self, points: &[(float, float)]) -> Vec<(float, float)> {
        points.iter().map(|&p| self.to_local(p)).collect()
    }

    pub fn points_to_world(&self, points: &[(float, float)]) -> Vec<(float, float)> {
        points.iter().map(|&p| self.to_world(p)).collect()
    }
}
