use prelude::*;
use thiserror::Error;

/// The ways a least squares fit of the reference path can be undefined.
#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    #[error("{xs} x values but {ys} y values")]
    LengthMismatch { xs: usize, ys: usize },

    #[error("non-finite waypoint coordinate")]
    NonFinite,

    #[error("{distinct} distinct x values, at least 2 are required")]
    TooFewPoints { distinct: usize },

    #[error("waypoints do not determine a degree {degree} polynomial")]
    RankDeficient { degree: usize },
}

/// A polynomial stored lowest-degree coefficient first.
#[derive(Clone, Debug, PartialEq)]
pub struct Polynomial {
    coeffs: Vec<float>,
}

impl Polynomial {
    pub fn new(coeffs: Vec<float>) -> Polynomial {
        assert!(!coeffs.is_empty());
        Polynomial { coeffs }
    }

    pub fn zero(degree: usize) -> Polynomial {
        Polynomial {
            coeffs: vec![0.0; degree + 1],
        }
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    pub fn coefficients(&self) -> &[float] {
        &self.coeffs
    }

    pub fn evaluate(&self, x: float) -> float {
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }

    pub fn derivative(&self, x: float) -> float {
        self.coeffs
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (i, &c)| acc * x + i as float * c)
    }

    pub fn second_derivative(&self, x: float) -> float {
        self.coeffs
            .iter()
            .enumerate()
            .skip(2)
            .rev()
            .fold(0.0, |acc, (i, &c)| acc * x + (i * (i - 1)) as float * c)
    }

    pub fn third_derivative(&self, x: float) -> float {
        self.coeffs
            .iter()
            .enumerate()
            .skip(3)
            .rev()
            .fold(0.0, |acc, (i, &c)| acc * x + (i * (i - 1) * (i - 2)) as float * c)
    }

    /// Least squares fit of a polynomial of the given degree through `(xs[i], ys[i])`.
    ///
    /// Solved through a QR factorisation of the Vandermonde matrix. When the points have fewer
    /// distinct x values than `degree + 1` the highest degree they determine is fitted instead
    /// and the remaining coefficients are zero.
    pub fn fit(xs: &[float], ys: &[float], degree: usize) -> Result<Polynomial, FitError> {
        if xs.len() != ys.len() {
            return Err(FitError::LengthMismatch {
                xs: xs.len(),
                ys: ys.len(),
            });
        }
        if xs.iter().chain(ys).any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite);
        }

        let distinct = count_distinct(xs);
        if distinct < 2 {
            return Err(FitError::TooFewPoints { distinct });
        }

        let fit_degree = min(degree, distinct - 1);
        if fit_degree < degree {
            warn!(
                "{} distinct waypoints only determine a degree {} polynomial",
                distinct, fit_degree
            );
        }

        let n = xs.len();
        let k = fit_degree + 1;
        let mut A = DMatrix::<float>::zeros(n, k);
        for (i, &x) in xs.iter().enumerate() {
            A[(i, 0)] = 1.0;
            for j in 1..k {
                A[(i, j)] = A[(i, j - 1)] * x;
            }
        }
        let b = DVector::from_column_slice(ys);

        let qr = A.qr();
        let r = qr.r();
        let qtb = qr.q().transpose() * b;

        let r_max = r.diagonal().iter().fold(0.0, |acc: float, v| max(acc, v.abs()));
        if r.diagonal().iter().any(|v| v.abs() <= 1e-12 * r_max) {
            return Err(FitError::RankDeficient { degree: fit_degree });
        }

        let solution = r
            .solve_upper_triangular(&qtb)
            .ok_or(FitError::RankDeficient { degree: fit_degree })?;

        let mut coeffs = vec![0.0; degree + 1];
        coeffs[..k].copy_from_slice(solution.as_slice());
        Ok(Polynomial { coeffs })
    }
}

fn count_distinct(xs: &[float]) -> usize {
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut distinct = 0;
    let mut last: Option<float> = None;
    for x in sorted {
        match last {
            Some(l) if (x - l).abs() <= 1e-9 * (1.0 + l.abs()) => {}
            _ => {
                distinct += 1;
                last = Some(x);
            }
        }
    }
    distinct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_and_derivatives() {
        let p = Polynomial::new(vec![1.0, -2.0, 0.5, 0.25]);
        let x = 1.5;
        assert!((p.evaluate(x) - (1.0 - 3.0 + 0.5 * 2.25 + 0.25 * 3.375)).abs() < 1e-12);
        assert!((p.derivative(x) - (-2.0 + 1.5 + 0.75 * 2.25)).abs() < 1e-12);
        assert!((p.second_derivative(x) - (1.0 + 1.5 * 1.5)).abs() < 1e-12);
        assert!((p.third_derivative(x) - 1.5).abs() < 1e-12);
        assert_eq!(Polynomial::new(vec![1.0, 2.0]).third_derivative(x), 0.0);
    }

    #[test]
    fn recovers_known_cubic() {
        let expected = [0.3, -0.12, 0.01, -0.0004];
        let truth = Polynomial::new(expected.to_vec());
        let xs: Vec<float> = (0..6).map(|i| -2.0 + 2.0 * i as float).collect();
        let ys: Vec<float> = xs.iter().map(|&x| truth.evaluate(x)).collect();

        let fitted = Polynomial::fit(&xs, &ys, 3).unwrap();

        assert_eq!(fitted.degree(), 3);
        for (c, e) in fitted.coefficients().iter().zip(&expected) {
            assert!((c - e).abs() < 1e-8, "{:?}", fitted);
        }
    }

    #[test]
    fn least_squares_line_through_noisy_points() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [0.1, 0.9, 2.1, 2.9];
        let fitted = Polynomial::fit(&xs, &ys, 1).unwrap();
        // Normal equations give slope 0.96 and intercept 0.06.
        assert!((fitted.coefficients()[1] - 0.96).abs() < 1e-9);
        assert!((fitted.coefficients()[0] - 0.06).abs() < 1e-9);
    }

    #[test]
    fn few_points_reduce_degree() {
        let xs = [10.0, 20.0, 30.0];
        let ys = [1.0, 2.0, 3.0];
        let fitted = Polynomial::fit(&xs, &ys, 3).unwrap();

        assert_eq!(fitted.coefficients().len(), 4);
        assert_eq!(fitted.coefficients()[3], 0.0);
        for (&x, &y) in xs.iter().zip(&ys) {
            assert!((fitted.evaluate(x) - y).abs() < 1e-9);
        }
    }

    #[test]
    fn underdetermined_fit_fails() {
        assert_eq!(
            Polynomial::fit(&[4.0, 4.0, 4.0], &[1.0, 2.0, 3.0], 3),
            Err(FitError::TooFewPoints { distinct: 1 })
        );
        assert_eq!(
            Polynomial::fit(&[], &[], 3),
            Err(FitError::TooFewPoints { distinct: 0 })
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            Polynomial::fit(&[1.0, 2.0], &[1.0], 1),
            Err(FitError::LengthMismatch { xs: 2, ys: 1 })
        );
        assert_eq!(
            Polynomial::fit(&[1.0, std::f64::NAN], &[1.0, 2.0], 1),
            Err(FitError::NonFinite)
        );
    }
}
