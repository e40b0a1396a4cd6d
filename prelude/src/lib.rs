pub use flame;
pub use nalgebra;

#[allow(non_camel_case_types)]
pub type float = f64;
pub use std::f64::consts::PI;
pub use std::f64::{INFINITY, NEG_INFINITY};

pub type Matrix<R, C> = nalgebra::OMatrix<float, R, C>;
pub type Vector<N> = nalgebra::OVector<float, N>;

pub use nalgebra::{DMatrix, DVector};

pub fn min<T: Copy + PartialOrd>(a: T, b: T) -> T {
    if b < a {
        b
    } else {
        a
    }
}

pub fn max<T: Copy + PartialOrd>(a: T, b: T) -> T {
    if b > a {
        b
    } else {
        a
    }
}

/// Limits `v` to `[lo, hi]`. NaN maps to the middle of the range.
pub fn clamp(v: float, lo: float, hi: float) -> float {
    if v.is_nan() {
        return 0.5 * (lo + hi);
    }
    min(max(v, lo), hi)
}

/// Wraps an angle into `(-PI, PI]`.
pub fn wrap_angle(mut a: float) -> float {
    if !a.is_finite() {
        return a;
    }
    while a > PI {
        a -= 2.0 * PI;
    }
    while a <= -PI {
        a += 2.0 * PI;
    }
    a
}

pub fn duration_to_secs(d: std::time::Duration) -> float {
    d.as_secs() as float + float::from(d.subsec_nanos()) * 1e-9
}
