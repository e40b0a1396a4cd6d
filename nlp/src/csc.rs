use osqp::CscMatrix;
use prelude::*;

/// Converts a dense matrix to compressed sparse column form, dropping exact zeros.
///
/// With `upper_triangular` set only entries on or above the diagonal are kept, as OSQP expects
/// for the quadratic cost matrix.
pub fn from_dense(m: &DMatrix<float>, upper_triangular: bool) -> CscMatrix<'static> {
    let (nrows, ncols) = m.shape();
    let mut indptr = Vec::with_capacity(ncols + 1);
    let mut indices = Vec::new();
    let mut data = Vec::new();

    indptr.push(0);
    for c in 0..ncols {
        let last_row = if upper_triangular {
            min(c + 1, nrows)
        } else {
            nrows
        };
        for r in 0..last_row {
            let v = m[(r, c)];
            if v != 0.0 {
                indices.push(r);
                data.push(v);
            }
        }
        indptr.push(indices.len());
    }

    CscMatrix {
        nrows,
        ncols,
        indptr: indptr.into(),
        indices: indices.into(),
        data: data.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upper_triangle_only() {
        #[rustfmt::skip]
        let m = DMatrix::from_row_slice(3, 3, &[
            4.0, 1.0, 0.0,
            1.0, 3.0, 2.0,
            0.0, 2.0, 5.0,
        ]);

        let csc = from_dense(&m, true);
        assert_eq!((csc.nrows, csc.ncols), (3, 3));
        assert_eq!(&csc.indptr[..], &[0, 1, 3, 5]);
        assert_eq!(&csc.indices[..], &[0, 0, 1, 1, 2]);
        assert_eq!(&csc.data[..], &[4.0, 1.0, 3.0, 2.0, 5.0]);
    }

    #[test]
    fn rectangular_full() {
        #[rustfmt::skip]
        let m = DMatrix::from_row_slice(2, 3, &[
            0.0, 7.0, 0.0,
            1.0, 0.0, 0.0,
        ]);

        let csc = from_dense(&m, false);
        assert_eq!(&csc.indptr[..], &[0, 1, 2, 2]);
        assert_eq!(&csc.indices[..], &[1, 0]);
        assert_eq!(&csc.data[..], &[1.0, 7.0]);
    }
}
