//! Small helpers for the sparse matrices passed around by residual providers.

use nalgebra as na;
use nalgebra_sparse as nas;

use crate::{Error, Result};

/// Solve `mat x = rhs` with a dense LU factorization.
///
/// The systems in this crate are small enough that densifying them
/// costs less than a sparse factorization would save.
/// `context` names the solve in the error if the matrix is singular.
pub fn solve(
    mat: &nas::CsrMatrix<f64>,
    rhs: &na::DVector<f64>,
    context: &'static str,
) -> Result<na::DVector<f64>> {
    let dense = nas::convert::serial::convert_csr_dense(mat);
    let sol = dense
        .lu()
        .solve(rhs)
        .ok_or(Error::SingularSystem { context })?;
    if sol.iter().any(|x| !x.is_finite()) {
        return Err(Error::SingularSystem { context });
    }
    Ok(sol)
}

/// A copy of `mat` with every entry multiplied by `scale`.
pub fn scaled(mat: &nas::CsrMatrix<f64>, scale: f64) -> nas::CsrMatrix<f64> {
    let mut out = mat.clone();
    for val in out.values_mut() {
        *val *= scale;
    }
    out
}

/// A square diagonal matrix.
pub fn diagonal(diag: &na::DVector<f64>) -> nas::CsrMatrix<f64> {
    let mut coo = nas::CooMatrix::new(diag.len(), diag.len());
    for (i, &val) in diag.iter().enumerate() {
        if val != 0.0 {
            coo.push(i, i, val);
        }
    }
    nas::CsrMatrix::from(&coo)
}

/// Compute `mat^T x` without forming the transpose twice at call sites.
pub fn transpose_mul(mat: &nas::CsrMatrix<f64>, x: &na::DVector<f64>) -> na::DVector<f64> {
    let mut out = na::DVector::zeros(mat.ncols());
    for (row, &x_row) in mat.row_iter().zip(x.iter()) {
        for (&col, &val) in row.col_indices().iter().zip(row.values()) {
            out[col] += val * x_row;
        }
    }
    out
}
