//! Dirichlet boundary conditions on solid degrees of freedom.
//!
//! Projection replaces each constrained row of a system with the identity row
//! and zeroes the matching right-hand side entry,
//! so the solution of a projected system is zero on the constrained DOFs.
//! Applying a projection twice gives the same result as applying it once.

use fixedbitset as fb;
use nalgebra as na;
use nalgebra_sparse as nas;

/// A set of DOFs held fixed at zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirichletBc {
    dofs: fb::FixedBitSet,
}

impl DirichletBc {
    /// Constrain the given DOFs out of `num_dofs`.
    ///
    /// Panics if a DOF index is out of range.
    pub fn new(num_dofs: usize, dofs: impl IntoIterator<Item = usize>) -> Self {
        let mut set = fb::FixedBitSet::with_capacity(num_dofs);
        for dof in dofs {
            set.insert(dof);
        }
        Self { dofs: set }
    }

    /// No constrained DOFs.
    pub fn none(num_dofs: usize) -> Self {
        Self {
            dofs: fb::FixedBitSet::with_capacity(num_dofs),
        }
    }

    /// Whether `dof` is constrained.
    #[inline]
    pub fn contains(&self, dof: usize) -> bool {
        self.dofs.contains(dof)
    }

    /// Iterate over the constrained DOF indices in increasing order.
    pub fn dofs(&self) -> impl '_ + Iterator<Item = usize> {
        self.dofs.ones()
    }

    /// Number of constrained DOFs.
    pub fn len(&self) -> usize {
        self.dofs.count_ones(..)
    }

    /// Whether no DOFs are constrained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero the constrained entries of a vector.
    pub fn apply_vector(&self, vec: &mut na::DVector<f64>) {
        for dof in self.dofs.ones() {
            vec[dof] = 0.0;
        }
    }

    /// Like [`apply_vector`][Self::apply_vector], but consuming and returning the vector.
    pub fn applied(&self, mut vec: na::DVector<f64>) -> na::DVector<f64> {
        self.apply_vector(&mut vec);
        vec
    }

    /// Replace the constrained rows of a square matrix with identity rows.
    pub fn apply_matrix(&self, mat: &nas::CsrMatrix<f64>) -> nas::CsrMatrix<f64> {
        constrain_rows(mat, &self.dofs)
    }

    /// Project a whole linear system `mat x = rhs`.
    pub fn apply_system(
        &self,
        mat: &nas::CsrMatrix<f64>,
        rhs: &mut na::DVector<f64>,
    ) -> nas::CsrMatrix<f64> {
        self.apply_vector(rhs);
        self.apply_matrix(mat)
    }
}

/// Rebuild a CSR matrix with the given rows replaced by identity rows.
fn constrain_rows(mat: &nas::CsrMatrix<f64>, rows: &fb::FixedBitSet) -> nas::CsrMatrix<f64> {
    let mut coo = nas::CooMatrix::new(mat.nrows(), mat.ncols());
    for (row_idx, row) in mat.row_iter().enumerate() {
        if rows.contains(row_idx) {
            // only rows with a diagonal entry get one
            if row_idx < mat.ncols() {
                coo.push(row_idx, row_idx, 1.0);
            }
            continue;
        }
        for (&col_idx, &val) in row.col_indices().iter().zip(row.values()) {
            coo.push(row_idx, col_idx, val);
        }
    }
    nas::CsrMatrix::from(&coo)
}
