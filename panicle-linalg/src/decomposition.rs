#![allow(clippy::needless_range_loop)]
//! Matrix decompositions and solvers.
//!
//! A rank-revealing Gram-Schmidt basis for fixed-effect designs, the
//! symmetric eigendecomposition (via faer) that the mixed model uses to
//! diagonalise the kinship matrix, and a plain Cholesky factorisation
//! for small symmetric positive definite systems.

use crate::dense::DenseMatrix;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Eigendecomposition produced non-finite values")]
    EigenFailed,
}

/// Result of a Cholesky decomposition.
pub struct CholeskyDecomp {
    /// Lower triangular factor L such that A = L * L'.
    pub l: DenseMatrix,
}

impl CholeskyDecomp {
    /// Compute the Cholesky decomposition of a symmetric positive definite matrix.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }
        let mut l = DenseMatrix::zeros(n, n);

        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l.get(j, k) * l.get(j, k);
            }
            let diag = a.get(j, j) - sum;
            if diag <= 0.0 || !diag.is_finite() {
                return Err(LinalgError::NotPositiveDefinite);
            }
            l.set(j, j, diag.sqrt());

            for i in (j + 1)..n {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l.get(i, k) * l.get(j, k);
                }
                l.set(i, j, (a.get(i, j) - sum) / l.get(j, j));
            }
        }

        Ok(CholeskyDecomp { l })
    }

    /// Solve L * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.l.nrows();
        assert_eq!(b.len(), n);

        // Forward substitution: L * y = b
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += self.l.get(i, j) * y[j];
            }
            y[i] = (b[i] - sum) / self.l.get(i, i);
        }

        // Backward substitution: L' * x = y
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += self.l.get(j, i) * x[j];
            }
            x[i] = (y[i] - sum) / self.l.get(i, i);
        }

        x
    }

    /// log |A| = 2 * sum(log L_ii).
    pub fn log_det(&self) -> f64 {
        (0..self.l.nrows()).map(|i| self.l.get(i, i).ln()).sum::<f64>() * 2.0
    }
}

/// Orthonormal basis for the column space of a design matrix.
///
/// Built with modified Gram-Schmidt. A column whose residual norm after
/// orthogonalisation falls below `rel_tol` times its original norm is
/// linearly dependent on the earlier columns and is dropped, so `rank()`
/// is the numerical rank and `kept()` lists the surviving columns.
#[derive(Debug, Clone)]
pub struct OrthonormalBasis {
    nrows: usize,
    /// Orthonormal columns q_1..q_r, each of length nrows.
    q: Vec<Vec<f64>>,
    /// Norm of each kept column after orthogonalisation (diagonal of R).
    r_diag: Vec<f64>,
    kept: Vec<usize>,
}

impl OrthonormalBasis {
    /// Build the basis from the columns of `a`.
    pub fn new(a: &DenseMatrix, rel_tol: f64) -> Self {
        let columns: Vec<Vec<f64>> = (0..a.ncols()).map(|j| a.col(j)).collect();
        Self::from_columns(a.nrows(), columns, rel_tol)
    }

    /// Build the basis from owned column vectors.
    pub fn from_columns(nrows: usize, columns: Vec<Vec<f64>>, rel_tol: f64) -> Self {
        let mut basis = OrthonormalBasis {
            nrows,
            q: Vec::with_capacity(columns.len()),
            r_diag: Vec::with_capacity(columns.len()),
            kept: Vec::with_capacity(columns.len()),
        };
        for (j, col) in columns.into_iter().enumerate() {
            if basis.push(col, rel_tol).is_some() {
                basis.kept.push(j);
            }
        }
        basis
    }

    /// Orthogonalise `col` against the basis and append it if it adds a
    /// new direction. Returns the residual norm when the column was kept.
    pub fn push(&mut self, mut col: Vec<f64>, rel_tol: f64) -> Option<f64> {
        assert_eq!(col.len(), self.nrows);
        let original = DenseMatrix::dot(&col, &col).sqrt();
        if original == 0.0 || !original.is_finite() {
            return None;
        }
        self.orthogonalise(&mut col);
        // Second pass restores orthogonality lost to cancellation.
        self.orthogonalise(&mut col);
        let norm = DenseMatrix::dot(&col, &col).sqrt();
        if norm <= rel_tol * original {
            return None;
        }
        for v in col.iter_mut() {
            *v /= norm;
        }
        self.q.push(col);
        self.r_diag.push(norm);
        Some(norm)
    }

    fn orthogonalise(&self, col: &mut [f64]) {
        for qj in &self.q {
            let r = DenseMatrix::dot(qj, col);
            for (c, q) in col.iter_mut().zip(qj.iter()) {
                *c -= r * q;
            }
        }
    }

    /// Numerical rank of the design.
    pub fn rank(&self) -> usize {
        self.q.len()
    }

    /// Indices of the input columns that were kept.
    pub fn kept(&self) -> &[usize] {
        &self.kept
    }

    /// log |A'A| over the kept columns = 2 * sum(log R_jj).
    pub fn log_det_gram(&self) -> f64 {
        self.r_diag.iter().map(|r| r.ln()).sum::<f64>() * 2.0
    }

    /// Residual of `v` after projection onto the basis: (I - QQ') v.
    pub fn residualize(&self, v: &[f64]) -> Vec<f64> {
        let mut out = v.to_vec();
        self.orthogonalise(&mut out);
        out
    }
}

/// Eigendecomposition of a symmetric matrix: A = U diag(values) U'.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    /// Eigenvalues in descending order.
    pub values: Vec<f64>,
    /// Eigenvectors as columns, ordered like `values`.
    pub vectors: DenseMatrix,
}

/// Compute eigenvalues and eigenvectors of a symmetric matrix.
///
/// Only the lower triangle is read. Eigenvalues are returned in
/// descending order with matching eigenvector columns.
pub fn symmetric_eigen(a: &DenseMatrix) -> Result<SymmetricEigen, LinalgError> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(LinalgError::DimensionMismatch {
            expected: n,
            got: a.ncols(),
        });
    }

    let evd = a.as_faer().selfadjoint_eigendecomposition(faer::Side::Lower);
    let s = evd.s();
    let u = evd.u();

    // faer returns ascending eigenvalues; reverse to descending.
    let values: Vec<f64> = (0..n).rev().map(|i| s.column_vector().read(i)).collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::EigenFailed);
    }
    let vectors = DenseMatrix::from_fn(n, n, |i, j| u.read(i, n - 1 - j));

    Ok(SymmetricEigen { values, vectors })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cholesky() {
        // A = [[4, 2], [2, 3]]
        let a = DenseMatrix::from_row_major(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let chol = CholeskyDecomp::new(&a).unwrap();
        // L should be [[2, 0], [1, sqrt(2)]]
        assert!((chol.l.get(0, 0) - 2.0).abs() < 1e-10);
        assert!((chol.l.get(1, 0) - 1.0).abs() < 1e-10);
        assert!((chol.l.get(1, 1) - 2.0f64.sqrt()).abs() < 1e-10);
        // |A| = 12 - 4 = 8
        assert!((chol.log_det() - 8.0f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn test_cholesky_solve() {
        let a = DenseMatrix::from_row_major(3, 3, &[4.0, 2.0, 1.0, 2.0, 5.0, 3.0, 1.0, 3.0, 6.0]);
        let b = vec![1.0, 2.0, 3.0];
        let chol = CholeskyDecomp::new(&a).unwrap();
        let x = chol.solve(&b);
        let ax = a.mat_vec(&x);
        for i in 0..3 {
            assert!(
                (ax[i] - b[i]).abs() < 1e-10,
                "ax[{}]={} != b[{}]={}",
                i,
                ax[i],
                i,
                b[i]
            );
        }
    }

    #[test]
    fn test_cholesky_not_pd() {
        let a = DenseMatrix::from_row_major(2, 2, &[1.0, 3.0, 3.0, 1.0]);
        assert!(CholeskyDecomp::new(&a).is_err());
    }

    #[test]
    fn test_basis_drops_dependent_column() {
        // Third column = first + second.
        let a = DenseMatrix::from_row_major(
            4,
            3,
            &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 2.0, 3.0, 1.0, 3.0, 4.0],
        );
        let basis = OrthonormalBasis::new(&a, 1e-8);
        assert_eq!(basis.rank(), 2);
        assert_eq!(basis.kept(), &[0, 1]);

        // A column in the span has zero residual.
        let r = basis.residualize(&[2.0, 3.0, 4.0, 5.0]);
        assert!(r.iter().all(|v| v.abs() < 1e-10), "residual {:?}", r);
    }

    #[test]
    fn test_basis_residual_is_orthogonal() {
        let a = DenseMatrix::from_row_major(3, 2, &[1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let basis = OrthonormalBasis::new(&a, 1e-8);
        let b = vec![1.0, 2.0, 2.0];
        let r = basis.residualize(&b);
        // Normal equations: A' r = 0
        let atr = a.t_mat_vec(&r);
        for v in atr {
            assert!(v.abs() < 1e-10);
        }
        // log|A'A| matches Cholesky of A'A
        let ata = a.transpose().mat_mul(&a);
        let chol = CholeskyDecomp::new(&ata).unwrap();
        assert!((basis.log_det_gram() - chol.log_det()).abs() < 1e-10);
    }

    #[test]
    fn test_eigenvalues() {
        let a = DenseMatrix::from_row_major(2, 2, &[3.0, 1.0, 1.0, 3.0]);
        let evals = symmetric_eigen(&a).unwrap().values;
        assert!((evals[0] - 4.0).abs() < 1e-10);
        assert!((evals[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_eigen_reconstructs_matrix() {
        let a = DenseMatrix::from_row_major(3, 3, &[4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0]);
        let evd = symmetric_eigen(&a).unwrap();
        assert!(evd.values[0] >= evd.values[1] && evd.values[1] >= evd.values[2]);
        let n = 3;
        for i in 0..n {
            for j in 0..n {
                let mut s = 0.0;
                for k in 0..n {
                    s += evd.vectors.get(i, k) * evd.values[k] * evd.vectors.get(j, k);
                }
                assert!((s - a.get(i, j)).abs() < 1e-10, "({},{}) {} vs {}", i, j, s, a.get(i, j));
            }
        }
    }
}
