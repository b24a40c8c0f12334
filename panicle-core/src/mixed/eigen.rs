//! Kinship eigendecomposition, computed once and shared.

use panicle_linalg::decomposition::symmetric_eigen;
use panicle_linalg::DenseMatrix;
use tracing::info;

use crate::error::{record, Result, Warning};
use crate::kinship::KinshipMatrix;

/// Eigenvalues below `-EIGEN_TOL * max(|lambda|)` are reported when clipped.
const EIGEN_TOL: f64 = 1e-8;

/// K = U diag(lambda) U' with lambda clipped to be non-negative.
#[derive(Debug, Clone)]
pub struct KinshipEigen {
    values: Vec<f64>,
    /// U' (rows are eigenvectors), kept transposed for rotating blocks.
    ut: DenseMatrix,
}

impl KinshipEigen {
    /// Decompose `kinship`, clipping negative eigenvalues to zero.
    pub fn new(kinship: &KinshipMatrix, warnings: &mut Vec<Warning>) -> Result<Self> {
        let n = kinship.n();
        info!("Eigendecomposition of {}x{} kinship", n, n);
        let evd = symmetric_eigen(kinship.as_dense())?;

        let scale = evd.values.iter().fold(0.0_f64, |a, v| a.max(v.abs()));
        let tol = EIGEN_TOL * scale.max(1.0);
        let mut clipped = 0usize;
        let mut most_negative = 0.0_f64;
        let values = evd
            .values
            .iter()
            .map(|&v| {
                if v < 0.0 {
                    if v < -tol {
                        clipped += 1;
                        most_negative = most_negative.min(v);
                    }
                    0.0
                } else {
                    v
                }
            })
            .collect();
        if clipped > 0 {
            record(
                warnings,
                Warning::Numerical {
                    message: format!(
                        "clipped {} negative kinship eigenvalue(s) to zero (most negative {:.3e})",
                        clipped, most_negative
                    ),
                },
            );
        }

        Ok(Self {
            values,
            ut: evd.vectors.transpose(),
        })
    }

    pub fn n(&self) -> usize {
        self.values.len()
    }

    /// Clipped eigenvalues, descending.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// U' v.
    pub fn rotate(&self, v: &[f64]) -> Vec<f64> {
        self.ut.mat_vec(v)
    }

    /// U' B for an n x b block.
    pub fn rotate_block(&self, block: &DenseMatrix) -> DenseMatrix {
        self.ut.mat_mul(block)
    }
}
