//! Kinship (genetic relatedness) matrices.
//!
//! Both estimators process markers in blocks: each block contributes an
//! N x N partial product, partial products from different blocks are
//! summed with a rayon fold/reduce, and the sum is symmetrised at the
//! end. Per thread, memory is bounded by the accumulator plus one
//! block of N x block_size values.

pub mod cache;
pub mod ibs;
pub mod vanraden;

use panicle_geno::GenotypeMatrix;
use panicle_linalg::DenseMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GwasError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KinshipMethod {
    VanRaden,
    Ibs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KinshipConfig {
    pub method: KinshipMethod,
    /// Markers per accumulation block.
    pub block_size: usize,
}

impl Default for KinshipConfig {
    fn default() -> Self {
        Self {
            method: KinshipMethod::VanRaden,
            block_size: 1000,
        }
    }
}

impl KinshipConfig {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(GwasError::config("kinship block_size must be at least 1"));
        }
        Ok(())
    }
}

/// Symmetric N x N relatedness matrix, optionally labelled with individual IDs.
#[derive(Debug, Clone)]
pub struct KinshipMatrix {
    matrix: DenseMatrix,
    ids: Option<Vec<String>>,
}

impl KinshipMatrix {
    /// Wrap a square matrix, symmetrising it.
    pub fn from_dense(mut matrix: DenseMatrix) -> Result<Self> {
        if matrix.nrows() != matrix.ncols() {
            return Err(GwasError::DataAlignment {
                what: "kinship matrix columns".to_string(),
                expected: matrix.nrows(),
                got: matrix.ncols(),
            });
        }
        if matrix.max_asymmetry() > 0.0 {
            matrix.symmetrize();
        }
        Ok(Self { matrix, ids: None })
    }

    /// Attach individual IDs (one per row).
    pub fn with_ids(mut self, ids: Vec<String>) -> Result<Self> {
        if ids.len() != self.n() {
            return Err(GwasError::DataAlignment {
                what: "kinship individual IDs".to_string(),
                expected: self.n(),
                got: ids.len(),
            });
        }
        self.ids = Some(ids);
        Ok(self)
    }

    pub fn n(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix.get(i, j)
    }

    pub fn ids(&self) -> Option<&[String]> {
        self.ids.as_deref()
    }

    pub fn as_dense(&self) -> &DenseMatrix {
        &self.matrix
    }

    pub fn diag_mean(&self) -> f64 {
        let n = self.n();
        if n == 0 {
            return 0.0;
        }
        self.matrix.diag().iter().sum::<f64>() / n as f64
    }

    /// Principal submatrix for the given individuals, in the given order.
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n()) {
            return Err(GwasError::DataAlignment {
                what: format!("kinship subset index {}", bad),
                expected: self.n(),
                got: bad + 1,
            });
        }
        Ok(Self {
            matrix: self.matrix.select(indices, indices),
            ids: self
                .ids
                .as_ref()
                .map(|ids| indices.iter().map(|&i| ids[i].clone()).collect()),
        })
    }
}

/// Builds kinship matrices from genotypes.
#[derive(Debug, Clone, Default)]
pub struct KinshipEngine {
    config: KinshipConfig,
}

impl KinshipEngine {
    pub fn new(config: KinshipConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn build(&self, genotypes: &GenotypeMatrix) -> Result<KinshipMatrix> {
        let n = genotypes.n_individuals();
        if n == 0 {
            return Err(GwasError::config("cannot build a kinship matrix for zero individuals"));
        }
        info!(
            "Computing {:?} kinship: {} individuals x {} markers",
            self.config.method,
            n,
            genotypes.n_markers()
        );
        let mut matrix = match self.config.method {
            KinshipMethod::VanRaden => vanraden::vanraden(genotypes, self.config.block_size)?,
            KinshipMethod::Ibs => ibs::ibs(genotypes, self.config.block_size),
        };
        let asym = matrix.max_asymmetry();
        if asym > 0.0 {
            debug!("Symmetrising kinship (max asymmetry {:.3e})", asym);
            matrix.symmetrize();
        }
        KinshipMatrix::from_dense(matrix)
    }
}

/// Sum of `Z_b Z_b'` over marker blocks, where `column` maps one marker's
/// calls to its transformed column and a weight (or `None` to skip it).
/// Returns the accumulated matrix and the summed weights.
pub(crate) fn blockwise_gram<F>(
    genotypes: &GenotypeMatrix,
    block_size: usize,
    column: F,
) -> (DenseMatrix, f64)
where
    F: Fn(&[i8]) -> Option<(Vec<f64>, f64)> + Sync,
{
    let n = genotypes.n_individuals();
    let m = genotypes.n_markers();
    let block_size = block_size.max(1);
    let n_blocks = m.div_ceil(block_size);

    (0..n_blocks)
        .into_par_iter()
        .fold(
            || (DenseMatrix::zeros(n, n), 0.0),
            |(mut acc, mut weight), b| {
                let start = b * block_size;
                let end = (start + block_size).min(m);
                let mut cols = Vec::with_capacity(end - start);
                for j in start..end {
                    if let Some((col, w)) = column(genotypes.column(j)) {
                        cols.push(col);
                        weight += w;
                    }
                }
                if !cols.is_empty() {
                    acc.add_assign(&DenseMatrix::from_columns(n, &cols).gram());
                }
                (acc, weight)
            },
        )
        .reduce(
            || (DenseMatrix::zeros(n, n), 0.0),
            |(mut a, wa), (b, wb)| {
                a.add_assign(&b);
                (a, wa + wb)
            },
        )
}
