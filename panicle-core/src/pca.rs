//! Principal components for population-structure control.
//!
//! Each marker is standardised to mean 0 and unit sample variance over
//! its observed calls (missing calls become 0, monomorphic markers are
//! skipped). The top-k eigenvectors of Z Z' are the left singular
//! vectors of Z, so only an N x N matrix is ever formed.
//!
//! Components are only defined up to sign. To make repeated runs
//! comparable, each component is flipped so that its largest-magnitude
//! entry is positive; callers comparing against other tools must still
//! allow for sign flips.

use panicle_geno::{GenotypeMatrix, MISSING_GENOTYPE};
use panicle_linalg::decomposition::symmetric_eigen;
use panicle_linalg::DenseMatrix;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GwasError, Result};
use crate::kinship::{blockwise_gram, KinshipMatrix};
use crate::util::stats::mean_sd;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    pub n_components: usize,
    pub block_size: usize,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            n_components: 3,
            block_size: 1000,
        }
    }
}

impl PcaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(GwasError::config("number of principal components must be at least 1"));
        }
        if self.block_size == 0 {
            return Err(GwasError::config("PCA block_size must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PcaResult {
    /// N x k matrix, one column per component.
    pub components: DenseMatrix,
    /// Top-k eigenvalues, descending.
    pub eigenvalues: Vec<f64>,
    /// Share of total variance carried by each component.
    pub variance_explained: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct PcaEngine {
    config: PcaConfig,
}

impl PcaEngine {
    pub fn new(config: PcaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Components of the standardised genotype matrix.
    pub fn compute(&self, genotypes: &GenotypeMatrix) -> Result<PcaResult> {
        let n = genotypes.n_individuals();
        self.check_k(n)?;
        info!(
            "PCA: {} components from {} individuals x {} markers",
            self.config.n_components,
            n,
            genotypes.n_markers()
        );
        let (zzt, used) = blockwise_gram(genotypes, self.config.block_size, standardized_column);
        if used == 0.0 {
            return Err(GwasError::config("PCA needs at least one polymorphic marker"));
        }
        top_components(&zzt, self.config.n_components)
    }

    /// Components from the eigenvectors of a kinship matrix.
    pub fn compute_from_kinship(&self, kinship: &KinshipMatrix) -> Result<PcaResult> {
        self.check_k(kinship.n())?;
        info!("PCA: {} components from {}x{} kinship", self.config.n_components, kinship.n(), kinship.n());
        top_components(kinship.as_dense(), self.config.n_components)
    }

    fn check_k(&self, n: usize) -> Result<()> {
        if self.config.n_components > n {
            return Err(GwasError::config(format!(
                "requested {} principal components but only {} individuals",
                self.config.n_components, n
            )));
        }
        Ok(())
    }
}

fn standardized_column(calls: &[i8]) -> Option<(Vec<f64>, f64)> {
    let observed: Vec<f64> = calls
        .iter()
        .filter(|&&g| g != MISSING_GENOTYPE)
        .map(|&g| g as f64)
        .collect();
    let (mean, sd) = mean_sd(&observed);
    if sd <= 0.0 {
        return None;
    }
    let z = calls
        .iter()
        .map(|&g| if g == MISSING_GENOTYPE { 0.0 } else { (g as f64 - mean) / sd })
        .collect();
    Some((z, 1.0))
}

fn top_components(matrix: &DenseMatrix, k: usize) -> Result<PcaResult> {
    let n = matrix.nrows();
    let evd = symmetric_eigen(matrix)?;
    let total: f64 = evd.values.iter().map(|v| v.max(0.0)).sum();

    let mut components = DenseMatrix::zeros(n, k);
    for c in 0..k {
        let mut v = evd.vectors.col(c);
        let pivot = v
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap_or(0);
        if v.get(pivot).is_some_and(|&x| x < 0.0) {
            v.iter_mut().for_each(|x| *x = -*x);
        }
        components.set_col(c, &v);
    }

    let eigenvalues: Vec<f64> = evd.values[..k].to_vec();
    let variance_explained = eigenvalues
        .iter()
        .map(|&v| if total > 0.0 { v.max(0.0) / total } else { 0.0 })
        .collect();

    Ok(PcaResult {
        components,
        eigenvalues,
        variance_explained,
    })
}
