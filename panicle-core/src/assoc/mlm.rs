//! Mixed linear model scan.
//!
//! With V = s2g (K + delta I) and K = U diag(lambda) U', the GLS problem
//! y ~ X b + g beta becomes ordinary least squares after mapping every
//! vector v to diag(1/sqrt(lambda + delta)) U' v. Marker blocks are
//! rotated with a single dense product per batch, so the per-marker cost
//! is the same as GLM plus one share of U' G.

use std::sync::Arc;

use panicle_geno::GenotypeMatrix;
use panicle_linalg::DenseMatrix;
use tracing::info;

use super::ols::NullModel;
use super::{scan_markers, ScanConfig, ScanResult, TestSpace};
use crate::cancel::CancellationToken;
use crate::design::{validate_inputs, FixedEffects};
use crate::error::{GwasError, Result};
use crate::mixed::{KinshipEigen, VarianceComponents};

/// Eigenbasis whitening for a fixed delta.
pub(crate) struct Whitening {
    eigen: Arc<KinshipEigen>,
    weights: Vec<f64>,
}

impl Whitening {
    pub(crate) fn new(vc: &VarianceComponents) -> Self {
        Self {
            eigen: Arc::clone(vc.eigen()),
            weights: vc.whitening_weights(),
        }
    }
}

impl TestSpace for Whitening {
    fn map_block(&self, block: DenseMatrix) -> DenseMatrix {
        let mut rotated = self.eigen.rotate_block(&block);
        for j in 0..rotated.ncols() {
            for (i, w) in self.weights.iter().enumerate() {
                rotated.set(i, j, rotated.get(i, j) * w);
            }
        }
        rotated
    }

    fn map_vec(&self, v: &[f64]) -> Vec<f64> {
        self.eigen
            .rotate(v)
            .into_iter()
            .zip(&self.weights)
            .map(|(a, w)| a * w)
            .collect()
    }
}

/// Per-marker generalized least squares scanner.
#[derive(Debug, Clone, Default)]
pub struct MlmScanner {
    config: ScanConfig,
}

impl MlmScanner {
    pub fn new(config: ScanConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn scan(
        &self,
        genotypes: &GenotypeMatrix,
        phenotype: &[f64],
        covariates: Option<&DenseMatrix>,
        vc: &VarianceComponents,
    ) -> Result<ScanResult> {
        self.scan_with_cancel(genotypes, phenotype, covariates, vc, None)
    }

    pub fn scan_with_cancel(
        &self,
        genotypes: &GenotypeMatrix,
        phenotype: &[f64],
        covariates: Option<&DenseMatrix>,
        vc: &VarianceComponents,
        cancel: Option<&CancellationToken>,
    ) -> Result<ScanResult> {
        validate_inputs(genotypes, phenotype, covariates)?;
        if vc.eigen().n() != genotypes.n_individuals() {
            return Err(GwasError::DataAlignment {
                what: "variance components".to_string(),
                expected: genotypes.n_individuals(),
                got: vc.eigen().n(),
            });
        }
        let fixed = FixedEffects::new(genotypes.n_individuals(), covariates, self.config.rank_tol)?;
        info!(
            "MLM scan: {} individuals, {} markers, delta = {:.4e}",
            genotypes.n_individuals(),
            genotypes.n_markers(),
            vc.delta
        );
        Ok(self.scan_fixed(genotypes, phenotype, &fixed, vc, cancel))
    }

    pub(crate) fn scan_fixed(
        &self,
        genotypes: &GenotypeMatrix,
        phenotype: &[f64],
        fixed: &FixedEffects,
        vc: &VarianceComponents,
        cancel: Option<&CancellationToken>,
    ) -> ScanResult {
        let space = Whitening::new(vc);
        let null = self.null_model(&space, phenotype, fixed.columns());
        let mut scan = scan_markers(&space, &null, genotypes, &self.config, cancel);
        let mut warnings = vc.warnings.clone();
        warnings.append(&mut scan.warnings);
        scan.warnings = warnings;
        scan
    }

    fn null_model(&self, space: &Whitening, phenotype: &[f64], columns: &[Vec<f64>]) -> NullModel {
        let n = phenotype.len();
        let mapped = space.map_block(DenseMatrix::from_columns(n, columns));
        let columns = (0..mapped.ncols()).map(|j| mapped.col(j)).collect();
        NullModel::fit(n, columns, &space.map_vec(phenotype), self.config.rank_tol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assoc::GlmScanner;
    use crate::kinship::{KinshipConfig, KinshipEngine};

    fn data() -> (GenotypeMatrix, Vec<f64>) {
        let cols: Vec<Vec<i8>> = (0..6)
            .map(|j| (0..20).map(|i| ((i * (j + 2) + j) % 3) as i8).collect())
            .collect();
        let g = GenotypeMatrix::from_columns(20, cols).unwrap();
        let y: Vec<f64> = (0..20)
            .map(|i| g.column(0)[i] as f64 * 0.8 + ((i * 7) % 5) as f64 * 0.3)
            .collect();
        (g, y)
    }

    #[test]
    fn test_large_delta_matches_glm() {
        let (g, y) = data();
        let kin = KinshipEngine::new(KinshipConfig::default()).unwrap().build(&g).unwrap();
        let mut warnings = Vec::new();
        let eigen = Arc::new(KinshipEigen::new(&kin, &mut warnings).unwrap());
        let vc = VarianceComponents::from_delta(eigen, 1e12, 1.0);

        let glm = GlmScanner::default().scan(&g, &y, None).unwrap();
        let mlm = MlmScanner::default().scan(&g, &y, None, &vc).unwrap();
        for (a, b) in glm.results.iter().zip(&mlm.results) {
            assert_eq!(a.is_missing(), b.is_missing());
            if !a.is_missing() {
                assert!((a.pvalue - b.pvalue).abs() < 1e-8, "{} vs {}", a.pvalue, b.pvalue);
                assert!((a.effect - b.effect).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn test_mismatched_components_rejected() {
        let (g, y) = data();
        let sub = g.subset_individuals(&(0..10).collect::<Vec<_>>()).unwrap();
        let kin = KinshipEngine::default().build(&sub).unwrap();
        let mut warnings = Vec::new();
        let eigen = Arc::new(KinshipEigen::new(&kin, &mut warnings).unwrap());
        let vc = VarianceComponents::from_delta(eigen, 1.0, 1.0);
        let err = MlmScanner::default().scan(&g, &y, None, &vc).unwrap_err();
        assert!(matches!(err, GwasError::DataAlignment { .. }));
    }
}
