//! General linear model scan: y = X b + g beta + e, e ~ N(0, s2 I).

use panicle_geno::GenotypeMatrix;
use panicle_linalg::DenseMatrix;
use tracing::info;

use super::ols::NullModel;
use super::{scan_markers, RawSpace, ScanConfig, ScanResult};
use crate::cancel::CancellationToken;
use crate::design::{validate_inputs, FixedEffects};
use crate::error::Result;

/// Per-marker ordinary least squares scanner.
#[derive(Debug, Clone, Default)]
pub struct GlmScanner {
    config: ScanConfig,
}

impl GlmScanner {
    pub fn new(config: ScanConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan every marker with the intercept and `covariates` as fixed effects.
    pub fn scan(
        &self,
        genotypes: &GenotypeMatrix,
        phenotype: &[f64],
        covariates: Option<&DenseMatrix>,
    ) -> Result<ScanResult> {
        self.scan_with_cancel(genotypes, phenotype, covariates, None)
    }

    pub fn scan_with_cancel(
        &self,
        genotypes: &GenotypeMatrix,
        phenotype: &[f64],
        covariates: Option<&DenseMatrix>,
        cancel: Option<&CancellationToken>,
    ) -> Result<ScanResult> {
        validate_inputs(genotypes, phenotype, covariates)?;
        let fixed = FixedEffects::new(genotypes.n_individuals(), covariates, self.config.rank_tol)?;
        info!(
            "GLM scan: {} individuals, {} markers, {} fixed effect(s)",
            genotypes.n_individuals(),
            genotypes.n_markers(),
            fixed.n_columns()
        );
        Ok(self.scan_fixed(genotypes, phenotype, &fixed, cancel))
    }

    /// Scan against an already assembled fixed-effect design.
    pub(crate) fn scan_fixed(
        &self,
        genotypes: &GenotypeMatrix,
        phenotype: &[f64],
        fixed: &FixedEffects,
        cancel: Option<&CancellationToken>,
    ) -> ScanResult {
        let null = NullModel::fit(
            fixed.n_individuals(),
            fixed.columns().to_vec(),
            phenotype,
            self.config.rank_tol,
        );
        scan_markers(&RawSpace, &null, genotypes, &self.config, cancel)
    }
}
