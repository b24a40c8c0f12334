//! Re-scan strategies: GLM or MLM conditioned on pseudo-QTNs.
//!
//! Non-QTN markers are tested against fixed effects plus every QTN.
//! Each QTN is tested against fixed effects plus the other QTNs, so it
//! is never collinear with its own covariate.

use std::sync::Arc;

use panicle_linalg::DenseMatrix;
use tracing::debug;

use super::{IterationContext, Rescanner};
use crate::assoc::mlm::Whitening;
use crate::assoc::ols::NullModel;
use crate::assoc::{
    retest_excluding, scan_markers_except, RawSpace, ScanConfig, ScanResult, TestSpace,
};
use crate::cancel::CancellationToken;
use crate::error::{GwasError, Result, Warning};
use crate::kinship::KinshipMatrix;
use crate::mixed::{KinshipEigen, RemlConfig, VarianceComponentSolver};

fn mapped_columns<S: TestSpace>(space: &S, n: usize, columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    if columns.is_empty() {
        return Vec::new();
    }
    let mapped = space.map_block(DenseMatrix::from_columns(n, columns));
    (0..mapped.ncols()).map(|j| mapped.col(j)).collect()
}

fn conditioned_scan<S: TestSpace>(
    space: &S,
    ctx: &IterationContext<'_>,
    qtns: &[usize],
    config: &ScanConfig,
    cancel: Option<&CancellationToken>,
) -> ScanResult {
    let n = ctx.genotypes.n_individuals();
    let base = mapped_columns(space, n, ctx.fixed.columns());
    let qtn_columns = if qtns.is_empty() {
        Vec::new()
    } else {
        let raw: Vec<Vec<f64>> = qtns.iter().map(|&q| ctx.genotypes.dosages_imputed(q)).collect();
        mapped_columns(space, n, &raw)
    };
    let y = space.map_vec(ctx.phenotype);

    let mut all = base.clone();
    all.extend(qtn_columns.iter().cloned());
    let null = NullModel::fit(n, all, &y, config.rank_tol);

    let mut sorted = qtns.to_vec();
    sorted.sort_unstable();
    let mut scan = scan_markers_except(space, &null, ctx.genotypes, &sorted, config, cancel);
    if scan.completed == ctx.genotypes.n_markers() {
        retest_excluding(&base, &y, qtns, &qtn_columns, config.rank_tol, &mut scan.results);
    }
    scan
}

/// Re-scan with ordinary least squares.
#[derive(Debug, Clone, Default)]
pub struct GlmRescan {
    config: ScanConfig,
}

impl GlmRescan {
    pub fn new(config: ScanConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl Rescanner for GlmRescan {
    fn rescan(
        &self,
        ctx: &IterationContext<'_>,
        qtns: &[usize],
        cancel: Option<&CancellationToken>,
    ) -> Result<ScanResult> {
        Ok(conditioned_scan(&RawSpace, ctx, qtns, &self.config, cancel))
    }
}

/// Re-scan with the mixed model; variance components are re-estimated
/// for each QTN set against a kinship decomposition computed once.
#[derive(Debug, Clone)]
pub struct MlmRescan {
    config: ScanConfig,
    solver: VarianceComponentSolver,
    eigen: Arc<KinshipEigen>,
    warnings: Vec<Warning>,
}

impl MlmRescan {
    pub fn new(config: ScanConfig, reml: RemlConfig, kinship: &KinshipMatrix) -> Result<Self> {
        config.validate()?;
        let solver = VarianceComponentSolver::new(reml)?;
        let mut warnings = Vec::new();
        let eigen = Arc::new(KinshipEigen::new(kinship, &mut warnings)?);
        Ok(Self {
            config,
            solver,
            eigen,
            warnings,
        })
    }
}

impl Rescanner for MlmRescan {
    fn validate(&self, n: usize) -> Result<()> {
        if self.eigen.n() != n {
            return Err(GwasError::DataAlignment {
                what: "kinship matrix".to_string(),
                expected: n,
                got: self.eigen.n(),
            });
        }
        Ok(())
    }

    fn setup_warnings(&self) -> &[Warning] {
        &self.warnings
    }

    fn rescan(
        &self,
        ctx: &IterationContext<'_>,
        qtns: &[usize],
        cancel: Option<&CancellationToken>,
    ) -> Result<ScanResult> {
        let conditioned = ctx
            .fixed
            .with_columns(qtns.iter().map(|&q| ctx.genotypes.dosages_imputed(q)));
        let vc = self
            .solver
            .fit_eigen(ctx.phenotype, Arc::clone(&self.eigen), &conditioned)?;
        debug!("MLM re-scan with {} QTN(s): delta = {:.4e}", qtns.len(), vc.delta);

        let space = Whitening::new(&vc);
        let mut scan = conditioned_scan(&space, ctx, qtns, &self.config, cancel);
        let mut warnings = vc.warnings;
        warnings.append(&mut scan.warnings);
        scan.warnings = warnings;
        Ok(scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::FixedEffects;
    use panicle_geno::{GenotypeMatrix, MarkerMap};

    #[test]
    fn test_qtn_is_tested_without_itself() {
        let g = GenotypeMatrix::from_columns(
            8,
            vec![
                vec![0, 1, 2, 0, 1, 2, 0, 2],
                vec![2, 0, 1, 1, 0, 2, 1, 0],
                vec![1, 1, 0, 2, 2, 0, 1, 1],
            ],
        )
        .unwrap();
        let y = vec![0.1, 1.1, 2.2, -0.1, 0.9, 2.1, 0.2, 1.8];
        let map = MarkerMap::uniform(3, 1000);
        let fixed = FixedEffects::intercept_only(8);
        let ctx = IterationContext {
            genotypes: &g,
            map: &map,
            phenotype: &y,
            fixed: &fixed,
            max_qtns: 3,
        };
        let scan = GlmRescan::default().rescan(&ctx, &[0], None).unwrap();
        assert_eq!(scan.results.len(), 3);
        assert!(!scan.results[0].is_missing());
        assert!(scan.results[0].pvalue < 1e-4);
        assert!(scan.warnings.is_empty());
        assert_eq!(scan.completed, 3);
    }
}
