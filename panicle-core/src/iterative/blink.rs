//! BLINK: Bayesian-information and Linkage-disequilibrium Iteratively
//! Nested Keyway.
//!
//! Selection step: the candidate pool is the previous QTN set plus every
//! marker below the entry threshold, LD-pruned in p-value order and
//! truncated to the QTN cap. A forward pass adds a candidate whenever it
//! lowers the BIC of the fixed-effect model; a backward pass then drops
//! any QTN whose removal lowers the BIC.
//!
//!   BIC = n ln(RSS / n) + k ln(n)

use panicle_geno::{GenotypeMatrix, MarkerMap};
use panicle_linalg::DenseMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ld::{ld_prune, order_by_pvalue};
use super::{
    check_map, default_p_threshold, default_qtn_cap, iterate, GlmRescan, IterationContext,
    IterativeResult, MlmRescan, QtnSelector, Rescanner,
};
use crate::assoc::ols::NullModel;
use crate::assoc::{ScanConfig, ScanResult};
use crate::cancel::CancellationToken;
use crate::design::{validate_inputs, FixedEffects};
use crate::error::{GwasError, Result};
use crate::kinship::KinshipMatrix;
use crate::mixed::RemlConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    /// Candidate entry threshold; `None` means 0.01 / M.
    pub p_threshold: Option<f64>,
    pub max_iterations: usize,
    /// QTN set cap; `None` means floor(sqrt(N) / sqrt(log10 N)).
    pub max_qtns: Option<usize>,
    pub ld_threshold: f64,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            p_threshold: None,
            max_iterations: 10,
            max_qtns: None,
            ld_threshold: 0.7,
        }
    }
}

impl BlinkConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(p) = self.p_threshold {
            if !(p > 0.0 && p <= 1.0) {
                return Err(GwasError::config(format!(
                    "BLINK p_threshold must be in (0, 1], got {}",
                    p
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(GwasError::config("BLINK max_iterations must be at least 1"));
        }
        if self.max_qtns == Some(0) {
            return Err(GwasError::config("BLINK max_qtns must be at least 1"));
        }
        if !(self.ld_threshold > 0.0 && self.ld_threshold <= 1.0) {
            return Err(GwasError::config(format!(
                "BLINK ld_threshold must be in (0, 1], got {}",
                self.ld_threshold
            )));
        }
        Ok(())
    }
}

/// BIC-driven pseudo-QTN selection.
pub struct BicSelector {
    p_threshold: f64,
    ld_threshold: f64,
    rank_tol: f64,
}

impl BicSelector {
    fn bic(&self, ctx: &IterationContext<'_>, model: &[usize]) -> f64 {
        let n = ctx.genotypes.n_individuals();
        let columns = ctx
            .fixed
            .columns()
            .iter()
            .cloned()
            .chain(model.iter().map(|&j| ctx.genotypes.dosages_imputed(j)))
            .collect();
        let fit = NullModel::fit(n, columns, ctx.phenotype, self.rank_tol);
        let nf = n as f64;
        // A perfect fit has no finite BIC; treat it as the best possible.
        let rss = fit.rss().max(f64::MIN_POSITIVE);
        nf * (rss / nf).ln() + fit.rank() as f64 * nf.ln()
    }
}

impl QtnSelector for BicSelector {
    fn name(&self) -> &'static str {
        "BLINK"
    }

    fn select(
        &self,
        ctx: &IterationContext<'_>,
        _iteration: usize,
        previous: &[usize],
        scan: &ScanResult,
    ) -> Result<Vec<usize>> {
        let pvalues = scan.pvalues();
        let mut pool: Vec<usize> = previous.to_vec();
        pool.extend(
            pvalues
                .iter()
                .enumerate()
                .filter(|(j, p)| **p < self.p_threshold && !previous.contains(j))
                .map(|(j, _)| j),
        );
        if pool.is_empty() {
            return Ok(Vec::new());
        }
        order_by_pvalue(&mut pool, &pvalues);
        let pool = ld_prune(ctx.genotypes, &pool, self.ld_threshold, ctx.max_qtns);

        let mut model: Vec<usize> = Vec::new();
        let mut best = self.bic(ctx, &model);
        for &candidate in &pool {
            model.push(candidate);
            let bic = self.bic(ctx, &model);
            if bic < best {
                best = bic;
            } else {
                model.pop();
            }
        }

        let mut k = model.len();
        while k > 0 {
            k -= 1;
            let removed = model.remove(k);
            let bic = self.bic(ctx, &model);
            if bic < best {
                best = bic;
            } else {
                model.insert(k, removed);
            }
        }
        debug!(
            "BLINK: pool of {} candidate(s), {} kept, BIC = {:.4}",
            pool.len(),
            model.len(),
            best
        );
        Ok(model)
    }
}

/// BLINK engine with a GLM (`Blink<GlmRescan>`) or MLM
/// (`Blink<MlmRescan>`) re-scan.
pub struct Blink<R: Rescanner = GlmRescan> {
    config: BlinkConfig,
    scan: ScanConfig,
    rescanner: R,
}

impl Blink<GlmRescan> {
    pub fn new(config: BlinkConfig, scan: ScanConfig) -> Result<Self> {
        config.validate()?;
        let rescanner = GlmRescan::new(scan.clone())?;
        Ok(Self {
            config,
            scan,
            rescanner,
        })
    }
}

impl Blink<MlmRescan> {
    pub fn with_kinship(
        config: BlinkConfig,
        scan: ScanConfig,
        reml: RemlConfig,
        kinship: &KinshipMatrix,
    ) -> Result<Self> {
        config.validate()?;
        let rescanner = MlmRescan::new(scan.clone(), reml, kinship)?;
        Ok(Self {
            config,
            scan,
            rescanner,
        })
    }
}

impl<R: Rescanner> Blink<R> {
    pub fn config(&self) -> &BlinkConfig {
        &self.config
    }

    pub fn run(
        &self,
        genotypes: &GenotypeMatrix,
        map: &MarkerMap,
        phenotype: &[f64],
        covariates: Option<&DenseMatrix>,
        cancel: Option<&CancellationToken>,
    ) -> Result<IterativeResult> {
        validate_inputs(genotypes, phenotype, covariates)?;
        check_map(genotypes, map)?;
        let n = genotypes.n_individuals();
        self.rescanner.validate(n)?;
        let fixed = FixedEffects::new(n, covariates, self.scan.rank_tol)?;

        let selector = BicSelector {
            p_threshold: self
                .config
                .p_threshold
                .unwrap_or_else(|| default_p_threshold(genotypes.n_markers())),
            ld_threshold: self.config.ld_threshold,
            rank_tol: self.scan.rank_tol,
        };
        let ctx = IterationContext {
            genotypes,
            map,
            phenotype,
            fixed: &fixed,
            max_qtns: self.config.max_qtns.unwrap_or_else(|| default_qtn_cap(n)),
        };
        iterate(
            &selector,
            &self.rescanner,
            &ctx,
            &self.scan,
            self.config.max_iterations,
            cancel,
        )
    }
}
