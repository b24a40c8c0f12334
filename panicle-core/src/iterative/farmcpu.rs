//! FarmCPU: Fixed and random model Circulating Probability Unification.
//!
//! Pseudo-QTN selection partitions the genome into fixed-size physical
//! bins and keeps, per bin, the most significant marker below
//! `qtn_threshold`. Candidates in LD with a more significant candidate
//! are dropped and the rest are truncated, most significant first, to
//! the QTN cap. If after the initial scan no marker passes the
//! genome-wide `p_threshold`, the run stops there with no QTNs.

use std::collections::HashMap;

use panicle_geno::{GenotypeMatrix, MarkerMap};
use panicle_linalg::DenseMatrix;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ld::{ld_prune, order_by_pvalue};
use super::{
    check_map, default_p_threshold, default_qtn_cap, iterate, GlmRescan, IterationContext,
    IterativeResult, MlmRescan, QtnSelector, Rescanner,
};
use crate::assoc::{ScanConfig, ScanResult};
use crate::cancel::CancellationToken;
use crate::design::{validate_inputs, FixedEffects};
use crate::error::{GwasError, Result};
use crate::kinship::KinshipMatrix;
use crate::mixed::RemlConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmCpuConfig {
    /// Bin width in base pairs.
    pub bin_size: u64,
    /// Per-bin significance threshold for pseudo-QTN candidates.
    pub qtn_threshold: f64,
    /// Genome-wide entry threshold; `None` means 0.01 / M.
    pub p_threshold: Option<f64>,
    pub max_iterations: usize,
    /// QTN set cap; `None` means floor(sqrt(N) / sqrt(log10 N)).
    pub max_qtns: Option<usize>,
    /// Candidates with |r| above this against a better candidate are dropped.
    pub ld_threshold: f64,
}

impl Default for FarmCpuConfig {
    fn default() -> Self {
        Self {
            bin_size: 500_000,
            qtn_threshold: 0.01,
            p_threshold: None,
            max_iterations: 10,
            max_qtns: None,
            ld_threshold: 0.7,
        }
    }
}

impl FarmCpuConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bin_size == 0 {
            return Err(GwasError::config("FarmCPU bin_size must be positive"));
        }
        if !(self.qtn_threshold > 0.0 && self.qtn_threshold <= 1.0) {
            return Err(GwasError::config(format!(
                "FarmCPU qtn_threshold must be in (0, 1], got {}",
                self.qtn_threshold
            )));
        }
        if let Some(p) = self.p_threshold {
            if !(p > 0.0 && p <= 1.0) {
                return Err(GwasError::config(format!(
                    "FarmCPU p_threshold must be in (0, 1], got {}",
                    p
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(GwasError::config("FarmCPU max_iterations must be at least 1"));
        }
        if self.max_qtns == Some(0) {
            return Err(GwasError::config("FarmCPU max_qtns must be at least 1"));
        }
        if !(self.ld_threshold > 0.0 && self.ld_threshold <= 1.0) {
            return Err(GwasError::config(format!(
                "FarmCPU ld_threshold must be in (0, 1], got {}",
                self.ld_threshold
            )));
        }
        Ok(())
    }
}

/// Bin-based pseudo-QTN selection.
pub struct BinSelector {
    bin_size: u64,
    qtn_threshold: f64,
    p_threshold: f64,
    ld_threshold: f64,
}

impl QtnSelector for BinSelector {
    fn name(&self) -> &'static str {
        "FarmCPU"
    }

    fn select(
        &self,
        ctx: &IterationContext<'_>,
        iteration: usize,
        _previous: &[usize],
        scan: &ScanResult,
    ) -> Result<Vec<usize>> {
        let pvalues = scan.pvalues();
        if iteration == 1 {
            let min_p = scan.best_marker().map(|j| pvalues[j]);
            if min_p.map_or(true, |p| p > self.p_threshold) {
                info!(
                    "FarmCPU: no marker below p = {:.3e} after the initial scan; stopping",
                    self.p_threshold
                );
                return Ok(Vec::new());
            }
        }

        let mut best: HashMap<(&str, u64), usize> = HashMap::new();
        for (j, &p) in pvalues.iter().enumerate() {
            if p.is_nan() || p >= self.qtn_threshold {
                continue;
            }
            let marker = ctx.map.get(j);
            let key = (marker.chrom.as_str(), marker.pos / self.bin_size);
            best.entry(key)
                .and_modify(|k| {
                    if p < pvalues[*k] {
                        *k = j;
                    }
                })
                .or_insert(j);
        }

        let mut candidates: Vec<usize> = best.into_values().collect();
        order_by_pvalue(&mut candidates, &pvalues);
        Ok(ld_prune(ctx.genotypes, &candidates, self.ld_threshold, ctx.max_qtns))
    }
}

/// FarmCPU engine with a GLM (`FarmCpu<GlmRescan>`) or MLM
/// (`FarmCpu<MlmRescan>`) re-scan.
pub struct FarmCpu<R: Rescanner = GlmRescan> {
    config: FarmCpuConfig,
    scan: ScanConfig,
    rescanner: R,
}

impl FarmCpu<GlmRescan> {
    pub fn new(config: FarmCpuConfig, scan: ScanConfig) -> Result<Self> {
        config.validate()?;
        let rescanner = GlmRescan::new(scan.clone())?;
        Ok(Self {
            config,
            scan,
            rescanner,
        })
    }
}

impl FarmCpu<MlmRescan> {
    pub fn with_kinship(
        config: FarmCpuConfig,
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

impl<R: Rescanner> FarmCpu<R> {
    pub fn config(&self) -> &FarmCpuConfig {
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

        let selector = BinSelector {
            bin_size: self.config.bin_size,
            qtn_threshold: self.config.qtn_threshold,
            p_threshold: self
                .config
                .p_threshold
                .unwrap_or_else(|| default_p_threshold(genotypes.n_markers())),
            ld_threshold: self.config.ld_threshold,
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
