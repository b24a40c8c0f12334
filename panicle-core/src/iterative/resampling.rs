//! FarmCPU resampling: marker selection frequency over random subsets of
//! individuals.
//!
//! Resample `i` draws its subset from a ChaCha8 stream seeded by
//! `(seed, i)` alone, and counts are summed per marker, so the output
//! does not depend on execution order or thread count.

use std::collections::BTreeMap;

use panicle_geno::{GenotypeMatrix, MarkerMap};
use panicle_linalg::DenseMatrix;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{check_map, FarmCpu, FarmCpuConfig};
use crate::assoc::ScanConfig;
use crate::cancel::CancellationToken;
use crate::design::validate_inputs;
use crate::error::{record, GwasError, Result, Warning};
use crate::kinship::KinshipMatrix;
use crate::mixed::RemlConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplingConfig {
    pub n_resamples: usize,
    /// Share of individuals drawn (without replacement) per resample.
    pub sample_fraction: f64,
    pub seed: u64,
}

impl Default for ResamplingConfig {
    fn default() -> Self {
        Self {
            n_resamples: 100,
            sample_fraction: 0.9,
            seed: 12345,
        }
    }
}

impl ResamplingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_resamples == 0 {
            return Err(GwasError::config("n_resamples must be at least 1"));
        }
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(GwasError::config(format!(
                "sample_fraction must be in (0, 1], got {}",
                self.sample_fraction
            )));
        }
        Ok(())
    }

    /// Number of individuals drawn from `n`.
    pub fn subset_size(&self, n: usize) -> usize {
        ((self.sample_fraction * n as f64).round() as usize).min(n)
    }
}

/// Per-marker selection counts and frequencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResamplingResult {
    /// Resamples in which each marker was in the final QTN set.
    pub counts: Vec<u32>,
    /// `counts / completed`; all zero when nothing completed.
    pub frequencies: Vec<f64>,
    pub completed: usize,
    pub requested: usize,
    pub warnings: Vec<Warning>,
}

struct ResampleOutcome {
    qtns: Vec<usize>,
    iterations: usize,
    /// Why the inner run stopped without converging.
    stop_reason: Option<String>,
}

pub struct FarmCpuResampling {
    config: ResamplingConfig,
    farmcpu: FarmCpuConfig,
    scan: ScanConfig,
    reml: RemlConfig,
    kinship: Option<KinshipMatrix>,
}

impl FarmCpuResampling {
    /// Resampling with GLM re-scans.
    pub fn new(config: ResamplingConfig, farmcpu: FarmCpuConfig, scan: ScanConfig) -> Result<Self> {
        config.validate()?;
        farmcpu.validate()?;
        scan.validate()?;
        Ok(Self {
            config,
            farmcpu,
            scan,
            reml: RemlConfig::default(),
            kinship: None,
        })
    }

    /// Resampling with MLM re-scans; each resample uses the principal
    /// submatrix of `kinship` for its individuals.
    pub fn with_kinship(
        config: ResamplingConfig,
        farmcpu: FarmCpuConfig,
        scan: ScanConfig,
        reml: RemlConfig,
        kinship: KinshipMatrix,
    ) -> Result<Self> {
        reml.validate()?;
        let mut engine = Self::new(config, farmcpu, scan)?;
        engine.reml = reml;
        engine.kinship = Some(kinship);
        Ok(engine)
    }

    pub fn config(&self) -> &ResamplingConfig {
        &self.config
    }

    /// Run resamples `0..n_resamples`.
    pub fn run(
        &self,
        genotypes: &GenotypeMatrix,
        map: &MarkerMap,
        phenotype: &[f64],
        covariates: Option<&DenseMatrix>,
        cancel: Option<&CancellationToken>,
    ) -> Result<ResamplingResult> {
        let indices: Vec<usize> = (0..self.config.n_resamples).collect();
        self.run_resamples(&indices, genotypes, map, phenotype, covariates, cancel)
    }

    /// Run the resamples named by `indices`, in any order.
    pub fn run_resamples(
        &self,
        indices: &[usize],
        genotypes: &GenotypeMatrix,
        map: &MarkerMap,
        phenotype: &[f64],
        covariates: Option<&DenseMatrix>,
        cancel: Option<&CancellationToken>,
    ) -> Result<ResamplingResult> {
        validate_inputs(genotypes, phenotype, covariates)?;
        check_map(genotypes, map)?;
        let n = genotypes.n_individuals();
        if let Some(k) = &self.kinship {
            if k.n() != n {
                return Err(GwasError::DataAlignment {
                    what: "kinship matrix".to_string(),
                    expected: n,
                    got: k.n(),
                });
            }
        }
        let size = self.config.subset_size(n);
        if size < 3 {
            return Err(GwasError::config(format!(
                "sample_fraction {} leaves {} of {} individuals per resample",
                self.config.sample_fraction, size, n
            )));
        }
        info!(
            "FarmCPU resampling: {} resample(s) of {} / {} individuals",
            indices.len(),
            size,
            n
        );

        let outcomes: Vec<Option<Result<ResampleOutcome>>> = indices
            .par_iter()
            .map(|&index| {
                if cancel.is_some_and(|c| c.is_cancelled()) {
                    return None;
                }
                Some(self.resample(index, size, genotypes, map, phenotype, covariates))
            })
            .collect();

        let m = genotypes.n_markers();
        let mut counts = vec![0u32; m];
        let mut completed = 0;
        let mut stop_reasons: BTreeMap<String, usize> = BTreeMap::new();
        let mut max_iterations_seen = 0;
        for outcome in outcomes.into_iter().flatten() {
            let outcome = outcome?;
            for &q in &outcome.qtns {
                counts[q] += 1;
            }
            completed += 1;
            if let Some(reason) = outcome.stop_reason {
                *stop_reasons.entry(reason).or_insert(0) += 1;
                max_iterations_seen = max_iterations_seen.max(outcome.iterations);
            }
        }

        let mut warnings = Vec::new();
        let not_converged: usize = stop_reasons.values().sum();
        if not_converged > 0 {
            let reasons: Vec<String> = stop_reasons
                .iter()
                .map(|(reason, count)| format!("{} x {}", count, reason))
                .collect();
            record(
                &mut warnings,
                Warning::NonConvergence {
                    engine: "FarmCPU resampling".to_string(),
                    iterations: max_iterations_seen,
                    reason: format!(
                        "{} of {} resample(s) did not converge ({})",
                        not_converged,
                        completed,
                        reasons.join(", ")
                    ),
                },
            );
        }
        if completed < indices.len() {
            record(
                &mut warnings,
                Warning::Cancelled {
                    completed,
                    total: indices.len(),
                },
            );
        }
        let frequencies = counts
            .iter()
            .map(|&c| if completed > 0 { c as f64 / completed as f64 } else { 0.0 })
            .collect();

        Ok(ResamplingResult {
            counts,
            frequencies,
            completed,
            requested: indices.len(),
            warnings,
        })
    }

    fn resample(
        &self,
        index: usize,
        size: usize,
        genotypes: &GenotypeMatrix,
        map: &MarkerMap,
        phenotype: &[f64],
        covariates: Option<&DenseMatrix>,
    ) -> Result<ResampleOutcome> {
        let rows = draw_subset(self.config.seed, index, genotypes.n_individuals(), size);
        let sub_genotypes = genotypes.subset_individuals(&rows)?;
        let sub_phenotype: Vec<f64> = rows.iter().map(|&i| phenotype[i]).collect();
        let sub_covariates = covariates.map(|c| {
            let cols: Vec<usize> = (0..c.ncols()).collect();
            c.select(&rows, &cols)
        });

        let result = match &self.kinship {
            None => FarmCpu::new(self.farmcpu.clone(), self.scan.clone())?.run(
                &sub_genotypes,
                map,
                &sub_phenotype,
                sub_covariates.as_ref(),
                None,
            )?,
            Some(k) => FarmCpu::with_kinship(
                self.farmcpu.clone(),
                self.scan.clone(),
                self.reml.clone(),
                &k.subset(&rows)?,
            )?
            .run(&sub_genotypes, map, &sub_phenotype, sub_covariates.as_ref(), None)?,
        };
        debug!("Resample {}: QTNs {:?}", index, result.qtns);
        let stop_reason = if result.converged {
            None
        } else {
            let reason = result
                .warnings
                .iter()
                .find_map(|w| match w {
                    Warning::NonConvergence { reason, .. } => Some(reason.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| "stopped early".to_string());
            Some(reason)
        };
        Ok(ResampleOutcome {
            qtns: result.qtns,
            iterations: result.iterations,
            stop_reason,
        })
    }
}

/// Sorted subset of `size` individuals for resample `index`.
fn draw_subset(seed: u64, index: usize, n: usize, size: usize) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(index as u64);
    let mut rows = rand::seq::index::sample(&mut rng, n, size).into_vec();
    rows.sort_unstable();
    rows
}
