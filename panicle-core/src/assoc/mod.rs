//! Genome-wide single-marker association scans.
//!
//! GLM and MLM share one driver: markers are processed in batches, each
//! batch is mapped into the test space (identity for GLM, eigenbasis
//! whitening for MLM) and every column is tested against the same null
//! model. Batches run on the rayon pool and each writes a disjoint slice
//! of the output, so the result order always matches the genotype
//! columns.

pub mod glm;
pub mod mlm;
pub mod ols;

use std::sync::atomic::{AtomicUsize, Ordering};

use panicle_geno::GenotypeMatrix;
use panicle_linalg::DenseMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::design::DEFAULT_RANK_TOL;
use crate::error::{record, GwasError, Result, Warning};
use ols::NullModel;

pub use glm::GlmScanner;
pub use mlm::MlmScanner;

/// Statistics for one marker. Missing results carry NaN in every field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssociationResult {
    pub effect: f64,
    pub se: f64,
    pub tstat: f64,
    pub pvalue: f64,
}

impl AssociationResult {
    pub const MISSING: AssociationResult = AssociationResult {
        effect: f64::NAN,
        se: f64::NAN,
        tstat: f64::NAN,
        pvalue: f64::NAN,
    };

    pub fn is_missing(&self) -> bool {
        self.pvalue.is_nan()
    }
}

/// Output of a genome-wide scan: one entry per marker plus run warnings.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub results: Vec<AssociationResult>,
    pub warnings: Vec<Warning>,
    /// Markers actually tested (less than `results.len()` only when cancelled).
    pub completed: usize,
}

impl ScanResult {
    pub fn pvalues(&self) -> Vec<f64> {
        self.results.iter().map(|r| r.pvalue).collect()
    }

    /// Index of the smallest non-missing p-value.
    pub fn best_marker(&self) -> Option<usize> {
        self.results
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_missing())
            .min_by(|a, b| a.1.pvalue.total_cmp(&b.1.pvalue))
            .map(|(j, _)| j)
    }
}

/// Configuration shared by the GLM and MLM scanners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Markers per batch; cancellation is checked between batches.
    pub batch_size: usize,
    /// Relative tolerance for detecting collinear design columns.
    pub rank_tol: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: 1024,
            rank_tol: DEFAULT_RANK_TOL,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(GwasError::config("scan batch_size must be at least 1"));
        }
        if !(self.rank_tol > 0.0 && self.rank_tol < 1.0) {
            return Err(GwasError::config(format!(
                "rank_tol must be in (0, 1), got {}",
                self.rank_tol
            )));
        }
        Ok(())
    }
}

/// Space in which the least squares test is carried out.
pub(crate) trait TestSpace: Sync {
    /// Map an n x b block of raw marker columns into the test space.
    fn map_block(&self, block: DenseMatrix) -> DenseMatrix;

    /// Map a single raw vector (phenotype or covariate) into the test space.
    fn map_vec(&self, v: &[f64]) -> Vec<f64> {
        let block = DenseMatrix::from_columns(v.len(), &[v.to_vec()]);
        self.map_block(block).col(0)
    }
}

/// Ordinary least squares: the raw space.
pub(crate) struct RawSpace;

impl TestSpace for RawSpace {
    fn map_block(&self, block: DenseMatrix) -> DenseMatrix {
        block
    }

    fn map_vec(&self, v: &[f64]) -> Vec<f64> {
        v.to_vec()
    }
}

/// Mean-imputed dosages for markers `start..end` as an n x b block.
pub(crate) fn imputed_block(genotypes: &GenotypeMatrix, start: usize, end: usize) -> DenseMatrix {
    let n = genotypes.n_individuals();
    let columns: Vec<Vec<f64>> = (start..end).map(|j| genotypes.dosages_imputed(j)).collect();
    DenseMatrix::from_columns(n, &columns)
}

/// Test every marker against `null` in the given space.
pub(crate) fn scan_markers<S: TestSpace>(
    space: &S,
    null: &NullModel,
    genotypes: &GenotypeMatrix,
    config: &ScanConfig,
    cancel: Option<&CancellationToken>,
) -> ScanResult {
    scan_markers_except(space, null, genotypes, &[], config, cancel)
}

/// As `scan_markers`, leaving the markers in `skip` (sorted) missing and
/// uncounted; used when those markers are tested separately.
pub(crate) fn scan_markers_except<S: TestSpace>(
    space: &S,
    null: &NullModel,
    genotypes: &GenotypeMatrix,
    skip: &[usize],
    config: &ScanConfig,
    cancel: Option<&CancellationToken>,
) -> ScanResult {
    let m = genotypes.n_markers();
    let batch = config.batch_size.max(1);
    let mut results = vec![AssociationResult::MISSING; m];
    let completed = AtomicUsize::new(0);
    let deficient = AtomicUsize::new(0);

    results
        .par_chunks_mut(batch)
        .enumerate()
        .for_each(|(b, out)| {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                return;
            }
            let start = b * batch;
            let end = start + out.len();
            let mapped = space.map_block(imputed_block(genotypes, start, end));
            for (k, slot) in out.iter_mut().enumerate() {
                if skip.binary_search(&(start + k)).is_ok() {
                    continue;
                }
                match null.test(&mapped.col(k)) {
                    Some(r) => *slot = r,
                    None => {
                        deficient.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            completed.fetch_add(out.len(), Ordering::Relaxed);
        });

    let completed = completed.into_inner();
    let deficient = deficient.into_inner();
    let mut warnings = Vec::new();
    if deficient > 0 {
        record(&mut warnings, Warning::RankDeficiency { markers: deficient });
    }
    if completed < m {
        record(
            &mut warnings,
            Warning::Cancelled {
                completed,
                total: m,
            },
        );
    }
    debug!("Scanned {} of {} markers ({} rank deficient)", completed, m, deficient);

    ScanResult {
        results,
        warnings,
        completed,
    }
}

/// Re-test each conditioning marker against a null model that excludes it.
///
/// `base` and `y` are already in the test space; `qtn_columns[k]` is the
/// mapped dosage column of `qtns[k]`.
pub(crate) fn retest_excluding(
    base: &[Vec<f64>],
    y: &[f64],
    qtns: &[usize],
    qtn_columns: &[Vec<f64>],
    rank_tol: f64,
    results: &mut [AssociationResult],
) {
    let n = y.len();
    let retested: Vec<(usize, AssociationResult)> = qtns
        .par_iter()
        .enumerate()
        .map(|(k, &marker)| {
            let mut columns = base.to_vec();
            columns.extend(
                qtn_columns
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| *other != k)
                    .map(|(_, c)| c.clone()),
            );
            let null = NullModel::fit(n, columns, y, rank_tol);
            let r = null
                .test(&qtn_columns[k])
                .unwrap_or(AssociationResult::MISSING);
            (marker, r)
        })
        .collect();
    for (marker, r) in retested {
        results[marker] = r;
    }
}
