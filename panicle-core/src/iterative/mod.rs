//! Multi-locus iterative engines (FarmCPU, BLINK) and FarmCPU resampling.
//!
//! Both engines share one loop:
//!
//!   Initialize: GLM scan without conditioning markers
//!   Select:     choose a pseudo-QTN set from the latest scan
//!   ReScan:     scan again with the pseudo-QTNs as covariates
//!   Converge:   stop when the selected set equals the conditioning set
//!
//! Selection is a `QtnSelector` (bins and p-values for FarmCPU, BIC for
//! BLINK) and the re-scan is a `Rescanner` (GLM, or MLM when a kinship
//! is supplied), both fixed when the engine is constructed. The QTN set
//! is truncated to a size cap, most significant first, and the loop is
//! bounded by an iteration cap. Hitting the iteration cap, or a QTN set
//! too large to fit next to the fixed effects, yields a `NonConvergence`
//! warning and the last completed scan.

pub mod blink;
pub mod farmcpu;
pub mod ld;
pub mod rescan;
pub mod resampling;

use panicle_geno::{GenotypeMatrix, MarkerMap};
use tracing::{debug, info};

use crate::assoc::{AssociationResult, GlmScanner, ScanConfig, ScanResult};
use crate::cancel::CancellationToken;
use crate::design::FixedEffects;
use crate::error::{record, GwasError, Result, Warning};

pub use blink::{Blink, BlinkConfig};
pub use farmcpu::{FarmCpu, FarmCpuConfig};
pub use rescan::{GlmRescan, MlmRescan};
pub use resampling::{FarmCpuResampling, ResamplingConfig, ResamplingResult};

/// Read-only inputs of one iterative run, aligned by individual.
pub struct IterationContext<'a> {
    pub genotypes: &'a GenotypeMatrix,
    pub map: &'a MarkerMap,
    pub phenotype: &'a [f64],
    pub fixed: &'a FixedEffects,
    /// Largest QTN set the run may condition on.
    pub max_qtns: usize,
}

/// Chooses the pseudo-QTN set for the next re-scan.
pub trait QtnSelector: Sync {
    fn name(&self) -> &'static str;

    /// `iteration` starts at 1 (selection from the initial GLM scan);
    /// `previous` is the set the latest scan was conditioned on. The
    /// returned markers are ordered most significant first; anything past
    /// `ctx.max_qtns` is dropped.
    fn select(
        &self,
        ctx: &IterationContext<'_>,
        iteration: usize,
        previous: &[usize],
        scan: &ScanResult,
    ) -> Result<Vec<usize>>;
}

/// Genome-wide scan conditioned on a QTN set.
pub trait Rescanner: Sync {
    /// Check that the rescanner fits `n` individuals.
    fn validate(&self, _n: usize) -> Result<()> {
        Ok(())
    }

    /// Warnings produced while setting the rescanner up.
    fn setup_warnings(&self) -> &[Warning] {
        &[]
    }

    fn rescan(
        &self,
        ctx: &IterationContext<'_>,
        qtns: &[usize],
        cancel: Option<&CancellationToken>,
    ) -> Result<ScanResult>;
}

/// Final output of FarmCPU or BLINK.
#[derive(Debug, Clone)]
pub struct IterativeResult {
    /// One entry per marker, from the last completed scan.
    pub results: Vec<AssociationResult>,
    /// Pseudo-QTNs the final scan was conditioned on, ascending.
    pub qtns: Vec<usize>,
    pub iterations: usize,
    pub converged: bool,
    pub warnings: Vec<Warning>,
}

/// Default QTN cap: floor(sqrt(n) / sqrt(log10(n))), at least 1.
pub fn default_qtn_cap(n: usize) -> usize {
    let nf = n as f64;
    let lg = nf.log10();
    if lg <= 0.0 {
        return 1;
    }
    ((nf.sqrt() / lg.sqrt()).floor() as usize).max(1)
}

/// Default genome-wide entry threshold: 0.01 / M.
pub fn default_p_threshold(n_markers: usize) -> f64 {
    0.01 / n_markers.max(1) as f64
}

pub(crate) fn check_map(genotypes: &GenotypeMatrix, map: &MarkerMap) -> Result<()> {
    if map.len() != genotypes.n_markers() {
        return Err(GwasError::DataAlignment {
            what: "marker map".to_string(),
            expected: genotypes.n_markers(),
            got: map.len(),
        });
    }
    Ok(())
}

/// The shared Initialize / Select / ReScan / Converge loop.
pub(crate) fn iterate<S, R>(
    selector: &S,
    rescanner: &R,
    ctx: &IterationContext<'_>,
    scan_config: &ScanConfig,
    max_iterations: usize,
    cancel: Option<&CancellationToken>,
) -> Result<IterativeResult>
where
    S: QtnSelector,
    R: Rescanner,
{
    let engine = selector.name();
    let m = ctx.genotypes.n_markers();
    let mut warnings: Vec<Warning> = rescanner.setup_warnings().to_vec();

    info!(
        "{}: {} individuals, {} markers, QTN cap {}",
        engine,
        ctx.genotypes.n_individuals(),
        m,
        ctx.max_qtns
    );
    let glm = GlmScanner::new(scan_config.clone())?;
    let mut current = glm.scan_fixed(ctx.genotypes, ctx.phenotype, ctx.fixed, cancel);
    let mut qtns: Vec<usize> = Vec::new();
    let mut iterations = 0;
    let mut converged = false;
    let mut stopped = current.completed < m;

    while !stopped && iterations < max_iterations {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            record(
                &mut warnings,
                Warning::Cancelled {
                    completed: iterations,
                    total: max_iterations,
                },
            );
            stopped = true;
            break;
        }
        iterations += 1;

        let mut next = selector.select(ctx, iterations, &qtns, &current)?;
        if next.len() > ctx.max_qtns {
            debug!(
                "{} iteration {}: truncating {} QTN(s) to the cap of {}",
                engine,
                iterations,
                next.len(),
                ctx.max_qtns
            );
            next.truncate(ctx.max_qtns);
        }
        next.sort_unstable();
        next.dedup();
        debug!("{} iteration {}: QTNs {:?}", engine, iterations, next);

        if next == qtns {
            converged = true;
            break;
        }
        let n = ctx.genotypes.n_individuals();
        if ctx.fixed.n_columns() + next.len() + 1 >= n {
            record(
                &mut warnings,
                Warning::NonConvergence {
                    engine: engine.to_string(),
                    iterations,
                    reason: format!(
                        "{} QTN(s) and {} fixed effect(s) leave no degrees of freedom for {} individuals",
                        next.len(),
                        ctx.fixed.n_columns(),
                        n
                    ),
                },
            );
            stopped = true;
            break;
        }

        let scan = rescanner.rescan(ctx, &next, cancel)?;
        if scan.completed < m {
            // Keep the last complete scan; report the interruption.
            record(
                &mut warnings,
                Warning::Cancelled {
                    completed: iterations - 1,
                    total: max_iterations,
                },
            );
            stopped = true;
            break;
        }
        qtns = next;
        current = scan;
    }

    if !converged && !stopped {
        record(
            &mut warnings,
            Warning::NonConvergence {
                engine: engine.to_string(),
                iterations,
                reason: "reached the iteration cap".to_string(),
            },
        );
    }
    info!(
        "{} finished after {} iteration(s): {} QTN(s), converged = {}",
        engine,
        iterations,
        qtns.len(),
        converged
    );

    warnings.append(&mut current.warnings);
    Ok(IterativeResult {
        results: current.results,
        qtns,
        iterations,
        converged,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Always proposes the same markers, most significant first.
    struct FixedSelector(Vec<usize>);

    impl QtnSelector for FixedSelector {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn select(
            &self,
            _ctx: &IterationContext<'_>,
            _iteration: usize,
            _previous: &[usize],
            _scan: &ScanResult,
        ) -> Result<Vec<usize>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_oversized_selection_is_truncated_not_fatal() {
        let n = 30;
        let cols: Vec<Vec<i8>> = (0..6)
            .map(|j| (0..n).map(|i| (((i * 31 + j * 17) ^ (i * j)) % 3) as i8).collect())
            .collect();
        let g = GenotypeMatrix::from_columns(n, cols).unwrap();
        let map = MarkerMap::uniform(6, 1_000_000);
        let y: Vec<f64> = (0..n).map(|i| g.column(4)[i] as f64 + (i % 5) as f64 * 0.1).collect();
        let fixed = FixedEffects::intercept_only(n);
        let ctx = IterationContext {
            genotypes: &g,
            map: &map,
            phenotype: &y,
            fixed: &fixed,
            max_qtns: 2,
        };
        let rescanner = GlmRescan::new(ScanConfig::default()).unwrap();
        let res = iterate(
            &FixedSelector(vec![4, 1, 3, 0]),
            &rescanner,
            &ctx,
            &ScanConfig::default(),
            10,
            None,
        )
        .unwrap();
        assert_eq!(res.qtns, vec![1, 4]);
        assert!(res.converged);
        assert_eq!(res.iterations, 2);
        assert_eq!(res.results.len(), 6);
        assert!(!res
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::NonConvergence { .. })));
    }

    #[test]
    fn test_unfittable_selection_keeps_last_scan() {
        let n = 8;
        let cols: Vec<Vec<i8>> = (0..6)
            .map(|j| (0..n).map(|i| (((i * 31 + j * 17) ^ (i * j)) % 3) as i8).collect())
            .collect();
        let g = GenotypeMatrix::from_columns(n, cols).unwrap();
        let map = MarkerMap::uniform(6, 1_000_000);
        let y: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let fixed = FixedEffects::intercept_only(n);
        let ctx = IterationContext {
            genotypes: &g,
            map: &map,
            phenotype: &y,
            fixed: &fixed,
            max_qtns: 10,
        };
        let rescanner = GlmRescan::new(ScanConfig::default()).unwrap();
        let res = iterate(
            &FixedSelector(vec![0, 1, 2, 3, 4, 5]),
            &rescanner,
            &ctx,
            &ScanConfig::default(),
            10,
            None,
        )
        .unwrap();
        assert!(!res.converged);
        assert_eq!(res.iterations, 1);
        assert!(res.qtns.is_empty());
        assert_eq!(res.results.len(), 6);
        assert!(res
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::NonConvergence { reason, .. } if reason.contains("degrees of freedom"))));
    }

    #[test]
    fn test_default_qtn_cap() {
        assert_eq!(default_qtn_cap(100), 7);
        assert_eq!(default_qtn_cap(1000), 18);
        assert_eq!(default_qtn_cap(1), 1);
        assert_eq!(default_qtn_cap(0), 1);
    }

    #[test]
    fn test_default_p_threshold() {
        assert!((default_p_threshold(1000) - 1e-5).abs() < 1e-18);
        assert_eq!(default_p_threshold(0), 0.01);
    }
}
