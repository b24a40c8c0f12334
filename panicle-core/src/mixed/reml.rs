//! Variance component estimation by REML in the kinship eigenbasis.
//!
//! Model: y = X b + u + e, u ~ N(0, s2g K), e ~ N(0, s2e I).
//! With K = U diag(lambda) U' and delta = s2e / s2g, the rotated data
//! y* = U'y, X* = U'X have independent entries with variance
//! s2g (lambda_i + delta). Profiling out b and s2g gives the restricted
//! log-likelihood (up to a constant)
//!
//!   l(delta) = -1/2 [ (n-p) ln(2 pi R/(n-p)) + (n-p)
//!                     + sum_i ln(lambda_i + delta) + ln |X*' W X*| ]
//!
//! where W = diag(1/(lambda_i + delta)) and R is the weighted residual
//! sum of squares. Each evaluation is O(n p^2); the O(n^3)
//! decomposition happens once.
//!
//! The search runs over log10(delta): a uniform grid locates the basin,
//! then Brent's method refines within the neighbouring grid cells.

use std::sync::Arc;

use panicle_linalg::decomposition::OrthonormalBasis;
use panicle_linalg::optimize::brent_minimize;
use panicle_linalg::DenseMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::eigen::KinshipEigen;
use crate::design::{FixedEffects, DEFAULT_RANK_TOL};
use crate::error::{record, GwasError, Result, Warning};
use crate::kinship::KinshipMatrix;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemlConfig {
    /// Number of grid points over [log10_delta_min, log10_delta_max].
    pub grid_points: usize,
    pub log10_delta_min: f64,
    pub log10_delta_max: f64,
    /// Brent tolerance on log10(delta).
    pub tol: f64,
    /// Brent iteration budget.
    pub max_iter: usize,
    pub rank_tol: f64,
}

impl Default for RemlConfig {
    fn default() -> Self {
        Self {
            grid_points: 100,
            log10_delta_min: -5.0,
            log10_delta_max: 5.0,
            tol: 1e-6,
            max_iter: 100,
            rank_tol: DEFAULT_RANK_TOL,
        }
    }
}

impl RemlConfig {
    pub fn validate(&self) -> Result<()> {
        if self.grid_points < 3 {
            return Err(GwasError::config("REML grid needs at least 3 points"));
        }
        if !(self.log10_delta_min < self.log10_delta_max) {
            return Err(GwasError::config(format!(
                "REML search interval [{}, {}] is empty",
                self.log10_delta_min, self.log10_delta_max
            )));
        }
        if self.tol <= 0.0 || self.max_iter == 0 {
            return Err(GwasError::config("REML tol and max_iter must be positive"));
        }
        Ok(())
    }
}

/// Estimated variance components and the decomposition they rest on.
#[derive(Debug, Clone)]
pub struct VarianceComponents {
    /// Genetic variance s2g.
    pub sigma_g2: f64,
    /// Residual variance s2e.
    pub sigma_e2: f64,
    /// delta = s2e / s2g.
    pub delta: f64,
    /// s2g / (s2g + s2e).
    pub heritability: f64,
    pub log_likelihood: f64,
    /// Brent iterations used.
    pub iterations: usize,
    /// Set when the line search did not converge within its budget.
    pub low_confidence: bool,
    pub warnings: Vec<Warning>,
    eigen: Arc<KinshipEigen>,
}

impl VarianceComponents {
    /// Components for a fixed delta, bypassing estimation.
    pub fn from_delta(eigen: Arc<KinshipEigen>, delta: f64, sigma_g2: f64) -> Self {
        Self {
            sigma_g2,
            sigma_e2: delta * sigma_g2,
            delta,
            heritability: 1.0 / (1.0 + delta),
            log_likelihood: f64::NAN,
            iterations: 0,
            low_confidence: false,
            warnings: Vec::new(),
            eigen,
        }
    }

    pub fn eigen(&self) -> &Arc<KinshipEigen> {
        &self.eigen
    }

    /// Whitening factors 1 / sqrt(lambda_i + delta).
    pub fn whitening_weights(&self) -> Vec<f64> {
        whitening_weights(self.eigen.values(), self.delta)
    }
}

fn whitening_weights(lambda: &[f64], delta: f64) -> Vec<f64> {
    lambda.iter().map(|&l| 1.0 / (l + delta).sqrt()).collect()
}

/// Evaluates the restricted log-likelihood for the rotated data.
struct RemlObjective<'a> {
    lambda: &'a [f64],
    y: &'a [f64],
    x: &'a [Vec<f64>],
    rank_tol: f64,
}

impl RemlObjective<'_> {
    /// (log-likelihood, weighted RSS, rank) at delta = 10^log10_delta.
    fn evaluate(&self, log10_delta: f64) -> (f64, f64, usize) {
        let delta = 10f64.powf(log10_delta);
        let n = self.y.len();
        let w = whitening_weights(self.lambda, delta);
        let scaled = |v: &[f64]| -> Vec<f64> { v.iter().zip(&w).map(|(a, b)| a * b).collect() };

        let columns: Vec<Vec<f64>> = self.x.iter().map(|c| scaled(c.as_slice())).collect();
        let basis = OrthonormalBasis::from_columns(n, columns, self.rank_tol);
        let p = basis.rank();
        let resid = basis.residualize(&scaled(self.y));
        let rss = DenseMatrix::dot(&resid, &resid);
        let dof = (n - p) as f64;
        if rss <= 0.0 || dof <= 0.0 {
            return (f64::NEG_INFINITY, rss, p);
        }

        let log_det_v: f64 = self.lambda.iter().map(|&l| (l + delta).ln()).sum();
        let ll = -0.5
            * (dof * (2.0 * std::f64::consts::PI * rss / dof).ln()
                + dof
                + log_det_v
                + basis.log_det_gram());
        (ll, rss, p)
    }
}

/// Estimates (s2g, s2e) for one phenotype and fixed-effect design.
#[derive(Debug, Clone, Default)]
pub struct VarianceComponentSolver {
    config: RemlConfig,
}

impl VarianceComponentSolver {
    pub fn new(config: RemlConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RemlConfig {
        &self.config
    }

    /// Decompose `kinship` and fit.
    pub fn fit(
        &self,
        phenotype: &[f64],
        kinship: &KinshipMatrix,
        covariates: Option<&DenseMatrix>,
    ) -> Result<VarianceComponents> {
        if kinship.n() != phenotype.len() {
            return Err(GwasError::DataAlignment {
                what: "kinship matrix".to_string(),
                expected: phenotype.len(),
                got: kinship.n(),
            });
        }
        if let Some(index) = phenotype.iter().position(|v| !v.is_finite()) {
            return Err(GwasError::MissingPhenotype { index });
        }
        let fixed = FixedEffects::new(phenotype.len(), covariates, self.config.rank_tol)?;
        let mut warnings = Vec::new();
        let eigen = Arc::new(KinshipEigen::new(kinship, &mut warnings)?);
        let mut vc = self.fit_eigen(phenotype, eigen, &fixed)?;
        warnings.append(&mut vc.warnings);
        vc.warnings = warnings;
        Ok(vc)
    }

    /// Fit against an existing decomposition (reused across iterations).
    pub fn fit_eigen(
        &self,
        phenotype: &[f64],
        eigen: Arc<KinshipEigen>,
        fixed: &FixedEffects,
    ) -> Result<VarianceComponents> {
        let n = phenotype.len();
        if eigen.n() != n || fixed.n_individuals() != n {
            return Err(GwasError::DataAlignment {
                what: "kinship eigenbasis".to_string(),
                expected: n,
                got: eigen.n(),
            });
        }
        if n <= fixed.n_columns() + 1 {
            return Err(GwasError::config(format!(
                "REML needs more individuals ({}) than fixed effects ({}) plus one",
                n,
                fixed.n_columns()
            )));
        }

        let y = eigen.rotate(phenotype);
        let x_rot = eigen.rotate_block(&fixed.to_matrix());
        let x: Vec<Vec<f64>> = (0..x_rot.ncols()).map(|j| x_rot.col(j)).collect();
        let objective = RemlObjective {
            lambda: eigen.values(),
            y: &y,
            x: &x,
            rank_tol: self.config.rank_tol,
        };

        let cfg = &self.config;
        let step = (cfg.log10_delta_max - cfg.log10_delta_min) / (cfg.grid_points - 1) as f64;
        let grid: Vec<f64> = (0..cfg.grid_points)
            .map(|k| cfg.log10_delta_min + k as f64 * step)
            .collect();
        let lls: Vec<f64> = grid.par_iter().map(|&x| objective.evaluate(x).0).collect();

        let best = lls
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .ok_or_else(|| {
                GwasError::config("REML likelihood is not finite anywhere on the search grid")
            })?;
        debug!(
            "REML grid optimum: log10(delta) = {:.3}, logL = {:.4}",
            grid[best], lls[best]
        );

        let mut warnings = Vec::new();
        if best == 0 || best == grid.len() - 1 {
            record(
                &mut warnings,
                Warning::Numerical {
                    message: format!(
                        "REML optimum at the search boundary (log10 delta = {:.2})",
                        grid[best]
                    ),
                },
            );
        }

        let lo = grid[best.saturating_sub(1)];
        let hi = grid[(best + 1).min(grid.len() - 1)];
        let min = brent_minimize(|x| -objective.evaluate(x).0, lo, hi, cfg.tol, cfg.max_iter);
        let (log10_delta, ll) = if min.fx.is_finite() && -min.fx >= lls[best] {
            (min.x, -min.fx)
        } else {
            (grid[best], lls[best])
        };
        if !min.converged {
            record(
                &mut warnings,
                Warning::LowConfidence {
                    delta: 10f64.powf(log10_delta),
                    iterations: min.iterations,
                },
            );
        }

        let (_, rss, p) = objective.evaluate(log10_delta);
        let delta = 10f64.powf(log10_delta);
        let sigma_g2 = rss / (n - p) as f64;
        let sigma_e2 = delta * sigma_g2;
        info!(
            "REML: delta = {:.4e}, s2g = {:.4e}, s2e = {:.4e}, h2 = {:.3}",
            delta,
            sigma_g2,
            sigma_e2,
            1.0 / (1.0 + delta)
        );

        Ok(VarianceComponents {
            sigma_g2,
            sigma_e2,
            delta,
            heritability: 1.0 / (1.0 + delta),
            log_likelihood: ll,
            iterations: min.iterations,
            low_confidence: !min.converged,
            warnings,
            eigen,
        })
    }
}
