//! Per-marker least squares test against a fixed null design.
//!
//! With an orthonormal basis Q of the null design X, the marker
//! coefficient of the regression y ~ X + g is
//!   g~ = (I - QQ') g,  y~ = (I - QQ') y
//!   beta = g~'y~ / g~'g~
//!   RSS  = y~'y~ - beta^2 g~'g~
//!   se   = sqrt(RSS / df / g~'g~),  df = n - rank(X) - 1
//! so each marker costs O(n * rank(X)) and no per-marker solve is needed.

use panicle_linalg::decomposition::OrthonormalBasis;
use panicle_linalg::DenseMatrix;

use super::AssociationResult;
use crate::util::stats::t_test_pvalue;

/// Null model (fixed effects only) that markers are tested against.
#[derive(Debug, Clone)]
pub struct NullModel {
    basis: OrthonormalBasis,
    y_resid: Vec<f64>,
    rss: f64,
    n: usize,
    rank_tol: f64,
}

impl NullModel {
    /// Fit y on the given design columns. Dependent columns are dropped.
    pub fn fit(n: usize, columns: Vec<Vec<f64>>, y: &[f64], rank_tol: f64) -> Self {
        let basis = OrthonormalBasis::from_columns(n, columns, rank_tol);
        let y_resid = basis.residualize(y);
        let rss = DenseMatrix::dot(&y_resid, &y_resid);
        Self {
            basis,
            y_resid,
            rss,
            n,
            rank_tol,
        }
    }

    /// Numerical rank of the null design.
    pub fn rank(&self) -> usize {
        self.basis.rank()
    }

    /// Residual sum of squares of the null fit.
    pub fn rss(&self) -> f64 {
        self.rss
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// Test one marker column (already in the same space as `y`).
    ///
    /// Returns `None` when the marker is collinear with the null design.
    pub fn test(&self, g: &[f64]) -> Option<AssociationResult> {
        let norm0 = DenseMatrix::dot(g, g);
        if norm0 == 0.0 || !norm0.is_finite() {
            return None;
        }
        let g_resid = self.basis.residualize(g);
        let gg = DenseMatrix::dot(&g_resid, &g_resid);
        if gg <= self.rank_tol * self.rank_tol * norm0 {
            return None;
        }

        let df = self.n as f64 - self.rank() as f64 - 1.0;
        if df <= 0.0 {
            return None;
        }

        let gy = DenseMatrix::dot(&g_resid, &self.y_resid);
        let effect = gy / gg;
        let rss = (self.rss - effect * gy).max(0.0);
        let sigma2 = rss / df;
        let se = (sigma2 / gg).sqrt();
        let tstat = if se > 0.0 {
            effect / se
        } else if effect == 0.0 {
            0.0
        } else {
            effect.signum() * f64::INFINITY
        };

        Some(AssociationResult {
            effect,
            se,
            tstat,
            pvalue: t_test_pvalue(tstat, df),
        })
    }
}
