//! Fixed-effect design: implicit intercept plus covariates.
//!
//! Covariate columns that are linearly dependent on the intercept or on
//! earlier covariates (including an explicit constant column) are
//! dropped, so the design handed to the scanners is full rank.

use panicle_geno::GenotypeMatrix;
use panicle_linalg::decomposition::OrthonormalBasis;
use panicle_linalg::DenseMatrix;
use tracing::debug;

use crate::error::{GwasError, Result};

/// Relative residual norm below which a design column counts as dependent.
pub const DEFAULT_RANK_TOL: f64 = 1e-8;

/// Full-rank fixed-effect design, stored as columns.
#[derive(Debug, Clone)]
pub struct FixedEffects {
    n: usize,
    columns: Vec<Vec<f64>>,
    /// Indices of input covariate columns removed as dependent.
    dropped: Vec<usize>,
}

impl FixedEffects {
    /// Intercept-only design.
    pub fn intercept_only(n: usize) -> Self {
        Self {
            n,
            columns: vec![vec![1.0; n]],
            dropped: Vec::new(),
        }
    }

    /// Intercept followed by the independent columns of `covariates`.
    pub fn new(n: usize, covariates: Option<&DenseMatrix>, rank_tol: f64) -> Result<Self> {
        let Some(cov) = covariates else {
            return Ok(Self::intercept_only(n));
        };
        if cov.nrows() != n {
            return Err(GwasError::DataAlignment {
                what: "covariate matrix".to_string(),
                expected: n,
                got: cov.nrows(),
            });
        }

        let mut columns = vec![vec![1.0; n]];
        for j in 0..cov.ncols() {
            let col = cov.col(j);
            if let Some(i) = col.iter().position(|v| !v.is_finite()) {
                return Err(GwasError::config(format!(
                    "covariate column {} has a non-finite value at individual {}",
                    j, i
                )));
            }
            columns.push(col);
        }

        let basis = OrthonormalBasis::from_columns(n, columns.clone(), rank_tol);
        let kept = basis.kept().to_vec();
        // Column 0 of `columns` is the intercept, so covariate j sits at j + 1.
        let dropped: Vec<usize> = (0..cov.ncols()).filter(|j| !kept.contains(&(j + 1))).collect();
        if !dropped.is_empty() {
            debug!("Dropping dependent covariate column(s) {:?}", dropped);
        }
        let columns = kept.into_iter().map(|k| columns[k].clone()).collect();

        Ok(Self {
            n,
            columns,
            dropped,
        })
    }

    /// Design extended by extra columns (e.g. pseudo-QTN dosages).
    ///
    /// Extra columns are not screened here; the per-scan null model drops
    /// any that turn out dependent.
    pub fn with_columns(&self, extra: impl IntoIterator<Item = Vec<f64>>) -> Self {
        let mut columns = self.columns.clone();
        columns.extend(extra);
        Self {
            n: self.n,
            columns,
            dropped: self.dropped.clone(),
        }
    }

    pub fn n_individuals(&self) -> usize {
        self.n
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    pub fn dropped(&self) -> &[usize] {
        &self.dropped
    }

    pub fn to_matrix(&self) -> DenseMatrix {
        DenseMatrix::from_columns(self.n, &self.columns)
    }
}

/// Check that genotype, phenotype and covariate rows line up and that
/// the phenotype has no missing values.
pub fn validate_inputs(
    genotypes: &GenotypeMatrix,
    phenotype: &[f64],
    covariates: Option<&DenseMatrix>,
) -> Result<()> {
    let n = genotypes.n_individuals();
    if phenotype.len() != n {
        return Err(GwasError::DataAlignment {
            what: "phenotype".to_string(),
            expected: n,
            got: phenotype.len(),
        });
    }
    if let Some(cov) = covariates {
        if cov.nrows() != n {
            return Err(GwasError::DataAlignment {
                what: "covariate matrix".to_string(),
                expected: n,
                got: cov.nrows(),
            });
        }
    }
    if let Some(index) = phenotype.iter().position(|v| !v.is_finite()) {
        return Err(GwasError::MissingPhenotype { index });
    }
    Ok(())
}
