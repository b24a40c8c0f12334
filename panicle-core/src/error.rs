//! Error and warning types shared by every engine.
//!
//! `GwasError` covers the conditions that abort a run before (or
//! instead of) computing anything. `Warning` covers the conditions a
//! run degrades through: they are attached to the result and logged.

use std::fmt;

use panicle_geno::GenotypeError;
use panicle_linalg::LinalgError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum GwasError {
    #[error("data alignment: {what} has {got} rows, expected {expected}")]
    DataAlignment {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("phenotype is missing for individual {index}; match individuals before analysis")]
    MissingPhenotype { index: usize },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("genotype data: {0}")]
    Genotype(#[from] GenotypeError),

    #[error("linear algebra failure: {0}")]
    Linalg(#[from] LinalgError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, GwasError>;

impl GwasError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        GwasError::Configuration(msg.into())
    }
}

/// Non-fatal condition recorded during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Warning {
    /// Markers whose design was singular; their results are missing.
    RankDeficiency { markers: usize },
    /// Eigenvalue clipping, boundary REML optimum and similar.
    Numerical { message: String },
    /// An iterative engine stopped without its QTN set stabilising.
    NonConvergence {
        engine: String,
        iterations: usize,
        reason: String,
    },
    /// REML line search ran out of iterations; best delta kept.
    LowConfidence { delta: f64, iterations: usize },
    /// Cooperative cancellation; results past `completed` are missing.
    Cancelled { completed: usize, total: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::RankDeficiency { markers } => {
                write!(f, "{} marker(s) collinear with the fixed effects; reported as missing", markers)
            }
            Warning::Numerical { message } => write!(f, "numerical: {}", message),
            Warning::NonConvergence {
                engine,
                iterations,
                reason,
            } => write!(f, "{} did not converge after {} iteration(s): {}", engine, iterations, reason),
            Warning::LowConfidence { delta, iterations } => write!(
                f,
                "REML search stopped after {} iteration(s) without converging; using delta = {:.4e}",
                iterations, delta
            ),
            Warning::Cancelled { completed, total } => {
                write!(f, "cancelled after {} of {} unit(s)", completed, total)
            }
        }
    }
}

/// Log a warning and append it to the run's warning list.
pub(crate) fn record(warnings: &mut Vec<Warning>, warning: Warning) {
    warn!("{}", warning);
    warnings.push(warning);
}
