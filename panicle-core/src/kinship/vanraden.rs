//! VanRaden (2008) genomic relationship matrix.
//!
//!   K = Z Z' / (2 * sum_j p_j (1 - p_j)),  Z_ij = g_ij - 2 p_j
//!
//! Missing calls are mean-imputed, i.e. contribute 0 to Z. Monomorphic
//! markers have an all-zero Z column and are skipped outright.

use panicle_geno::{GenotypeMatrix, MarkerStats, MISSING_GENOTYPE};
use panicle_linalg::DenseMatrix;
use tracing::info;

use super::blockwise_gram;
use crate::error::{GwasError, Result};

pub(crate) fn vanraden(genotypes: &GenotypeMatrix, block_size: usize) -> Result<DenseMatrix> {
    let (sum, denom) = blockwise_gram(genotypes, block_size, centered_column);
    if denom <= 0.0 {
        return Err(GwasError::config(
            "VanRaden kinship needs at least one polymorphic marker",
        ));
    }
    info!("VanRaden scaling factor 2*sum(p(1-p)) = {:.4}", denom);
    Ok(sum.scale(1.0 / denom))
}

fn centered_column(calls: &[i8]) -> Option<(Vec<f64>, f64)> {
    let stats = MarkerStats::from_calls(calls);
    if stats.n_valid == 0 || stats.is_monomorphic() {
        return None;
    }
    let mean = 2.0 * stats.af;
    let z = calls
        .iter()
        .map(|&g| if g == MISSING_GENOTYPE { 0.0 } else { g as f64 - mean })
        .collect();
    Some((z, 2.0 * stats.af * (1.0 - stats.af)))
}
