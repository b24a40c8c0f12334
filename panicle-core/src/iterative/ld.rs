//! Linkage-disequilibrium pruning of pseudo-QTN candidates.

use panicle_geno::GenotypeMatrix;

use crate::util::stats::pearson;

/// Walk `ordered` (most significant first) and keep a marker only if its
/// |r| with every marker kept so far is at most `threshold`. Stops once
/// `limit` markers are kept.
pub(crate) fn ld_prune(
    genotypes: &GenotypeMatrix,
    ordered: &[usize],
    threshold: f64,
    limit: usize,
) -> Vec<usize> {
    let mut kept = Vec::new();
    let mut kept_columns: Vec<Vec<f64>> = Vec::new();
    for &j in ordered {
        if kept.len() >= limit {
            break;
        }
        let col = genotypes.dosages_imputed(j);
        if kept_columns
            .iter()
            .any(|c| pearson(c, &col).abs() > threshold)
        {
            continue;
        }
        kept.push(j);
        kept_columns.push(col);
    }
    kept
}

/// Sort marker indices by ascending p-value; missing p-values go last.
pub(crate) fn order_by_pvalue(markers: &mut [usize], pvalues: &[f64]) {
    markers.sort_by(|&a, &b| {
        let (pa, pb) = (pvalues[a], pvalues[b]);
        match (pa.is_nan(), pb.is_nan()) {
            (false, false) => pa.total_cmp(&pb).then(a.cmp(&b)),
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (true, true) => a.cmp(&b),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prunes_correlated_markers() {
        let g = GenotypeMatrix::from_columns(
            6,
            vec![
                vec![0, 1, 2, 0, 1, 2],
                vec![0, 1, 2, 0, 1, 1],
                vec![2, 0, 1, 1, 0, 2],
            ],
        )
        .unwrap();
        assert_eq!(ld_prune(&g, &[0, 1, 2], 0.7, usize::MAX), vec![0, 2]);
        assert_eq!(ld_prune(&g, &[1, 0, 2], 0.99, usize::MAX), vec![1, 0, 2]);
        assert_eq!(ld_prune(&g, &[0, 1, 2], 0.7, 1), vec![0]);
    }

    #[test]
    fn test_order_by_pvalue() {
        let p = [0.5, f64::NAN, 0.01, 0.2];
        let mut idx = vec![0, 1, 2, 3];
        order_by_pvalue(&mut idx, &p);
        assert_eq!(idx, vec![2, 3, 0, 1]);
    }
}
