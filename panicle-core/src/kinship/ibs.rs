//! Identity-by-state similarity.
//!
//! For a pair of calls the shared-allele score is 1 for equal dosages,
//! 0.5 when they differ by one and 0 when they differ by two. K_ij is the
//! mean score over markers where both i and j are observed, so a missing
//! call removes that marker from the pair's denominator instead of
//! counting as a mismatch. Pairs with no jointly observed marker get 0.
//!
//! With one-hot indicators I0, I1, I2 (n x b) and O = I0 + I1 + I2:
//!   S = I0 (I0 + I1/2)' + I1 (I0/2 + I1 + I2/2)' + I2 (I1/2 + I2)'
//!   C = O O'
//! and K = S / C elementwise after summing over blocks.

use panicle_geno::GenotypeMatrix;
use panicle_linalg::DenseMatrix;
use rayon::prelude::*;

pub(crate) fn ibs(genotypes: &GenotypeMatrix, block_size: usize) -> DenseMatrix {
    let n = genotypes.n_individuals();
    let m = genotypes.n_markers();
    let block_size = block_size.max(1);
    let n_blocks = m.div_ceil(block_size);

    let (score, count) = (0..n_blocks)
        .into_par_iter()
        .fold(
            || (DenseMatrix::zeros(n, n), DenseMatrix::zeros(n, n)),
            |(mut score, mut count), b| {
                let start = b * block_size;
                let end = (start + block_size).min(m);
                let (s, c) = block_scores(genotypes, start, end);
                score.add_assign(&s);
                count.add_assign(&c);
                (score, count)
            },
        )
        .reduce(
            || (DenseMatrix::zeros(n, n), DenseMatrix::zeros(n, n)),
            |(mut s1, mut c1), (s2, c2)| {
                s1.add_assign(&s2);
                c1.add_assign(&c2);
                (s1, c1)
            },
        );

    DenseMatrix::from_fn(n, n, |i, j| {
        let c = count.get(i, j);
        if c > 0.0 {
            score.get(i, j) / c
        } else {
            0.0
        }
    })
}

fn block_scores(genotypes: &GenotypeMatrix, start: usize, end: usize) -> (DenseMatrix, DenseMatrix) {
    let n = genotypes.n_individuals();
    let b = end - start;
    let indicator = |dosage: i8| {
        DenseMatrix::from_fn(n, b, |i, k| {
            if genotypes.column(start + k)[i] == dosage {
                1.0
            } else {
                0.0
            }
        })
    };
    let i0 = indicator(0);
    let i1 = indicator(1);
    let i2 = indicator(2);

    let combine = |a: f64, x: &DenseMatrix, c: f64, y: &DenseMatrix, e: f64, z: &DenseMatrix| {
        DenseMatrix::from_fn(n, b, |i, k| a * x.get(i, k) + c * y.get(i, k) + e * z.get(i, k))
    };
    let r0 = combine(1.0, &i0, 0.5, &i1, 0.0, &i2);
    let r1 = combine(0.5, &i0, 1.0, &i1, 0.5, &i2);
    let r2 = combine(0.0, &i0, 0.5, &i1, 1.0, &i2);
    let observed = combine(1.0, &i0, 1.0, &i1, 1.0, &i2);

    let mut score = i0.mul_transpose(&r0);
    score.add_assign(&i1.mul_transpose(&r1));
    score.add_assign(&i2.mul_transpose(&r2));
    (score, observed.gram())
}

#[cfg(test)]
mod tests {
    use super::*;
    use panicle_geno::MISSING_GENOTYPE;

    fn naive(cols: &[Vec<i8>], n: usize) -> Vec<Vec<f64>> {
        let mut k = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                let (mut s, mut c) = (0.0, 0.0);
                for col in cols {
                    let (a, b) = (col[i], col[j]);
                    if a == MISSING_GENOTYPE || b == MISSING_GENOTYPE {
                        continue;
                    }
                    s += 1.0 - (a - b).abs() as f64 / 2.0;
                    c += 1.0;
                }
                k[i][j] = if c > 0.0 { s / c } else { 0.0 };
            }
        }
        k
    }

    #[test]
    fn test_matches_pairwise_definition() {
        let cols = vec![
            vec![0i8, 1, 2, MISSING_GENOTYPE],
            vec![2, 2, 0, 1],
            vec![1, MISSING_GENOTYPE, 1, 0],
        ];
        let g = GenotypeMatrix::from_columns(4, cols.clone()).unwrap();
        let k = ibs(&g, 2);
        let expected = naive(&cols, 4);
        for i in 0..4 {
            for j in 0..4 {
                assert!((k.get(i, j) - expected[i][j]).abs() < 1e-12, "({}, {})", i, j);
            }
        }
        // Observed individuals are identical to themselves.
        assert!((k.get(0, 0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_shared_observation_is_zero() {
        let g = GenotypeMatrix::from_columns(2, vec![vec![0, MISSING_GENOTYPE], vec![MISSING_GENOTYPE, 2]])
            .unwrap();
        let k = ibs(&g, 1);
        assert_eq!(k.get(0, 1), 0.0);
        assert_eq!(k.get(1, 0), 0.0);
    }
}
