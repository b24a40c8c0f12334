//! Property-based tests using proptest.
//!
//! Invariants that must hold for any valid input:
//!   - one result per marker, in column order, p-values in [0, 1]
//!   - kinship symmetry and non-negative eigenvalues after clipping
//!   - resampling output independent of resample order
//!   - iterative engines stop within their iteration cap

use proptest::prelude::*;

use panicle_core::mixed::KinshipEigen;
use panicle_core::{
    FarmCpu, FarmCpuConfig, FarmCpuResampling, GlmScanner, KinshipConfig, KinshipEngine,
    KinshipMethod, ResamplingConfig, ScanConfig,
};
use panicle_geno::{GenotypeMatrix, MarkerMap, MISSING_GENOTYPE};

/// n x m genotype matrix with roughly 5% missing calls.
fn genotypes(n: std::ops::Range<usize>, m: std::ops::Range<usize>) -> impl Strategy<Value = GenotypeMatrix> {
    (n, m).prop_flat_map(|(n, m)| {
        proptest::collection::vec(
            proptest::collection::vec(
                prop_oneof![
                    19 => 0i8..3,
                    1 => Just(MISSING_GENOTYPE),
                ],
                n,
            ),
            m,
        )
        .prop_map(move |cols| GenotypeMatrix::from_columns(n, cols).unwrap())
    })
}

fn phenotype_for(n: usize, seed: u64) -> Vec<f64> {
    use rand::{Rng, SeedableRng};
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-2.0..2.0)).collect()
}

// ---------------------------------------------------------------------------
// 1. GLM output shape and p-value bounds
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_glm_one_result_per_marker(
        g in genotypes(6..30, 1..40),
        seed in 0u64..1000,
        batch in 1usize..16,
    ) {
        let y = phenotype_for(g.n_individuals(), seed);
        let scanner = GlmScanner::new(ScanConfig { batch_size: batch, ..Default::default() }).unwrap();
        let scan = scanner.scan(&g, &y, None).unwrap();
        prop_assert_eq!(scan.results.len(), g.n_markers());
        prop_assert_eq!(scan.completed, g.n_markers());
        for r in &scan.results {
            if !r.is_missing() {
                prop_assert!(r.pvalue >= 0.0 && r.pvalue <= 1.0);
                prop_assert!(r.se >= 0.0);
            }
        }
    }

    #[test]
    fn prop_glm_batch_size_invariant(
        g in genotypes(8..20, 2..30),
        seed in 0u64..1000,
        batch in 1usize..8,
    ) {
        let y = phenotype_for(g.n_individuals(), seed);
        let small = GlmScanner::new(ScanConfig { batch_size: batch, ..Default::default() })
            .unwrap()
            .scan(&g, &y, None)
            .unwrap();
        let large = GlmScanner::default().scan(&g, &y, None).unwrap();
        for (a, b) in small.results.iter().zip(&large.results) {
            prop_assert_eq!(a.is_missing(), b.is_missing());
            if !a.is_missing() {
                prop_assert!((a.pvalue - b.pvalue).abs() < 1e-12);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Kinship symmetry and clipped eigenvalues
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn prop_kinship_symmetric_and_clipped_psd(
        g in genotypes(3..25, 1..60),
        ibs in any::<bool>(),
        block in 1usize..20,
    ) {
        let method = if ibs { KinshipMethod::Ibs } else { KinshipMethod::VanRaden };
        let engine = KinshipEngine::new(KinshipConfig { method, block_size: block }).unwrap();
        // An all-monomorphic VanRaden input is a configuration error, not a panic.
        let Ok(kin) = engine.build(&g) else { return Ok(()); };
        prop_assert_eq!(kin.n(), g.n_individuals());
        for i in 0..kin.n() {
            for j in 0..kin.n() {
                prop_assert_eq!(kin.get(i, j), kin.get(j, i));
            }
        }
        let mut warnings = Vec::new();
        let eigen = KinshipEigen::new(&kin, &mut warnings).unwrap();
        prop_assert!(eigen.values().iter().all(|&v| v >= 0.0));
    }
}

// ---------------------------------------------------------------------------
// 3. Iterative engines: termination and resampling order invariance
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    #[test]
    fn prop_farmcpu_respects_iteration_cap(
        g in genotypes(20..40, 5..30),
        seed in 0u64..1000,
        cap in 1usize..5,
    ) {
        let y = phenotype_for(g.n_individuals(), seed);
        let map = MarkerMap::uniform(g.n_markers(), 250_000);
        let config = FarmCpuConfig {
            qtn_threshold: 0.5,
            p_threshold: Some(0.5),
            max_iterations: cap,
            ..Default::default()
        };
        let res = FarmCpu::new(config, ScanConfig::default())
            .unwrap()
            .run(&g, &map, &y, None, None)
            .unwrap();
        prop_assert!(res.iterations <= cap);
        prop_assert_eq!(res.results.len(), g.n_markers());
        prop_assert!(res.qtns.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn prop_resampling_order_invariant(
        g in genotypes(20..30, 3..15),
        seed in 0u64..1000,
        rng_seed in any::<u64>(),
    ) {
        let y = phenotype_for(g.n_individuals(), seed);
        let map = MarkerMap::uniform(g.n_markers(), 1_000_000);
        let engine = FarmCpuResampling::new(
            ResamplingConfig { n_resamples: 3, sample_fraction: 0.8, seed: rng_seed },
            FarmCpuConfig { p_threshold: Some(0.05), ..Default::default() },
            ScanConfig::default(),
        )
        .unwrap();
        let a = engine.run_resamples(&[0, 1, 2], &g, &map, &y, None, None).unwrap();
        let b = engine.run_resamples(&[1, 2, 0], &g, &map, &y, None, None).unwrap();
        prop_assert_eq!(a.counts, b.counts);
        prop_assert_eq!(a.frequencies, b.frequencies);
    }
}
