//! End-to-end scenarios on simulated populations.
//!
//! Genotypes are drawn under Hardy-Weinberg equilibrium with allele
//! frequencies uniform on [0.1, 0.9]; every simulation is seeded so the
//! assertions are deterministic.

use panicle_core::{
    Blink, BlinkConfig, CancellationToken, FarmCpu, FarmCpuConfig,
    FarmCpuResampling, GlmScanner, KinshipConfig, KinshipEngine, KinshipMethod, MlmScanner,
    PcaConfig, PcaEngine, RemlConfig, ResamplingConfig, ScanConfig, VarianceComponentSolver,
    Warning,
};
use panicle_geno::{GenotypeMatrix, MarkerMap, MISSING_GENOTYPE};
use panicle_linalg::DenseMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

fn simulate_genotypes(rng: &mut ChaCha8Rng, n: usize, m: usize) -> GenotypeMatrix {
    let cols: Vec<Vec<i8>> = (0..m)
        .map(|_| {
            let p: f64 = rng.gen_range(0.1..0.9);
            (0..n)
                .map(|_| (rng.gen::<f64>() < p) as i8 + (rng.gen::<f64>() < p) as i8)
                .collect()
        })
        .collect();
    GenotypeMatrix::from_columns(n, cols).unwrap()
}

fn normal_vec(rng: &mut ChaCha8Rng, n: usize, sd: f64) -> Vec<f64> {
    let dist = Normal::new(0.0, sd).unwrap();
    (0..n).map(|_| dist.sample(rng)).collect()
}

/// Phenotype driven by `causal` markers with effect `beta` plus N(0, 1) noise.
fn phenotype_from(g: &GenotypeMatrix, causal: &[usize], beta: f64, rng: &mut ChaCha8Rng) -> Vec<f64> {
    let noise = normal_vec(rng, g.n_individuals(), 1.0);
    (0..g.n_individuals())
        .map(|i| {
            causal
                .iter()
                .map(|&j| beta * g.column(j)[i] as f64)
                .sum::<f64>()
                + noise[i]
        })
        .collect()
}

mod glm {
    use super::*;

    #[test]
    fn test_strong_marker_with_independent_covariates() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let (n, m) = (100, 50);
        let g = simulate_genotypes(&mut rng, n, m);
        let covariates = DenseMatrix::from_columns(n, &[normal_vec(&mut rng, n, 1.0), normal_vec(&mut rng, n, 1.0)]);
        let noise = normal_vec(&mut rng, n, 0.05);
        let y: Vec<f64> = (0..n).map(|i| g.column(7)[i] as f64 + noise[i]).collect();

        let scan = GlmScanner::default().scan(&g, &y, Some(&covariates)).unwrap();
        assert_eq!(scan.results.len(), m);
        assert!(scan.results[7].pvalue < 1e-6, "p = {}", scan.results[7].pvalue);
        assert_eq!(scan.best_marker(), Some(7));
    }

    #[test]
    fn test_null_false_positive_rate_near_nominal() {
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let (n, m, sims) = (100, 50, 100);
        let mut hits = 0usize;
        let mut tests = 0usize;
        for _ in 0..sims {
            let g = simulate_genotypes(&mut rng, n, m);
            let y = normal_vec(&mut rng, n, 1.0);
            let scan = GlmScanner::default().scan(&g, &y, None).unwrap();
            for r in scan.results.iter().filter(|r| !r.is_missing()) {
                assert!((0.0..=1.0).contains(&r.pvalue));
                tests += 1;
                if r.pvalue < 0.05 {
                    hits += 1;
                }
            }
        }
        let rate = hits as f64 / tests as f64;
        assert!(tests >= 4900);
        assert!((0.035..0.065).contains(&rate), "false positive rate {}", rate);
    }

    #[test]
    fn test_cancelled_scan_keeps_full_length() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let g = simulate_genotypes(&mut rng, 30, 40);
        let y = normal_vec(&mut rng, 30, 1.0);
        let token = CancellationToken::new();
        token.cancel();
        let scanner = GlmScanner::new(ScanConfig { batch_size: 8, ..Default::default() }).unwrap();
        let scan = scanner.scan_with_cancel(&g, &y, None, Some(&token)).unwrap();
        assert_eq!(scan.results.len(), 40);
        assert_eq!(scan.completed, 0);
        assert!(scan.warnings.contains(&Warning::Cancelled { completed: 0, total: 40 }));
    }
}

mod kinship {
    use super::*;

    #[test]
    fn test_vanraden_diagonal_near_one() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let g = simulate_genotypes(&mut rng, 200, 5000);
        let kin = KinshipEngine::default().build(&g).unwrap();
        let d = kin.diag_mean();
        assert!((d - 1.0).abs() < 0.1, "diagonal mean {}", d);
    }

    #[test]
    fn test_both_methods_symmetric() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut cols: Vec<Vec<i8>> = (0..300)
            .map(|_| (0..40).map(|_| rng.gen_range(0..3)).collect())
            .collect();
        cols[0][5] = MISSING_GENOTYPE;
        cols[17][9] = MISSING_GENOTYPE;
        let g = GenotypeMatrix::from_columns(40, cols).unwrap();
        for method in [KinshipMethod::VanRaden, KinshipMethod::Ibs] {
            let kin = KinshipEngine::new(KinshipConfig { method, block_size: 64 })
                .unwrap()
                .build(&g)
                .unwrap();
            assert_eq!(kin.as_dense().max_asymmetry(), 0.0);
        }
    }

    #[test]
    fn test_block_size_does_not_change_result() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let g = simulate_genotypes(&mut rng, 25, 230);
        let a = KinshipEngine::new(KinshipConfig { block_size: 7, ..Default::default() })
            .unwrap()
            .build(&g)
            .unwrap();
        let b = KinshipEngine::new(KinshipConfig { block_size: 1000, ..Default::default() })
            .unwrap()
            .build(&g)
            .unwrap();
        for i in 0..25 {
            for j in 0..25 {
                assert!((a.get(i, j) - b.get(i, j)).abs() < 1e-10);
            }
        }
    }
}

mod pca {
    use super::*;

    #[test]
    fn test_two_runs_agree_up_to_sign() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let g = simulate_genotypes(&mut rng, 60, 400);
        let engine = PcaEngine::new(PcaConfig { n_components: 3, block_size: 97 }).unwrap();
        let a = engine.compute(&g).unwrap();
        let b = engine.compute(&g).unwrap();
        for c in 0..3 {
            let (x, y) = (a.components.col(c), b.components.col(c));
            let same = x.iter().zip(&y).all(|(u, v)| (u - v).abs() < 1e-8);
            let flipped = x.iter().zip(&y).all(|(u, v)| (u + v).abs() < 1e-8);
            assert!(same || flipped);
        }
        assert!(a.variance_explained.iter().sum::<f64>() <= 1.0 + 1e-12);
    }

    #[test]
    fn test_too_many_components_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(22);
        let g = simulate_genotypes(&mut rng, 5, 20);
        let engine = PcaEngine::new(PcaConfig { n_components: 6, ..Default::default() }).unwrap();
        assert!(engine.compute(&g).is_err());
    }
}

mod mixed {
    use super::*;

    #[test]
    fn test_mlm_finds_causal_marker() {
        let mut rng = ChaCha8Rng::seed_from_u64(31);
        let g = simulate_genotypes(&mut rng, 150, 300);
        let y = phenotype_from(&g, &[42], 1.0, &mut rng);
        let kin = KinshipEngine::default().build(&g).unwrap();
        let vc = VarianceComponentSolver::default().fit(&y, &kin, None).unwrap();
        assert!(vc.delta > 0.0 && vc.sigma_g2 > 0.0);

        let scan = MlmScanner::default().scan(&g, &y, None, &vc).unwrap();
        assert_eq!(scan.results.len(), 300);
        assert_eq!(scan.best_marker(), Some(42));
        assert!(scan.results[42].pvalue < 1e-6);
    }
}

mod iterative {
    use super::*;

    #[test]
    fn test_farmcpu_terminates_without_signal() {
        let mut rng = ChaCha8Rng::seed_from_u64(41);
        let g = simulate_genotypes(&mut rng, 100, 200);
        let map = MarkerMap::uniform(200, 50_000);
        let y = normal_vec(&mut rng, 100, 1.0);

        // Loose thresholds force a QTN set on every iteration.
        let config = FarmCpuConfig {
            qtn_threshold: 1.0,
            p_threshold: Some(1.0),
            max_iterations: 4,
            ..Default::default()
        };
        let engine = FarmCpu::new(config, ScanConfig::default()).unwrap();
        let res = engine.run(&g, &map, &y, None, None).unwrap();
        assert_eq!(res.results.len(), 200);
        assert!(res.iterations <= 4);
        if !res.converged {
            assert!(res
                .warnings
                .iter()
                .any(|w| matches!(w, Warning::NonConvergence { .. })));
        }
    }

    #[test]
    fn test_farmcpu_default_thresholds_stop_early_on_null() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let g = simulate_genotypes(&mut rng, 100, 200);
        let map = MarkerMap::uniform(200, 50_000);
        let y = normal_vec(&mut rng, 100, 1.0);
        let res = FarmCpu::new(FarmCpuConfig::default(), ScanConfig::default())
            .unwrap()
            .run(&g, &map, &y, None, None)
            .unwrap();
        // 0.01 / 200 = 5e-5 is rarely reached by chance; either way the run ends.
        assert!(res.iterations <= 10);
        assert_eq!(res.results.len(), 200);
    }

    #[test]
    fn test_farmcpu_and_blink_recover_causal_markers() {
        let mut rng = ChaCha8Rng::seed_from_u64(43);
        let g = simulate_genotypes(&mut rng, 300, 400);
        let map = MarkerMap::uniform(400, 1_000_000);
        let y = phenotype_from(&g, &[50, 250], 1.0, &mut rng);

        let farmcpu = FarmCpu::new(FarmCpuConfig::default(), ScanConfig::default())
            .unwrap()
            .run(&g, &map, &y, None, None)
            .unwrap();
        assert!(farmcpu.qtns.contains(&50) && farmcpu.qtns.contains(&250), "{:?}", farmcpu.qtns);
        assert!(farmcpu.results[50].pvalue < 1e-10);

        let blink = Blink::new(BlinkConfig::default(), ScanConfig::default())
            .unwrap()
            .run(&g, &map, &y, None, None)
            .unwrap();
        assert!(blink.qtns.contains(&50) && blink.qtns.contains(&250), "{:?}", blink.qtns);
        assert_eq!(blink.results.len(), 400);
    }

    #[test]
    fn test_default_cap_with_dense_bins() {
        // 2,000 markers 10 kb apart: 50 markers per 500 kb bin, so far more
        // bins pass the per-bin threshold by chance than the default cap
        // (11 for 300 individuals) allows.
        let mut rng = ChaCha8Rng::seed_from_u64(46);
        let (n, m) = (300, 2000);
        let g = simulate_genotypes(&mut rng, n, m);
        let map = MarkerMap::uniform(m, 10_000);
        let y = phenotype_from(&g, &[100, 1500], 1.0, &mut rng);

        let farmcpu = FarmCpu::new(FarmCpuConfig::default(), ScanConfig::default())
            .unwrap()
            .run(&g, &map, &y, None, None)
            .unwrap();
        assert!(farmcpu.iterations >= 2, "iterations = {}", farmcpu.iterations);
        assert!(!farmcpu.qtns.is_empty() && farmcpu.qtns.len() <= 11, "{:?}", farmcpu.qtns);
        assert!(
            farmcpu.qtns.contains(&100) && farmcpu.qtns.contains(&1500),
            "{:?}",
            farmcpu.qtns
        );
        assert!(farmcpu.results[100].pvalue < 1e-8);
        assert!(farmcpu.results[1500].pvalue < 1e-8);

        let resampling = FarmCpuResampling::new(
            ResamplingConfig { n_resamples: 5, ..Default::default() },
            FarmCpuConfig::default(),
            ScanConfig::default(),
        )
        .unwrap()
        .run(&g, &map, &y, None, None)
        .unwrap();
        assert_eq!(resampling.completed, 5);
        assert!(resampling.frequencies[100] >= 0.8, "freq = {}", resampling.frequencies[100]);
        assert!(resampling.frequencies[1500] >= 0.8, "freq = {}", resampling.frequencies[1500]);
        assert!(resampling.counts.iter().sum::<u32>() > 0);
    }

    #[test]
    fn test_farmcpu_with_kinship_runs() {
        let mut rng = ChaCha8Rng::seed_from_u64(44);
        let g = simulate_genotypes(&mut rng, 120, 150);
        let map = MarkerMap::uniform(150, 1_000_000);
        let y = phenotype_from(&g, &[10], 1.0, &mut rng);
        let kin = KinshipEngine::default().build(&g).unwrap();
        let engine = FarmCpu::with_kinship(
            FarmCpuConfig::default(),
            ScanConfig::default(),
            RemlConfig::default(),
            &kin,
        )
        .unwrap();
        let res = engine.run(&g, &map, &y, None, None).unwrap();
        assert_eq!(res.results.len(), 150);
        assert!(res.qtns.contains(&10));
    }

    #[test]
    fn test_resampling_order_invariant() {
        let mut rng = ChaCha8Rng::seed_from_u64(45);
        let g = simulate_genotypes(&mut rng, 80, 60);
        let map = MarkerMap::uniform(60, 1_000_000);
        let y = phenotype_from(&g, &[5], 1.5, &mut rng);
        let engine = FarmCpuResampling::new(
            ResamplingConfig { n_resamples: 3, sample_fraction: 0.8, seed: 7 },
            FarmCpuConfig::default(),
            ScanConfig::default(),
        )
        .unwrap();
        let forward = engine.run_resamples(&[0, 1, 2], &g, &map, &y, None, None).unwrap();
        let reverse = engine.run_resamples(&[2, 0, 1], &g, &map, &y, None, None).unwrap();
        assert_eq!(forward.counts, reverse.counts);
        assert_eq!(forward.frequencies, reverse.frequencies);
        assert_eq!(forward.completed, 3);
        assert!(forward.frequencies.iter().all(|&f| (0.0..=1.0).contains(&f)));
        assert!(forward.frequencies[5] > 0.5);

        let full = engine.run(&g, &map, &y, None, None).unwrap();
        assert_eq!(full.counts, forward.counts);
    }
}

mod io {
    use super::*;
    use panicle_core::report::write_results;
    use panicle_geno::phenotype::parse_phenotype_file;
    use panicle_geno::{match_individuals, read_dataset};

    #[test]
    fn test_files_to_results_table() {
        let dir = tempfile::tempdir().unwrap();
        let geno = dir.path().join("geno.txt");
        let map = dir.path().join("map.txt");
        let pheno = dir.path().join("pheno.txt");
        std::fs::write(
            &geno,
            "a b c d e f g h\n0 1 2 0 1 2 0 2\n1 1 1 1 1 1 1 1\n2 0 1 NA 0 2 1 0\n",
        )
        .unwrap();
        std::fs::write(&map, "SNP CHROM POS\ns1 1 100\ns2 1 200\ns3 2 50\n").unwrap();
        std::fs::write(
            &pheno,
            "Taxa\tY\nh\t1.8\ng\t0.2\nf\t2.1\ne\t0.9\nd\t-0.1\nc\t2.2\nb\t1.1\na\t0.1\nz\t5.0\n",
        )
        .unwrap();

        let dataset = read_dataset(&geno, &map).unwrap();
        let pheno = parse_phenotype_file(&pheno, "Y", &[], "Taxa").unwrap();
        let matched = match_individuals(&dataset.individual_ids, &dataset.genotypes, &pheno).unwrap();
        assert_eq!(matched.ids.len(), 8);

        let scan = GlmScanner::default()
            .scan(&matched.genotypes, &matched.phenotype, None)
            .unwrap();
        let mut out = Vec::new();
        write_results(&mut out, &dataset.map, &scan.results).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("s1 1 100"));
        assert!(lines[2].ends_with("NA NA NA NA"));
        assert!(scan.results[0].pvalue < 1e-4);
        assert!(!scan.results[2].is_missing());
        assert!(!scan.results[0].is_missing());
    }
}
