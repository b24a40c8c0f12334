//! Genome-wide association scan.
//!
//! panicle gwas --geno-file ... --map-file ... --pheno-file ... --pheno-col ... \
//!     --method glm|mlm|farmcpu|blink|farmcpu-resampling --output-file ...

use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, Result};
use clap::Args;
use tracing::info;

use panicle_core::report::{write_results, write_selection_frequencies};
use panicle_core::{
    Blink, FarmCpu, FarmCpuResampling, GlmScanner, GwasConfig, IterativeResult, KinshipEngine,
    KinshipMatrix, MlmScanner, PcaEngine, VarianceComponentSolver,
};
use panicle_geno::phenotype::parse_phenotype_file;
use panicle_geno::{match_individuals, MatchedData};
use panicle_linalg::DenseMatrix;

#[derive(Args)]
pub struct GwasArgs {
    /// Numeric genotype file
    #[arg(long)]
    geno_file: String,

    /// Marker map file
    #[arg(long)]
    map_file: String,

    /// Phenotype file path
    #[arg(long)]
    pheno_file: String,

    /// Phenotype column name
    #[arg(long)]
    pheno_col: String,

    /// Covariate column names (comma-separated)
    #[arg(long, default_value = "")]
    covar_cols: String,

    /// Individual ID column name
    #[arg(long, default_value = "Taxa")]
    sample_id_col: String,

    /// Method: glm, mlm, farmcpu, blink or farmcpu-resampling
    #[arg(long, default_value = "glm")]
    method: String,

    /// Number of principal components added as covariates
    #[arg(long, default_value = "0")]
    npc: usize,

    /// Kinship cache from `panicle kinship`; also switches FarmCPU/BLINK to MLM re-scans
    #[arg(long)]
    kinship_cache: Option<String>,

    /// Output file path
    #[arg(long)]
    output_file: String,

    /// FarmCPU bin size in base pairs
    #[arg(long)]
    bin_size: Option<u64>,

    /// Iteration cap for FarmCPU and BLINK
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Number of resamples (farmcpu-resampling)
    #[arg(long)]
    n_resamples: Option<usize>,

    /// Share of individuals per resample (farmcpu-resampling)
    #[arg(long)]
    sample_fraction: Option<f64>,

    /// Random seed (farmcpu-resampling)
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Glm,
    Mlm,
    FarmCpu,
    Blink,
    FarmCpuResampling,
}

fn parse_method(name: &str) -> Result<Method> {
    Ok(match name.to_lowercase().as_str() {
        "glm" => Method::Glm,
        "mlm" => Method::Mlm,
        "farmcpu" => Method::FarmCpu,
        "blink" => Method::Blink,
        "farmcpu-resampling" | "resampling" => Method::FarmCpuResampling,
        _ => bail!("Unknown method: {}", name),
    })
}

fn apply_overrides(args: &GwasArgs, config: &mut GwasConfig) {
    if let Some(b) = args.bin_size {
        config.farmcpu.bin_size = b;
    }
    if let Some(it) = args.max_iterations {
        config.farmcpu.max_iterations = it;
        config.blink.max_iterations = it;
    }
    if let Some(r) = args.n_resamples {
        config.resampling.n_resamples = r;
    }
    if let Some(f) = args.sample_fraction {
        config.resampling.sample_fraction = f;
    }
    if let Some(s) = args.seed {
        config.resampling.seed = s;
    }
}

/// User covariates followed by `npc` principal components.
fn covariate_matrix(
    matched: &MatchedData,
    npc: usize,
    kinship: Option<&KinshipMatrix>,
    config: &GwasConfig,
) -> Result<Option<DenseMatrix>> {
    let n = matched.ids.len();
    let mut columns = matched.covariates.clone();
    if npc > 0 {
        let mut pca_config = config.pca.clone();
        pca_config.n_components = npc;
        let engine = PcaEngine::new(pca_config)?;
        let pca = match kinship {
            Some(k) => engine.compute_from_kinship(k)?,
            None => engine.compute(&matched.genotypes)?,
        };
        columns.extend((0..npc).map(|c| pca.components.col(c)));
        info!("Added {} principal component(s) as covariates", npc);
    }
    if columns.is_empty() {
        return Ok(None);
    }
    Ok(Some(DenseMatrix::from_columns(n, &columns)))
}

fn report_iterative(name: &str, result: &IterativeResult) {
    info!(
        "{}: {} iteration(s), converged = {}, {} pseudo-QTN(s)",
        name,
        result.iterations,
        result.converged,
        result.qtns.len()
    );
    super::log_warnings(&result.warnings);
}

pub fn run(args: GwasArgs, mut config: GwasConfig) -> Result<()> {
    let method = parse_method(&args.method)?;
    apply_overrides(&args, &mut config);
    config.validate()?;

    info!("=== PANICLE: GWAS ({:?}) ===", method);
    info!("Phenotype file: {}", args.pheno_file);
    info!("Phenotype column: {}", args.pheno_col);

    let dataset = super::load_genotypes(&args.geno_file, &args.map_file)?;
    let covar_cols: Vec<String> = if args.covar_cols.is_empty() {
        Vec::new()
    } else {
        args.covar_cols.split(',').map(|s| s.trim().to_string()).collect()
    };
    let pheno = parse_phenotype_file(
        Path::new(&args.pheno_file),
        &args.pheno_col,
        &covar_cols,
        &args.sample_id_col,
    )?;
    let matched = match_individuals(&dataset.individual_ids, &dataset.genotypes, &pheno)?;

    let kinship = match args.kinship_cache {
        Some(ref path) => Some(super::load_aligned_kinship(path, &matched.ids)?),
        None if method == Method::Mlm => {
            Some(KinshipEngine::new(config.kinship.clone())?.build(&matched.genotypes)?)
        }
        None => None,
    };
    let covariates = covariate_matrix(&matched, args.npc, kinship.as_ref(), &config)?;
    let g = &matched.genotypes;
    let y = &matched.phenotype;
    let cov = covariates.as_ref();

    let mut writer = BufWriter::new(std::fs::File::create(&args.output_file)?);
    match method {
        Method::Glm => {
            let scan = GlmScanner::new(config.scan.clone())?.scan(g, y, cov)?;
            super::log_warnings(&scan.warnings);
            write_results(&mut writer, &dataset.map, &scan.results)?;
        }
        Method::Mlm => {
            let Some(ref kin) = kinship else {
                bail!("MLM needs a kinship matrix");
            };
            let vc = VarianceComponentSolver::new(config.reml.clone())?.fit(y, kin, cov)?;
            info!(
                "REML: delta = {:.4e}, h2 = {:.4}, sigma_g2 = {:.4e}",
                vc.delta, vc.heritability, vc.sigma_g2
            );
            let scan = MlmScanner::new(config.scan.clone())?.scan(g, y, cov, &vc)?;
            super::log_warnings(&scan.warnings);
            write_results(&mut writer, &dataset.map, &scan.results)?;
        }
        Method::FarmCpu => {
            let result = match kinship {
                Some(ref kin) => FarmCpu::with_kinship(
                    config.farmcpu.clone(),
                    config.scan.clone(),
                    config.reml.clone(),
                    kin,
                )?
                .run(g, &dataset.map, y, cov, None)?,
                None => FarmCpu::new(config.farmcpu.clone(), config.scan.clone())?
                    .run(g, &dataset.map, y, cov, None)?,
            };
            report_iterative("FarmCPU", &result);
            write_results(&mut writer, &dataset.map, &result.results)?;
        }
        Method::Blink => {
            let result = match kinship {
                Some(ref kin) => Blink::with_kinship(
                    config.blink.clone(),
                    config.scan.clone(),
                    config.reml.clone(),
                    kin,
                )?
                .run(g, &dataset.map, y, cov, None)?,
                None => Blink::new(config.blink.clone(), config.scan.clone())?
                    .run(g, &dataset.map, y, cov, None)?,
            };
            report_iterative("BLINK", &result);
            write_results(&mut writer, &dataset.map, &result.results)?;
        }
        Method::FarmCpuResampling => {
            let engine = match kinship {
                Some(kin) => FarmCpuResampling::with_kinship(
                    config.resampling.clone(),
                    config.farmcpu.clone(),
                    config.scan.clone(),
                    config.reml.clone(),
                    kin,
                )?,
                None => FarmCpuResampling::new(
                    config.resampling.clone(),
                    config.farmcpu.clone(),
                    config.scan.clone(),
                )?,
            };
            let result = engine.run(g, &dataset.map, y, cov, None)?;
            info!(
                "Resampling: {} of {} resample(s) completed",
                result.completed, result.requested
            );
            super::log_warnings(&result.warnings);
            write_selection_frequencies(&mut writer, &dataset.map, &result)?;
        }
    }

    info!("Results written to {}", args.output_file);
    Ok(())
}
