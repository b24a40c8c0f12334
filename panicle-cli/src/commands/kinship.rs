//! Build a kinship matrix.
//!
//! panicle kinship --geno-file ... --map-file ... --output-prefix ... [--method ibs] [--tsv]

use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, Result};
use clap::Args;
use tracing::info;

use panicle_core::kinship::cache::{save_kinship, write_kinship_tsv};
use panicle_core::{GwasConfig, KinshipEngine, KinshipMethod};

#[derive(Args)]
pub struct KinshipArgs {
    /// Numeric genotype file (first row individual IDs, one marker per row)
    #[arg(long)]
    geno_file: String,

    /// Marker map file (SNP CHROM POS)
    #[arg(long)]
    map_file: String,

    /// Output file prefix
    #[arg(long)]
    output_prefix: String,

    /// Kinship estimator: vanraden or ibs
    #[arg(long)]
    method: Option<String>,

    /// Markers per accumulation block
    #[arg(long)]
    block_size: Option<usize>,

    /// Also write the matrix as TSV
    #[arg(long, default_value = "false")]
    tsv: bool,
}

pub fn parse_method(name: &str) -> Result<KinshipMethod> {
    Ok(match name.to_lowercase().as_str() {
        "vanraden" => KinshipMethod::VanRaden,
        "ibs" => KinshipMethod::Ibs,
        _ => bail!("Unknown kinship method: {}", name),
    })
}

pub fn run(args: KinshipArgs, mut config: GwasConfig) -> Result<()> {
    info!("=== PANICLE: Kinship ===");
    if let Some(ref m) = args.method {
        config.kinship.method = parse_method(m)?;
    }
    if let Some(b) = args.block_size {
        config.kinship.block_size = b;
    }

    let dataset = super::load_genotypes(&args.geno_file, &args.map_file)?;
    let kinship = KinshipEngine::new(config.kinship.clone())?
        .build(&dataset.genotypes)?
        .with_ids(dataset.individual_ids.clone())?;
    info!("Kinship diagonal mean: {:.4}", kinship.diag_mean());

    let bin_path = format!("{}.kin.bin", args.output_prefix);
    save_kinship(&kinship, Path::new(&bin_path))?;

    if args.tsv {
        let tsv_path = format!("{}.kin.tsv", args.output_prefix);
        let mut writer = BufWriter::new(std::fs::File::create(&tsv_path)?);
        write_kinship_tsv(&kinship, &mut writer)?;
        info!("Wrote {}", tsv_path);
    }

    info!("Done.");
    Ok(())
}
