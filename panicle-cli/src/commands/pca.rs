//! Principal components.
//!
//! panicle pca --geno-file ... --map-file ... --output-file ... [--npc 3] [--kinship-cache ...]

use std::io::{BufWriter, Write};

use anyhow::Result;
use clap::Args;
use tracing::info;

use panicle_core::{GwasConfig, PcaEngine, PcaResult};

#[derive(Args)]
pub struct PcaArgs {
    /// Numeric genotype file
    #[arg(long)]
    geno_file: String,

    /// Marker map file
    #[arg(long)]
    map_file: String,

    /// Output file (ID followed by one column per component)
    #[arg(long)]
    output_file: String,

    /// Number of components
    #[arg(long)]
    npc: Option<usize>,

    /// Compute components from this kinship cache instead of the genotypes
    #[arg(long)]
    kinship_cache: Option<String>,
}

pub fn write_components(writer: &mut impl Write, ids: &[String], pca: &PcaResult) -> Result<()> {
    let k = pca.components.ncols();
    let header: Vec<String> = (1..=k).map(|c| format!("PC{}", c)).collect();
    writeln!(writer, "ID {}", header.join(" "))?;
    for (i, id) in ids.iter().enumerate() {
        let row: Vec<String> = (0..k)
            .map(|c| format!("{:.6}", pca.components.get(i, c)))
            .collect();
        writeln!(writer, "{} {}", id, row.join(" "))?;
    }
    Ok(())
}

pub fn run(args: PcaArgs, mut config: GwasConfig) -> Result<()> {
    info!("=== PANICLE: PCA ===");
    if let Some(k) = args.npc {
        config.pca.n_components = k;
    }
    let dataset = super::load_genotypes(&args.geno_file, &args.map_file)?;
    let engine = PcaEngine::new(config.pca.clone())?;

    let pca = match args.kinship_cache {
        Some(ref path) => {
            let kinship = super::load_aligned_kinship(path, &dataset.individual_ids)?;
            engine.compute_from_kinship(&kinship)?
        }
        None => engine.compute(&dataset.genotypes)?,
    };
    for (c, share) in pca.variance_explained.iter().enumerate() {
        info!("PC{}: {:.2}% of variance", c + 1, 100.0 * share);
    }

    let mut writer = BufWriter::new(std::fs::File::create(&args.output_file)?);
    write_components(&mut writer, &dataset.individual_ids, &pca)?;
    info!("Wrote {}", args.output_file);
    Ok(())
}
