//! panicle: genome-wide association analysis from the command line.
//!
//! CLI entry point using clap for argument parsing.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "panicle",
    version,
    about = "PANICLE: kinship, PCA and GWAS with GLM, MLM, FarmCPU and BLINK",
    long_about = "Genome-wide association analysis for numeric genotype data.\n\
                   Builds kinship and principal components and runs single-locus\n\
                   (GLM, MLM) or multi-locus (FarmCPU, BLINK) marker scans."
)]
struct Cli {
    /// Number of threads to use
    #[arg(long, default_value = "1", global = true)]
    threads: usize,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON file with engine configuration; command-line flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a kinship matrix and save it as a binary cache
    Kinship(commands::kinship::KinshipArgs),

    /// Compute principal components
    Pca(commands::pca::PcaArgs),

    /// Run a genome-wide association scan
    Gwas(commands::gwas::GwasArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .ok();

    tracing::info!("PANICLE v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using {} threads", cli.threads);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Kinship(args) => commands::kinship::run(args, config),
        Commands::Pca(args) => commands::pca::run(args, config),
        Commands::Gwas(args) => commands::gwas::run(args, config),
    }
}
