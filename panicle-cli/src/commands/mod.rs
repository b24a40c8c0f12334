pub mod gwas;
pub mod kinship;
pub mod pca;

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use panicle_core::kinship::cache::load_kinship;
use panicle_core::{GwasConfig, KinshipMatrix, Warning};
use panicle_geno::{read_dataset, GenotypeDataset};

/// Defaults, overlaid with the JSON file when one is given.
pub fn load_config(path: Option<&Path>) -> Result<GwasConfig> {
    let config = match path {
        Some(p) => {
            let cfg = GwasConfig::from_json_file(p)
                .with_context(|| format!("Failed to load config file: {}", p.display()))?;
            info!("Loaded configuration from {}", p.display());
            cfg
        }
        None => GwasConfig::default(),
    };
    Ok(config)
}

pub fn load_genotypes(geno_file: &str, map_file: &str) -> Result<GenotypeDataset> {
    let dataset = read_dataset(Path::new(geno_file), Path::new(map_file))?;
    info!(
        "Loaded {} markers x {} individuals",
        dataset.genotypes.n_markers(),
        dataset.genotypes.n_individuals()
    );
    Ok(dataset)
}

/// Load a cached kinship and align it to `ids`.
///
/// A cache with IDs is reordered by ID; one without must already have
/// exactly `ids.len()` rows in the same order.
pub fn load_aligned_kinship(path: &str, ids: &[String]) -> Result<KinshipMatrix> {
    let kinship = load_kinship(Path::new(path))
        .with_context(|| format!("Failed to load kinship cache: {}", path))?;
    info!("Loaded {}x{} kinship from {}", kinship.n(), kinship.n(), path);

    let Some(cached_ids) = kinship.ids() else {
        if kinship.n() != ids.len() {
            bail!(
                "Kinship cache has {} individuals without IDs; {} individuals are being analysed",
                kinship.n(),
                ids.len()
            );
        }
        return Ok(kinship);
    };

    let position: HashMap<&str, usize> = cached_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut indices = Vec::with_capacity(ids.len());
    for id in ids {
        match position.get(id.as_str()) {
            Some(&i) => indices.push(i),
            None => bail!("Individual '{}' is missing from the kinship cache", id),
        }
    }
    Ok(kinship.subset(&indices)?)
}

pub fn log_warnings(warnings: &[Warning]) {
    for w in warnings {
        warn!("{}", w);
    }
}
