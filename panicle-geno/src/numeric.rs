//! Numeric genotype and map file readers.
//!
//! Numeric genotype file: the first line lists individual IDs; every
//! following line is one marker with one dosage per individual
//! (0, 1, 2, or NA/./-9 for missing).
//!
//! Map file: header `SNP CHROM POS`, then one line per marker in the
//! same order as the genotype file.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::genotype::{GenotypeMatrix, MarkerInfo, MarkerMap, MISSING_GENOTYPE};
use crate::phenotype::split_fields;

/// A genotype matrix together with its individual IDs and marker map.
#[derive(Debug, Clone)]
pub struct GenotypeDataset {
    pub individual_ids: Vec<String>,
    pub genotypes: GenotypeMatrix,
    pub map: MarkerMap,
}

/// Read a numeric genotype file.
pub fn read_numeric_genotypes(path: &Path) -> Result<(Vec<String>, GenotypeMatrix)> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read genotype file: {}", path.display()))?;

    let mut lines = contents.lines();
    let header = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty genotype file: {}", path.display()))?;
    let ids: Vec<String> = split_fields(header).iter().map(|s| s.to_string()).collect();
    let n = ids.len();
    if n == 0 {
        bail!("Genotype file header lists no individuals");
    }

    let mut data: Vec<i8> = Vec::new();
    let mut n_markers = 0usize;
    for (line_num, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = split_fields(line);
        if fields.len() != n {
            bail!(
                "Genotype file line {} has {} values, expected {}",
                line_num + 2,
                fields.len(),
                n
            );
        }
        for (i, f) in fields.iter().enumerate() {
            let g = parse_dosage(f).with_context(|| {
                format!(
                    "Invalid dosage '{}' at line {}, individual {}",
                    f,
                    line_num + 2,
                    ids[i]
                )
            })?;
            data.push(g);
        }
        n_markers += 1;
    }

    let genotypes = GenotypeMatrix::from_marker_major(n, n_markers, data)?;
    info!(
        "Read {} markers x {} individuals from {}",
        n_markers,
        n,
        path.display()
    );
    Ok((ids, genotypes))
}

fn parse_dosage(s: &str) -> Result<i8> {
    match s {
        "NA" | "na" | "." | "-" | "-9" => Ok(MISSING_GENOTYPE),
        "0" => Ok(0),
        "1" => Ok(1),
        "2" => Ok(2),
        _ => bail!("expected 0, 1, 2 or NA"),
    }
}

/// Read a `SNP CHROM POS` map file.
pub fn read_map(path: &Path) -> Result<MarkerMap> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read map file: {}", path.display()))?;

    let mut markers = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = split_fields(line);
        if fields.len() < 3 {
            bail!("Map file line {} has fewer than 3 fields", line_num + 1);
        }
        if line_num == 0 && fields[2].parse::<u64>().is_err() {
            // header
            continue;
        }
        let pos = fields[2].parse::<u64>().with_context(|| {
            format!("Invalid position '{}' at map line {}", fields[2], line_num + 1)
        })?;
        markers.push(MarkerInfo {
            id: fields[0].to_string(),
            chrom: fields[1].to_string(),
            pos,
        });
    }
    Ok(MarkerMap::new(markers))
}

/// Read a genotype file and its map, checking that they describe the same markers.
pub fn read_dataset(geno_path: &Path, map_path: &Path) -> Result<GenotypeDataset> {
    let (individual_ids, genotypes) = read_numeric_genotypes(geno_path)?;
    let map = read_map(map_path)?;
    if map.len() != genotypes.n_markers() {
        bail!(
            "Map file lists {} markers but the genotype file has {}",
            map.len(),
            genotypes.n_markers()
        );
    }
    Ok(GenotypeDataset {
        individual_ids,
        genotypes,
        map,
    })
}
