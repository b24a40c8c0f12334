//! Individual ID intersection and matching logic.
//!
//! Aligns the genotype matrix with the phenotype/covariate table so that
//! row i of every container refers to the same individual, and drops
//! individuals whose phenotype or covariates are missing.

use std::collections::HashMap;

use anyhow::{bail, Result};
use tracing::info;

use crate::genotype::GenotypeMatrix;
use crate::phenotype::PhenotypeData;

/// Result of intersecting individual IDs from multiple sources.
#[derive(Debug, Clone)]
pub struct SampleIntersection {
    /// IDs in the intersection, in the order they appear in the primary source.
    pub ids: Vec<String>,
    /// Indices into each source for the intersected individuals.
    pub indices: Vec<Vec<usize>>,
}

/// Intersect IDs from multiple sources.
///
/// Returns the intersection in the order they appear in the first (primary) source.
pub fn intersect_samples(sources: &[&[String]]) -> SampleIntersection {
    if sources.is_empty() {
        return SampleIntersection {
            ids: Vec::new(),
            indices: Vec::new(),
        };
    }

    let maps: Vec<HashMap<&str, usize>> = sources
        .iter()
        .map(|ids| {
            ids.iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), i))
                .collect()
        })
        .collect();

    let mut result_ids = Vec::new();
    let mut result_indices: Vec<Vec<usize>> = vec![Vec::new(); sources.len()];

    for (primary_idx, id) in sources[0].iter().enumerate() {
        let in_all = maps[1..].iter().all(|m| m.contains_key(id.as_str()));
        if in_all {
            result_ids.push(id.clone());
            result_indices[0].push(primary_idx);
            for (src, map) in maps[1..].iter().enumerate() {
                result_indices[src + 1].push(map[id.as_str()]);
            }
        }
    }

    SampleIntersection {
        ids: result_ids,
        indices: result_indices,
    }
}

/// Reorder f64 vector according to the given index mapping.
pub fn reorder_f64(data: &[f64], indices: &[usize]) -> Vec<f64> {
    indices.iter().map(|&i| data[i]).collect()
}

/// Genotypes, phenotype and covariates aligned by row.
#[derive(Debug, Clone)]
pub struct MatchedData {
    /// Individual IDs; row i of every field below belongs to `ids[i]`.
    pub ids: Vec<String>,
    pub genotypes: GenotypeMatrix,
    /// Phenotype values, none missing.
    pub phenotype: Vec<f64>,
    /// Covariate columns, each of length `ids.len()`.
    pub covariates: Vec<Vec<f64>>,
    pub covariate_names: Vec<String>,
}

/// Align genotypes with phenotypes by individual ID.
///
/// Individuals present in both sources and with a complete phenotype and
/// covariate record are kept, in genotype order.
pub fn match_individuals(
    genotype_ids: &[String],
    genotypes: &GenotypeMatrix,
    pheno: &PhenotypeData,
) -> Result<MatchedData> {
    if genotype_ids.len() != genotypes.n_individuals() {
        bail!(
            "Genotype ID list has {} entries but the genotype matrix has {} individuals",
            genotype_ids.len(),
            genotypes.n_individuals()
        );
    }

    let valid = crate::phenotype::valid_sample_indices(pheno);
    let valid_ids: Vec<String> = valid.iter().map(|&i| pheno.sample_ids[i].clone()).collect();

    let intersection = intersect_samples(&[genotype_ids, &valid_ids]);
    info!(
        "Matched {} individuals ({} genotyped, {} with complete phenotype)",
        intersection.ids.len(),
        genotype_ids.len(),
        valid_ids.len()
    );
    if intersection.ids.is_empty() {
        bail!("No overlapping individuals between genotype and phenotype data");
    }

    let geno_idx = &intersection.indices[0];
    let pheno_idx: Vec<usize> = intersection.indices[1].iter().map(|&k| valid[k]).collect();

    let genotypes = genotypes.subset_individuals(geno_idx)?;
    let phenotype = reorder_f64(&pheno.phenotype, &pheno_idx);
    let covariates = (0..pheno.covariate_names.len())
        .map(|j| pheno_idx.iter().map(|&i| pheno.covariates[i][j]).collect())
        .collect();

    Ok(MatchedData {
        ids: intersection.ids,
        genotypes,
        phenotype,
        covariates,
        covariate_names: pheno.covariate_names.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_intersect_two_sources() {
        let src1 = ids(&["A", "B", "C", "D"]);
        let src2 = ids(&["C", "A", "E"]);

        let result = intersect_samples(&[&src1, &src2]);
        assert_eq!(result.ids, vec!["A", "C"]);
        assert_eq!(result.indices[0], vec![0, 2]);
        assert_eq!(result.indices[1], vec![1, 0]);
    }

    #[test]
    fn test_empty_intersection() {
        let s1 = ids(&["A", "B"]);
        let s2 = ids(&["C", "D"]);
        let result = intersect_samples(&[&s1, &s2]);
        assert!(result.ids.is_empty());
    }

    #[test]
    fn test_match_individuals_aligns_and_drops_missing() {
        let geno_ids = ids(&["S1", "S2", "S3", "S4"]);
        let genotypes = GenotypeMatrix::from_rows(&[
            vec![0, 1],
            vec![1, 1],
            vec![2, 0],
            vec![0, 2],
        ])
        .unwrap();
        let pheno = PhenotypeData {
            sample_ids: ids(&["S4", "S3", "S1", "S9"]),
            phenotype: vec![4.0, f64::NAN, 1.0, 9.0],
            covariates: vec![vec![40.0], vec![30.0], vec![10.0], vec![90.0]],
            covariate_names: ids(&["age"]),
        };

        let m = match_individuals(&geno_ids, &genotypes, &pheno).unwrap();
        assert_eq!(m.ids, vec!["S1", "S4"]);
        assert_eq!(m.phenotype, vec![1.0, 4.0]);
        assert_eq!(m.covariates, vec![vec![10.0, 40.0]]);
        assert_eq!(m.genotypes.column(0), &[0, 0]);
        assert_eq!(m.genotypes.column(1), &[1, 2]);
    }

    #[test]
    fn test_match_individuals_rejects_misaligned_ids() {
        let genotypes = GenotypeMatrix::from_rows(&[vec![0], vec![1]]).unwrap();
        let pheno = PhenotypeData {
            sample_ids: ids(&["A"]),
            phenotype: vec![1.0],
            covariates: vec![vec![]],
            covariate_names: vec![],
        };
        assert!(match_individuals(&ids(&["A"]), &genotypes, &pheno).is_err());
    }
}
