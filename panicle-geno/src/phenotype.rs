//! TSV phenotype and covariate file parser.
//!
//! Reads tab/space-delimited files with individual IDs and phenotype/covariate columns.
//! `NA`, `.`, `-` and empty fields are read as missing (NaN).

use std::path::Path;

use anyhow::{bail, Context, Result};

/// Parsed phenotype data for all individuals.
#[derive(Debug, Clone)]
pub struct PhenotypeData {
    /// Individual IDs in file order.
    pub sample_ids: Vec<String>,
    /// Phenotype values (NaN for missing).
    pub phenotype: Vec<f64>,
    /// Covariate matrix: covariates[i][j] = individual i, covariate j.
    pub covariates: Vec<Vec<f64>>,
    /// Covariate column names.
    pub covariate_names: Vec<String>,
}

/// Parse a phenotype/covariate file.
///
/// # Arguments
/// - `path`: Path to the TSV file
/// - `pheno_col`: Name of the phenotype column
/// - `covar_cols`: Names of covariate columns (may be empty)
/// - `sample_id_col`: Name of the individual ID column (e.g. "Taxa")
pub fn parse_phenotype_file(
    path: &Path,
    pheno_col: &str,
    covar_cols: &[String],
    sample_id_col: &str,
) -> Result<PhenotypeData> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read phenotype file: {}", path.display()))?;

    let mut lines = contents.lines();
    let header_line = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty phenotype file"))?;

    let headers: Vec<&str> = split_fields(header_line);

    let id_idx = headers
        .iter()
        .position(|&h| h == sample_id_col)
        .ok_or_else(|| {
            anyhow::anyhow!("ID column '{}' not found in header", sample_id_col)
        })?;

    let pheno_idx = headers
        .iter()
        .position(|&h| h == pheno_col)
        .ok_or_else(|| anyhow::anyhow!("Phenotype column '{}' not found in header", pheno_col))?;

    let covar_indices: Vec<usize> = covar_cols
        .iter()
        .map(|name| {
            headers
                .iter()
                .position(|&h| h == name.as_str())
                .ok_or_else(|| anyhow::anyhow!("Covariate column '{}' not found in header", name))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut sample_ids = Vec::new();
    let mut phenotype = Vec::new();
    let mut covariates = Vec::new();

    for (line_num, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = split_fields(line);
        if fields.len() <= id_idx.max(pheno_idx) {
            bail!(
                "Line {} has too few fields (expected at least {})",
                line_num + 2,
                id_idx.max(pheno_idx) + 1
            );
        }

        sample_ids.push(fields[id_idx].to_string());
        phenotype.push(parse_value(fields[pheno_idx]));

        let row_covars = covar_indices
            .iter()
            .map(|&ci| fields.get(ci).map(|f| parse_value(f)).unwrap_or(f64::NAN))
            .collect();
        covariates.push(row_covars);
    }

    Ok(PhenotypeData {
        sample_ids,
        phenotype,
        covariates,
        covariate_names: covar_cols.to_vec(),
    })
}

/// Split on tabs when present, otherwise on runs of whitespace.
pub(crate) fn split_fields(line: &str) -> Vec<&str> {
    if line.contains('\t') {
        line.split('\t').map(|s| s.trim()).collect()
    } else {
        line.split_whitespace().collect()
    }
}

/// Parse a string value to f64, treating NA/missing as NaN.
pub(crate) fn parse_value(s: &str) -> f64 {
    match s {
        "NA" | "na" | "Na" | "." | "" | "-" | "NaN" | "nan" => f64::NAN,
        _ => s.parse().unwrap_or(f64::NAN),
    }
}

/// Filter individuals to those with non-missing phenotype and covariates.
/// Returns indices of valid individuals.
pub fn valid_sample_indices(pheno_data: &PhenotypeData) -> Vec<usize> {
    (0..pheno_data.sample_ids.len())
        .filter(|&i| {
            !pheno_data.phenotype[i].is_nan()
                && pheno_data.covariates[i].iter().all(|v| !v.is_nan())
        })
        .collect()
}
