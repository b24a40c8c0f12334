//! In-memory genotype and marker containers.
//!
//! Dosages are stored as `i8` (0, 1, 2 copies of the counted allele)
//! in marker-major order so a marker column is a contiguous slice.
//! Missing calls carry the `MISSING_GENOTYPE` sentinel, which can never
//! collide with a valid dosage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel for a missing genotype call.
pub const MISSING_GENOTYPE: i8 = -9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenotypeError {
    #[error("marker {marker} has {got} calls, expected {expected}")]
    RaggedColumn {
        marker: usize,
        expected: usize,
        got: usize,
    },

    #[error("invalid dosage {value} at individual {individual}, marker {marker}")]
    InvalidDosage {
        individual: usize,
        marker: usize,
        value: i8,
    },

    #[error("individual index {index} out of range for {n} individuals")]
    IndexOutOfRange { index: usize, n: usize },
}

/// Information about a genetic marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerInfo {
    /// Marker ID (e.g. rsID).
    pub id: String,
    /// Chromosome (e.g. "1", "22", "X").
    pub chrom: String,
    /// Position in base pairs.
    pub pos: u64,
}

/// Ordered marker metadata; entry j describes genotype column j.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerMap {
    markers: Vec<MarkerInfo>,
}

impl MarkerMap {
    pub fn new(markers: Vec<MarkerInfo>) -> Self {
        Self { markers }
    }

    /// Synthetic map: every marker on chromosome "1", spaced `spacing` bp apart.
    pub fn uniform(n_markers: usize, spacing: u64) -> Self {
        let markers = (0..n_markers)
            .map(|j| MarkerInfo {
                id: format!("m{}", j + 1),
                chrom: "1".to_string(),
                pos: (j as u64 + 1) * spacing,
            })
            .collect();
        Self { markers }
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn get(&self, index: usize) -> &MarkerInfo {
        &self.markers[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarkerInfo> {
        self.markers.iter()
    }
}

/// Individuals x markers dosage matrix, immutable after construction.
#[derive(Debug, Clone)]
pub struct GenotypeMatrix {
    n_individuals: usize,
    n_markers: usize,
    /// Marker-major: column j occupies `data[j * n_individuals..(j + 1) * n_individuals]`.
    data: Vec<i8>,
}

impl GenotypeMatrix {
    /// Build from marker columns, validating shape and alphabet.
    pub fn from_columns(
        n_individuals: usize,
        columns: Vec<Vec<i8>>,
    ) -> Result<Self, GenotypeError> {
        let n_markers = columns.len();
        let mut data = Vec::with_capacity(n_individuals * n_markers);
        for (j, col) in columns.into_iter().enumerate() {
            if col.len() != n_individuals {
                return Err(GenotypeError::RaggedColumn {
                    marker: j,
                    expected: n_individuals,
                    got: col.len(),
                });
            }
            data.extend_from_slice(&col);
        }
        Self::from_marker_major(n_individuals, n_markers, data)
    }

    /// Build from individual rows (row i = all markers for individual i).
    pub fn from_rows(rows: &[Vec<i8>]) -> Result<Self, GenotypeError> {
        let n = rows.len();
        let m = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = vec![0i8; n * m];
        for (i, row) in rows.iter().enumerate() {
            if row.len() != m {
                return Err(GenotypeError::RaggedColumn {
                    marker: i,
                    expected: m,
                    got: row.len(),
                });
            }
            for (j, &g) in row.iter().enumerate() {
                data[j * n + i] = g;
            }
        }
        Self::from_marker_major(n, m, data)
    }

    /// Build from a flat marker-major buffer.
    pub fn from_marker_major(
        n_individuals: usize,
        n_markers: usize,
        data: Vec<i8>,
    ) -> Result<Self, GenotypeError> {
        if data.len() != n_individuals * n_markers {
            return Err(GenotypeError::RaggedColumn {
                marker: 0,
                expected: n_individuals * n_markers,
                got: data.len(),
            });
        }
        for (k, &g) in data.iter().enumerate() {
            if !(0..=2).contains(&g) && g != MISSING_GENOTYPE {
                return Err(GenotypeError::InvalidDosage {
                    individual: k % n_individuals.max(1),
                    marker: k / n_individuals.max(1),
                    value: g,
                });
            }
        }
        Ok(Self {
            n_individuals,
            n_markers,
            data,
        })
    }

    pub fn n_individuals(&self) -> usize {
        self.n_individuals
    }

    pub fn n_markers(&self) -> usize {
        self.n_markers
    }

    /// Raw calls for one marker, one entry per individual.
    pub fn column(&self, marker: usize) -> &[i8] {
        let n = self.n_individuals;
        &self.data[marker * n..(marker + 1) * n]
    }

    /// Iterate over marker columns in order.
    pub fn columns(&self) -> impl Iterator<Item = &[i8]> + '_ {
        (0..self.n_markers).map(move |j| self.column(j))
    }

    /// Allele frequency, minor allele count and number of non-missing calls.
    pub fn marker_stats(&self, marker: usize) -> MarkerStats {
        MarkerStats::from_calls(self.column(marker))
    }

    /// Dosages as f64 with missing calls replaced by the marker mean (2p).
    pub fn dosages_imputed(&self, marker: usize) -> Vec<f64> {
        let col = self.column(marker);
        let mean = 2.0 * MarkerStats::from_calls(col).af;
        col.iter()
            .map(|&g| if g == MISSING_GENOTYPE { mean } else { g as f64 })
            .collect()
    }

    /// Keep only the given individuals, in the given order.
    pub fn subset_individuals(&self, indices: &[usize]) -> Result<Self, GenotypeError> {
        for &i in indices {
            if i >= self.n_individuals {
                return Err(GenotypeError::IndexOutOfRange {
                    index: i,
                    n: self.n_individuals,
                });
            }
        }
        let mut data = Vec::with_capacity(indices.len() * self.n_markers);
        for j in 0..self.n_markers {
            let col = self.column(j);
            data.extend(indices.iter().map(|&i| col[i]));
        }
        Ok(Self {
            n_individuals: indices.len(),
            n_markers: self.n_markers,
            data,
        })
    }
}

/// Summary statistics of one marker's calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerStats {
    /// Frequency of the counted allele among non-missing calls.
    pub af: f64,
    /// Minor allele count.
    pub mac: f64,
    /// Number of non-missing calls.
    pub n_valid: usize,
}

impl MarkerStats {
    pub fn from_calls(calls: &[i8]) -> Self {
        let mut sum = 0.0;
        let mut n = 0usize;
        for &g in calls {
            if g != MISSING_GENOTYPE {
                sum += g as f64;
                n += 1;
            }
        }
        let af = if n > 0 { sum / (2.0 * n as f64) } else { 0.0 };
        let mac = sum.min(2.0 * n as f64 - sum);
        MarkerStats { af, mac, n_valid: n }
    }

    /// Monomorphic markers carry no information about association.
    pub fn is_monomorphic(&self) -> bool {
        self.af <= 0.0 || self.af >= 1.0
    }
}
