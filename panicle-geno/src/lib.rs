//! panicle-geno: Genotype containers and loaders for PANICLE
//!
//! Provides the in-memory GenotypeMatrix and MarkerMap, readers for
//! numeric genotype, map and phenotype files, and individual matching.

pub mod genotype;
pub mod numeric;
pub mod phenotype;
pub mod sample;

pub use genotype::{GenotypeError, GenotypeMatrix, MarkerInfo, MarkerMap, MarkerStats, MISSING_GENOTYPE};
pub use numeric::{read_dataset, GenotypeDataset};
pub use phenotype::PhenotypeData;
pub use sample::{match_individuals, MatchedData};
