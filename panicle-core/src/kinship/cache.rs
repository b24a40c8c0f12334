//! Kinship persistence.
//!
//! Binary cache: bincode payload with magic bytes (PNKM) and a format
//! version so stale or foreign files are rejected. TSV export is a
//! square matrix with an optional header row of individual IDs.

use std::io::Write;
use std::path::Path;

use panicle_linalg::DenseMatrix;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::KinshipMatrix;
use crate::error::{GwasError, Result};

const MAGIC: [u8; 4] = *b"PNKM";
const VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct KinshipFile {
    magic: [u8; 4],
    version: u32,
    n: usize,
    ids: Option<Vec<String>>,
    /// Column-major values.
    values: Vec<f64>,
}

/// Save a kinship matrix to a binary cache file.
pub fn save_kinship(kinship: &KinshipMatrix, path: &Path) -> Result<()> {
    let file = KinshipFile {
        magic: MAGIC,
        version: VERSION,
        n: kinship.n(),
        ids: kinship.ids().map(|ids| ids.to_vec()),
        values: kinship.as_dense().to_col_major(),
    };
    let encoded =
        bincode::serialize(&file).map_err(|e| GwasError::Serialization(e.to_string()))?;
    std::fs::write(path, encoded)?;
    info!("Saved {}x{} kinship to {}", kinship.n(), kinship.n(), path.display());
    Ok(())
}

/// Load a kinship matrix from a binary cache file.
pub fn load_kinship(path: &Path) -> Result<KinshipMatrix> {
    let data = std::fs::read(path)?;
    let file: KinshipFile =
        bincode::deserialize(&data).map_err(|e| GwasError::Serialization(e.to_string()))?;

    if file.magic != MAGIC {
        return Err(GwasError::Serialization(format!(
            "invalid kinship cache: expected magic bytes {:?}, got {:?}",
            MAGIC, file.magic
        )));
    }
    if file.version != VERSION {
        return Err(GwasError::Serialization(format!(
            "unsupported kinship cache version {} (expected {})",
            file.version, VERSION
        )));
    }
    if file.values.len() != file.n * file.n {
        return Err(GwasError::Serialization(format!(
            "kinship cache holds {} values for n = {}",
            file.values.len(),
            file.n
        )));
    }

    let kinship =
        KinshipMatrix::from_dense(DenseMatrix::from_col_major(file.n, file.n, file.values))?;
    match file.ids {
        Some(ids) => kinship.with_ids(ids),
        None => Ok(kinship),
    }
}

/// Write the matrix as tab-separated text.
pub fn write_kinship_tsv(kinship: &KinshipMatrix, writer: &mut impl Write) -> Result<()> {
    if let Some(ids) = kinship.ids() {
        writeln!(writer, "{}", ids.join("\t"))?;
    }
    for i in 0..kinship.n() {
        let row: Vec<String> = (0..kinship.n())
            .map(|j| format!("{:.6}", kinship.get(i, j)))
            .collect();
        writeln!(writer, "{}", row.join("\t"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KinshipMatrix {
        let m = DenseMatrix::from_row_major(2, 2, &[1.02, 0.13, 0.13, 0.97]);
        KinshipMatrix::from_dense(m)
            .unwrap()
            .with_ids(vec!["S1".into(), "S2".into()])
            .unwrap()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.bin");
        let k = sample();
        save_kinship(&k, &path).unwrap();
        let loaded = load_kinship(&path).unwrap();
        assert_eq!(loaded.n(), 2);
        assert_eq!(loaded.ids().unwrap(), k.ids().unwrap());
        assert_eq!(loaded.get(0, 1), 0.13);
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::write(&path, b"not a kinship cache at all, just some bytes").unwrap();
        assert!(matches!(load_kinship(&path), Err(GwasError::Serialization(_))));
    }

    #[test]
    fn test_tsv_output() {
        let mut buf = Vec::new();
        write_kinship_tsv(&sample(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "S1\tS2");
        assert_eq!(lines[1], "1.020000\t0.130000");
        assert_eq!(lines.len(), 3);
    }
}
