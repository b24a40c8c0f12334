//! Whitespace-separated result tables.

use anyhow::{ensure, Result};
use panicle_geno::MarkerMap;

use crate::assoc::AssociationResult;
use crate::iterative::ResamplingResult;

fn fmt_value(v: f64) -> String {
    if v.is_nan() {
        "NA".to_string()
    } else {
        format!("{}", v)
    }
}

/// Write the association table header.
pub fn write_results_header(writer: &mut impl std::io::Write) -> Result<()> {
    writeln!(writer, "SNP CHR POS EFFECT SE TSTAT P")?;
    Ok(())
}

/// Write one line per marker, in genotype column order.
pub fn write_results(
    writer: &mut impl std::io::Write,
    map: &MarkerMap,
    results: &[AssociationResult],
) -> Result<()> {
    ensure!(
        map.len() == results.len(),
        "marker map has {} entries but there are {} results",
        map.len(),
        results.len()
    );
    write_results_header(writer)?;
    for (marker, r) in map.iter().zip(results) {
        writeln!(
            writer,
            "{} {} {} {} {} {} {}",
            marker.id,
            marker.chrom,
            marker.pos,
            fmt_value(r.effect),
            fmt_value(r.se),
            fmt_value(r.tstat),
            fmt_value(r.pvalue),
        )?;
    }
    Ok(())
}

/// Write per-marker selection counts and frequencies from resampling.
pub fn write_selection_frequencies(
    writer: &mut impl std::io::Write,
    map: &MarkerMap,
    result: &ResamplingResult,
) -> Result<()> {
    ensure!(
        map.len() == result.counts.len(),
        "marker map has {} entries but there are {} counts",
        map.len(),
        result.counts.len()
    );
    writeln!(writer, "SNP CHR POS COUNT FREQ")?;
    for ((marker, count), freq) in map.iter().zip(&result.counts).zip(&result.frequencies) {
        writeln!(
            writer,
            "{} {} {} {} {}",
            marker.id, marker.chrom, marker.pos, count, freq
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_written_as_na() {
        let map = MarkerMap::uniform(2, 100);
        let results = vec![
            AssociationResult {
                effect: 0.5,
                se: 0.25,
                tstat: 2.0,
                pvalue: 0.05,
            },
            AssociationResult::MISSING,
        ];
        let mut out = Vec::new();
        write_results(&mut out, &map, &results).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "SNP CHR POS EFFECT SE TSTAT P");
        assert!(lines[1].ends_with("0.5 0.25 2 0.05"));
        assert!(lines[2].ends_with("NA NA NA NA"));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let map = MarkerMap::uniform(3, 100);
        let mut out = Vec::new();
        assert!(write_results(&mut out, &map, &[AssociationResult::MISSING]).is_err());
    }

    #[test]
    fn test_selection_frequencies() {
        let map = MarkerMap::uniform(2, 100);
        let result = ResamplingResult {
            counts: vec![3, 0],
            frequencies: vec![0.75, 0.0],
            completed: 4,
            requested: 4,
            warnings: Vec::new(),
        };
        let mut out = Vec::new();
        write_selection_frequencies(&mut out, &map, &result).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().nth(1).unwrap().ends_with("3 0.75"));
    }
}
