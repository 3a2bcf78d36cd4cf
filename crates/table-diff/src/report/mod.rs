//! Report artifact generation.
//!
//! The orchestrator hands a finished [`MatchReport`] to a [`ReportWriter`];
//! the shipped [`CsvReportWriter`] produces a directory artifact with four
//! sections mirroring the classic comparison workbook: summary, mismatches,
//! source-only rows, and target-only rows. Writer failures surface as
//! `ReportGeneration`, distinguishable from comparison failures.

use std::path::Path;

use tracing::info;

use crate::error::{CompareError, Result};
use crate::matcher::MatchReport;
use crate::normalize::RowSet;

/// Metadata rendered into the summary section.
#[derive(Debug, Clone)]
pub struct ComparisonMeta {
    pub source_type: String,
    pub target_type: String,
    pub source_location: String,
    pub target_location: String,
    pub source_rows: usize,
    pub target_rows: usize,
    pub key_column: String,
    pub elapsed_ms: u64,
}

/// Writes a comparison report artifact.
pub trait ReportWriter: Send + Sync {
    /// Write the full report to `path`. Implementations own the artifact
    /// layout; `path` may be a file or a directory root.
    fn write(&self, report: &MatchReport, meta: &ComparisonMeta, path: &Path) -> Result<()>;
}

/// Directory-of-CSV report writer.
pub struct CsvReportWriter;

impl ReportWriter for CsvReportWriter {
    fn write(&self, report: &MatchReport, meta: &ComparisonMeta, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| report_error(path, e))?;

        self.write_summary(report, meta, &path.join("summary.csv"))?;
        self.write_mismatches(report, &path.join("mismatches.csv"))?;
        write_rowset(&report.source_only, &path.join("source_only.csv"))?;
        write_rowset(&report.target_only, &path.join("target_only.csv"))?;

        info!("Comparison report written to {}", path.display());
        Ok(())
    }
}

impl CsvReportWriter {
    fn write_summary(
        &self,
        report: &MatchReport,
        meta: &ComparisonMeta,
        path: &Path,
    ) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| report_error(path, e))?;

        let rows: Vec<(&str, String)> = vec![
            ("source_type", meta.source_type.clone()),
            ("target_type", meta.target_type.clone()),
            ("source_location", meta.source_location.clone()),
            ("target_location", meta.target_location.clone()),
            ("key_column", meta.key_column.clone()),
            ("source_rows", meta.source_rows.to_string()),
            ("target_rows", meta.target_rows.to_string()),
            ("matched", report.matched_count.to_string()),
            ("mismatched", report.mismatched_count.to_string()),
            ("source_only", report.source_only.len().to_string()),
            ("target_only", report.target_only.len().to_string()),
            ("elapsed_ms", meta.elapsed_ms.to_string()),
        ];

        writer
            .write_record(["metric", "value"])
            .map_err(|e| report_error(path, e))?;
        for (metric, value) in rows {
            writer
                .write_record([metric, &value])
                .map_err(|e| report_error(path, e))?;
        }
        writer.flush().map_err(|e| report_error(path, e))?;
        Ok(())
    }

    fn write_mismatches(&self, report: &MatchReport, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| report_error(path, e))?;

        writer
            .write_record(["key", "column", "source_value", "target_value"])
            .map_err(|e| report_error(path, e))?;
        for row in &report.mismatches {
            for column in &row.columns {
                writer
                    .write_record([
                        row.key.as_str(),
                        column.column.as_str(),
                        column.source_value.as_deref().unwrap_or(""),
                        column.target_value.as_deref().unwrap_or(""),
                    ])
                    .map_err(|e| report_error(path, e))?;
            }
        }
        writer.flush().map_err(|e| report_error(path, e))?;
        Ok(())
    }
}

/// Write one row set as a standalone CSV file (header plus data rows).
/// Also used by the query export operation.
pub fn write_rowset(rows: &RowSet, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| report_error(path, e))?;

    writer
        .write_record(rows.columns())
        .map_err(|e| report_error(path, e))?;
    for row in rows.rows() {
        let record: Vec<&str> = row.iter().map(|v| v.as_deref().unwrap_or("")).collect();
        writer.write_record(&record).map_err(|e| report_error(path, e))?;
    }
    writer.flush().map_err(|e| report_error(path, e))?;
    Ok(())
}

fn report_error(path: &Path, err: impl std::fmt::Display) -> CompareError {
    CompareError::ReportGeneration(format!("{}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{ColumnMismatch, RowMismatch};

    fn sample_report() -> MatchReport {
        let mut source_only = RowSet::new(vec!["id".to_string(), "amt".to_string()]);
        source_only.push_row(vec![Some("3".to_string()), Some("300".to_string())]);

        MatchReport {
            matched_count: 1,
            mismatched_count: 1,
            mismatches: vec![RowMismatch {
                key: "2".to_string(),
                columns: vec![ColumnMismatch {
                    column: "amt".to_string(),
                    source_value: Some("200".to_string()),
                    target_value: Some("205".to_string()),
                }],
            }],
            mismatch_count_by_column: Default::default(),
            source_only,
            target_only: RowSet::new(vec!["id".to_string(), "amt".to_string()]),
        }
    }

    fn sample_meta() -> ComparisonMeta {
        ComparisonMeta {
            source_type: "Delimited File".to_string(),
            target_type: "Delimited File".to_string(),
            source_location: "a.csv".to_string(),
            target_location: "b.csv".to_string(),
            source_rows: 2,
            target_rows: 2,
            key_column: "id".to_string(),
            elapsed_ms: 12,
        }
    }

    #[test]
    fn test_report_contains_all_four_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report");

        CsvReportWriter
            .write(&sample_report(), &sample_meta(), &path)
            .unwrap();

        for section in ["summary.csv", "mismatches.csv", "source_only.csv", "target_only.csv"] {
            assert!(path.join(section).exists(), "missing section {section}");
        }

        let summary = std::fs::read_to_string(path.join("summary.csv")).unwrap();
        assert!(summary.contains("matched,1"));
        assert!(summary.contains("mismatched,1"));

        let mismatches = std::fs::read_to_string(path.join("mismatches.csv")).unwrap();
        assert!(mismatches.contains("2,amt,200,205"));

        let source_only = std::fs::read_to_string(path.join("source_only.csv")).unwrap();
        assert!(source_only.starts_with("id,amt"));
        assert!(source_only.contains("3,300"));
    }

    #[test]
    fn test_unwritable_path_is_report_generation_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the artifact directory should go.
        let blocker = dir.path().join("report");
        std::fs::write(&blocker, "occupied").unwrap();

        let err = CsvReportWriter
            .write(&sample_report(), &sample_meta(), &blocker)
            .unwrap_err();
        assert!(matches!(err, CompareError::ReportGeneration(_)));
    }

    #[test]
    fn test_write_rowset_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");

        let mut rows = RowSet::new(vec!["id".to_string(), "name".to_string()]);
        rows.push_row(vec![Some("1".to_string()), None]);
        write_rowset(&rows, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "id,name\n1,");
    }
}
