//! Row matching boundary.
//!
//! The orchestrator only depends on the [`Matcher`] trait; the matching
//! algorithm itself is a collaborator. [`HashJoinMatcher`] is the shipped
//! implementation: a key-indexed join with per-column equality and optional
//! percentage tolerance for numeric columns.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::normalize::RowSet;

/// What the matcher is asked to compare.
#[derive(Debug, Clone, Default)]
pub struct MatchSpec {
    /// Columns whose values participate in comparison (key and ignored
    /// columns already excluded).
    pub compare_columns: Vec<String>,

    /// Per-column numeric tolerance percentages.
    pub thresholds: HashMap<String, f64>,
}

/// One differing column within a matched row pair.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnMismatch {
    pub column: String,
    pub source_value: Option<String>,
    pub target_value: Option<String>,
}

/// All differing columns for one join-key value.
#[derive(Debug, Clone, Serialize)]
pub struct RowMismatch {
    pub key: String,
    pub columns: Vec<ColumnMismatch>,
}

/// Outcome of matching two row sets.
#[derive(Debug, Default)]
pub struct MatchReport {
    /// Rows present on both sides with all compared values equal.
    pub matched_count: usize,

    /// Rows present on both sides with at least one differing value.
    pub mismatched_count: usize,

    /// Per-row mismatch detail, in source row order.
    pub mismatches: Vec<RowMismatch>,

    /// Mismatch tallies per column name.
    pub mismatch_count_by_column: HashMap<String, usize>,

    /// Rows whose key exists only in the source.
    pub source_only: RowSet,

    /// Rows whose key exists only in the target.
    pub target_only: RowSet,
}

/// Computes the difference between two canonical row sets.
pub trait Matcher: Send + Sync {
    /// Match `source` against `target` on `key_column`.
    ///
    /// Both row sets must carry `key_column`; `spec` limits which columns
    /// are compared and supplies numeric tolerances.
    fn match_rows(
        &self,
        source: &RowSet,
        target: &RowSet,
        key_column: &str,
        spec: &MatchSpec,
    ) -> Result<MatchReport>;
}

/// Key-indexed join matcher.
///
/// Values compare as text; when both sides parse as numbers and the column
/// has a tolerance, a relative percentage difference within the tolerance
/// counts as equal. Missing values and empty strings compare as equal so
/// database NULLs meet empty delimited cells cleanly.
pub struct HashJoinMatcher;

impl Matcher for HashJoinMatcher {
    fn match_rows(
        &self,
        source: &RowSet,
        target: &RowSet,
        key_column: &str,
        spec: &MatchSpec,
    ) -> Result<MatchReport> {
        let mut report = MatchReport::default();

        // Index target rows by key; on duplicate keys the last row wins.
        let mut target_index: HashMap<String, usize> = HashMap::new();
        if let Some(key_idx) = target.column_index(key_column) {
            for (row_idx, row) in target.rows().iter().enumerate() {
                let key = row[key_idx].clone().unwrap_or_default();
                if target_index.insert(key, row_idx).is_some() {
                    debug!("Duplicate key in target row {}", row_idx);
                }
            }
        }

        let mut consumed_targets: HashSet<usize> = HashSet::new();
        report.source_only = RowSet::new(source.columns().to_vec());
        report.target_only = RowSet::new(target.columns().to_vec());

        for (row_idx, row) in source.rows().iter().enumerate() {
            let key = source
                .value(row_idx, key_column)
                .unwrap_or_default()
                .to_string();

            let Some(&target_row) = target_index.get(&key) else {
                report.source_only.push_row(row.clone());
                continue;
            };
            consumed_targets.insert(target_row);

            let mut columns = Vec::new();
            for column in &spec.compare_columns {
                let source_value = source.value(row_idx, column);
                let target_value = target.value(target_row, column);
                let tolerance = spec.thresholds.get(column).copied();
                if !values_equal(source_value, target_value, tolerance) {
                    columns.push(ColumnMismatch {
                        column: column.clone(),
                        source_value: source_value.map(str::to_string),
                        target_value: target_value.map(str::to_string),
                    });
                }
            }

            if columns.is_empty() {
                report.matched_count += 1;
            } else {
                report.mismatched_count += 1;
                for mismatch in &columns {
                    *report
                        .mismatch_count_by_column
                        .entry(mismatch.column.clone())
                        .or_insert(0) += 1;
                }
                report.mismatches.push(RowMismatch { key, columns });
            }
        }

        for (row_idx, row) in target.rows().iter().enumerate() {
            if !consumed_targets.contains(&row_idx) {
                report.target_only.push_row(row.clone());
            }
        }

        Ok(report)
    }
}

/// Compare two optional values, with an optional percentage tolerance for
/// numeric pairs. `None` and the empty string are treated as equal.
fn values_equal(source: Option<&str>, target: Option<&str>, tolerance: Option<f64>) -> bool {
    let s = source.unwrap_or("");
    let t = target.unwrap_or("");
    if s == t {
        return true;
    }

    if let Some(pct) = tolerance {
        if let (Ok(sv), Ok(tv)) = (s.parse::<f64>(), t.parse::<f64>()) {
            let magnitude = sv.abs().max(tv.abs());
            if magnitude == 0.0 {
                return true;
            }
            return (sv - tv).abs() / magnitude * 100.0 <= pct;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_set(columns: &[&str], rows: &[&[&str]]) -> RowSet {
        let mut set = RowSet::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            set.push_row(row.iter().map(|v| Some(v.to_string())).collect());
        }
        set
    }

    fn spec(columns: &[&str]) -> MatchSpec {
        MatchSpec {
            compare_columns: columns.iter().map(|c| c.to_string()).collect(),
            thresholds: HashMap::new(),
        }
    }

    #[test]
    fn test_one_match_one_mismatch() {
        let source = row_set(&["id", "amt"], &[&["1", "100"], &["2", "200"]]);
        let target = row_set(&["id", "amt"], &[&["1", "100"], &["2", "205"]]);

        let report = HashJoinMatcher
            .match_rows(&source, &target, "id", &spec(&["amt"]))
            .unwrap();

        assert_eq!(report.matched_count, 1);
        assert_eq!(report.mismatched_count, 1);
        assert_eq!(report.source_only.len(), 0);
        assert_eq!(report.target_only.len(), 0);
        assert_eq!(report.mismatches[0].key, "2");
        assert_eq!(report.mismatches[0].columns[0].column, "amt");
        assert_eq!(report.mismatch_count_by_column.get("amt"), Some(&1));
    }

    #[test]
    fn test_unmatched_rows_split_by_side() {
        let source = row_set(&["id", "amt"], &[&["1", "100"], &["3", "300"]]);
        let target = row_set(&["id", "amt"], &[&["1", "100"], &["4", "400"]]);

        let report = HashJoinMatcher
            .match_rows(&source, &target, "id", &spec(&["amt"]))
            .unwrap();

        assert_eq!(report.matched_count, 1);
        assert_eq!(report.source_only.len(), 1);
        assert_eq!(report.source_only.value(0, "id"), Some("3"));
        assert_eq!(report.target_only.len(), 1);
        assert_eq!(report.target_only.value(0, "id"), Some("4"));
    }

    #[test]
    fn test_threshold_tolerates_small_numeric_drift() {
        let source = row_set(&["id", "amt"], &[&["1", "100"]]);
        let target = row_set(&["id", "amt"], &[&["1", "104"]]);

        let mut with_tolerance = spec(&["amt"]);
        with_tolerance.thresholds.insert("amt".to_string(), 5.0);
        let report = HashJoinMatcher
            .match_rows(&source, &target, "id", &with_tolerance)
            .unwrap();
        assert_eq!(report.matched_count, 1);

        let report = HashJoinMatcher
            .match_rows(&source, &target, "id", &spec(&["amt"]))
            .unwrap();
        assert_eq!(report.mismatched_count, 1);
    }

    #[test]
    fn test_threshold_does_not_rescue_text_columns() {
        let source = row_set(&["id", "name"], &[&["1", "Alice"]]);
        let target = row_set(&["id", "name"], &[&["1", "Bob"]]);

        let mut with_tolerance = spec(&["name"]);
        with_tolerance.thresholds.insert("name".to_string(), 50.0);
        let report = HashJoinMatcher
            .match_rows(&source, &target, "id", &with_tolerance)
            .unwrap();
        assert_eq!(report.mismatched_count, 1);
    }

    #[test]
    fn test_columns_outside_spec_are_not_compared() {
        let source = row_set(&["id", "amt", "ts"], &[&["1", "10", "2024"]]);
        let target = row_set(&["id", "amt", "ts"], &[&["1", "10", "2025"]]);

        let report = HashJoinMatcher
            .match_rows(&source, &target, "id", &spec(&["amt"]))
            .unwrap();
        assert_eq!(report.matched_count, 1);
        assert_eq!(report.mismatched_count, 0);
    }

    #[test]
    fn test_null_and_empty_compare_equal() {
        let mut source = RowSet::new(vec!["id".to_string(), "note".to_string()]);
        source.push_row(vec![Some("1".to_string()), None]);
        let target = row_set(&["id", "note"], &[&["1", ""]]);

        let report = HashJoinMatcher
            .match_rows(&source, &target, "id", &spec(&["note"]))
            .unwrap();
        assert_eq!(report.matched_count, 1);
    }
}
