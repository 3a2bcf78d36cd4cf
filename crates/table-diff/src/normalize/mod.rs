//! Canonical row format and key construction.
//!
//! Every source kind (delimited file, inline records, database query) is
//! reduced to a [`RowSet`]: an ordered column schema plus rows of optional
//! string values. Comparison preparation then builds the effective join key
//! on top of that shape:
//!
//! - multi-column keys are folded into a synthesized `_COMPOSITE_KEY_` column
//! - blank values in a single-column key get a per-row placeholder so blank
//!   rows never merge into one key bucket
//! - ignored columns stay in the row but are removed from the set of columns
//!   the matcher is asked to compare

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{CompareError, Result};

/// Name of the synthesized join-key column for multi-column keys.
pub const COMPOSITE_KEY_COLUMN: &str = "_COMPOSITE_KEY_";

/// Join-key column used when the caller does not name one.
pub const DEFAULT_KEY_COLUMN: &str = "ID";

/// Separator between key parts in a composite key value. Reserved because it
/// cannot appear in data delimited by comma, semicolon or tab.
const COMPOSITE_KEY_SEPARATOR: char = '|';

/// An ordered list of key column names parsed from a comma-separated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    columns: Vec<String>,
}

impl KeySpec {
    /// Parse a comma-separated key column string. Blank entries are dropped.
    pub fn parse(raw: &str) -> Self {
        let columns = raw
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        Self { columns }
    }

    /// Resolve an optional caller-supplied key spec, falling back to
    /// [`DEFAULT_KEY_COLUMN`] when absent or blank.
    pub fn resolve(raw: Option<&str>) -> Self {
        match raw {
            Some(value) if !value.trim().is_empty() => Self::parse(value),
            _ => Self::parse(DEFAULT_KEY_COLUMN),
        }
    }

    /// Key column names in caller order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }

    /// The column name presented to the matcher as the join key:
    /// the single named column, or [`COMPOSITE_KEY_COLUMN`] for
    /// multi-column keys.
    pub fn effective_column(&self) -> &str {
        if self.is_composite() {
            COMPOSITE_KEY_COLUMN
        } else {
            self.columns
                .first()
                .map(String::as_str)
                .unwrap_or(DEFAULT_KEY_COLUMN)
        }
    }
}

/// A schema-homogeneous, ordered table of string values.
///
/// Column order is insertion order and is preserved through normalization,
/// matching and reporting. Every row holds exactly `columns.len()` values;
/// `None` is a database NULL, `Some("")` an empty field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    /// Create an empty row set with the given schema.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating to the schema width.
    pub fn push_row(&mut self, mut values: Vec<Option<String>>) {
        values.resize(self.columns.len(), Some(String::new()));
        self.rows.push(values);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column in the schema.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of a named column in a given row.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// Parse delimited text lines into a row set.
    ///
    /// With `has_header`, the first line supplies the column names
    /// (quote-stripped, trimmed, blanks replaced with `COLUMN_<n>`);
    /// otherwise synthetic `COLUMN_<n>` names are generated from the first
    /// data line's field count. Blank lines are skipped. Splitting is literal
    /// (the delimiter is never treated as a pattern) and quote-aware;
    /// unterminated quotes pass through as literal text.
    pub fn from_delimited(lines: &[String], delimiter: char, has_header: bool) -> Self {
        let mut nonblank = lines.iter().filter(|line| !line.trim().is_empty());

        let (columns, first_data) = match nonblank.next() {
            None => return Self::default(),
            Some(first) => {
                if has_header {
                    (resolve_headers(first, delimiter), None)
                } else {
                    let field_count = split_delimited(first, delimiter).len();
                    (synthetic_headers(field_count), Some(first))
                }
            }
        };

        let mut set = Self::new(columns);
        for line in first_data.into_iter().chain(nonblank) {
            let values = split_delimited(line, delimiter)
                .into_iter()
                .map(|field| Some(clean_field(&field)))
                .collect();
            set.push_row(values);
        }
        set
    }

    /// Build the effective join key and the comparison-relevant column list.
    ///
    /// Key columns are validated against the schema before any row is
    /// touched; the first missing column fails the whole preparation with
    /// the full header list. For composite keys a `_COMPOSITE_KEY_` column
    /// is prepended and populated per row: key parts are joined with `|`,
    /// and a null or empty part in data row `i` contributes `NULL_<i>` so
    /// two blank-keyed rows stay distinct. For single-column keys, a blank
    /// key cell is replaced with `ROW_<i>` so the row participates as an
    /// unmatched singleton.
    ///
    /// Ignored columns remain in the row set but are excluded from
    /// [`Prepared::compare_columns`].
    pub fn prepare_for_match(mut self, key: &KeySpec, ignore: &HashSet<String>) -> Result<Prepared> {
        for column in key.columns() {
            if self.column_index(column).is_none() {
                return Err(CompareError::key_missing(column, &self.columns));
            }
        }

        if key.is_composite() {
            let key_indexes: Vec<usize> = key
                .columns()
                .iter()
                .map(|c| self.column_index(c).expect("key column validated"))
                .collect();

            self.columns.insert(0, COMPOSITE_KEY_COLUMN.to_string());
            for (row_idx, row) in self.rows.iter_mut().enumerate() {
                let composite = build_composite_key(row, &key_indexes, row_idx);
                row.insert(0, Some(composite));
            }
        } else if let Some(key_idx) = self.column_index(key.effective_column()) {
            for (row_idx, row) in self.rows.iter_mut().enumerate() {
                let blank = row[key_idx].as_deref().map_or(true, str::is_empty);
                if blank {
                    row[key_idx] = Some(format!("ROW_{row_idx}"));
                }
            }
        }

        let key_column = key.effective_column().to_string();
        let compare_columns = self
            .columns
            .iter()
            .filter(|c| *c != &key_column && !ignore.contains(*c))
            .cloned()
            .collect();

        Ok(Prepared {
            rows: self,
            key_column,
            compare_columns,
        })
    }
}

/// A row set with its effective join key and comparison-relevant columns.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Rows including any synthesized key column; ignored columns retained.
    pub rows: RowSet,

    /// The effective join-key column name.
    pub key_column: String,

    /// Columns the matcher should compare: all columns minus the key and
    /// minus ignored columns.
    pub compare_columns: Vec<String>,
}

/// Split a line on a literal delimiter, honoring double-quoted fields.
///
/// An unterminated quote swallows the rest of the line into the current
/// field rather than erroring.
pub fn split_delimited(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
            current.push(c);
        } else if c == delimiter && !in_quotes {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}

/// Trim a raw field and strip one pair of wrapping double quotes.
fn clean_field(field: &str) -> String {
    let trimmed = field.trim();
    if trimmed.len() > 1 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

fn resolve_headers(line: &str, delimiter: char) -> Vec<String> {
    split_delimited(line, delimiter)
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let name = clean_field(raw);
            if name.is_empty() {
                format!("COLUMN_{}", i + 1)
            } else {
                name
            }
        })
        .collect()
}

fn synthetic_headers(count: usize) -> Vec<String> {
    (1..=count).map(|n| format!("COLUMN_{n}")).collect()
}

fn build_composite_key(row: &[Option<String>], key_indexes: &[usize], row_idx: usize) -> String {
    let parts: Vec<String> = key_indexes
        .iter()
        .map(|&idx| match row[idx].as_deref() {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => format!("NULL_{row_idx}"),
        })
        .collect();
    parts.join(&COMPOSITE_KEY_SEPARATOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_header_round_trip_preserves_order_and_keys() {
        let set = RowSet::from_delimited(&lines(&["id,name", "1,Alice", "2,Bob"]), ',', true);
        assert_eq!(set.columns(), &["id", "name"]);
        assert_eq!(set.len(), 2);

        let prepared = set
            .prepare_for_match(&KeySpec::parse("id"), &HashSet::new())
            .unwrap();
        assert_eq!(prepared.key_column, "id");
        assert_eq!(prepared.rows.value(0, "id"), Some("1"));
        assert_eq!(prepared.rows.value(1, "id"), Some("2"));
        assert_eq!(prepared.rows.columns(), &["id", "name"]);
    }

    #[test]
    fn test_headerless_input_gets_synthetic_columns() {
        let set = RowSet::from_delimited(&lines(&["1,Alice,x", "2,Bob,y"]), ',', false);
        assert_eq!(set.columns(), &["COLUMN_1", "COLUMN_2", "COLUMN_3"]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.value(0, "COLUMN_2"), Some("Alice"));
    }

    #[test]
    fn test_blank_header_cell_replaced_by_position() {
        let set = RowSet::from_delimited(&lines(&["id,,name", "1,x,Alice"]), ',', true);
        assert_eq!(set.columns(), &["id", "COLUMN_2", "name"]);
    }

    #[test]
    fn test_quoted_fields_keep_embedded_delimiters() {
        let set = RowSet::from_delimited(&lines(&["id,name", "1,\"Smith, Alice\""]), ',', true);
        assert_eq!(set.value(0, "name"), Some("Smith, Alice"));
    }

    #[test]
    fn test_unterminated_quote_passes_through() {
        let fields = split_delimited("1,\"oops,2", ',');
        assert_eq!(fields, vec!["1", "\"oops,2"]);
    }

    #[test]
    fn test_pipe_delimiter_is_literal_not_a_pattern() {
        let set = RowSet::from_delimited(&lines(&["a|b", "1|2"]), '|', true);
        assert_eq!(set.columns(), &["a", "b"]);
        assert_eq!(set.value(0, "b"), Some("2"));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let set = RowSet::from_delimited(&lines(&["a,b,c", "1,2"]), ',', true);
        assert_eq!(set.value(0, "c"), Some(""));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let set = RowSet::from_delimited(&lines(&["a,b", "", "1,2", "   "]), ',', true);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_composite_key_is_deterministic() {
        let build = || {
            RowSet::from_delimited(&lines(&["id,region,amt", "1,eu,10"]), ',', true)
                .prepare_for_match(&KeySpec::parse("id,region"), &HashSet::new())
                .unwrap()
        };
        let a = build();
        let b = build();
        assert_eq!(a.rows.value(0, COMPOSITE_KEY_COLUMN), Some("1|eu"));
        assert_eq!(
            a.rows.value(0, COMPOSITE_KEY_COLUMN),
            b.rows.value(0, COMPOSITE_KEY_COLUMN)
        );
        assert_eq!(a.key_column, COMPOSITE_KEY_COLUMN);
    }

    #[test]
    fn test_blank_composite_key_parts_do_not_collide_across_rows() {
        let prepared =
            RowSet::from_delimited(&lines(&["id,region,amt", ",eu,10", ",eu,20"]), ',', true)
                .prepare_for_match(&KeySpec::parse("id,region"), &HashSet::new())
                .unwrap();
        let first = prepared.rows.value(0, COMPOSITE_KEY_COLUMN).unwrap();
        let second = prepared.rows.value(1, COMPOSITE_KEY_COLUMN).unwrap();
        assert_eq!(first, "NULL_0|eu");
        assert_eq!(second, "NULL_1|eu");
        assert_ne!(first, second);
    }

    #[test]
    fn test_blank_single_key_gets_row_placeholder() {
        let prepared = RowSet::from_delimited(&lines(&["id,amt", "1,10", ",20"]), ',', true)
            .prepare_for_match(&KeySpec::parse("id"), &HashSet::new())
            .unwrap();
        assert_eq!(prepared.rows.value(0, "id"), Some("1"));
        assert_eq!(prepared.rows.value(1, "id"), Some("ROW_1"));
    }

    #[test]
    fn test_missing_key_column_lists_available_headers() {
        let err = RowSet::from_delimited(&lines(&["id,amt", "1,10"]), ',', true)
            .prepare_for_match(&KeySpec::parse("account"), &HashSet::new())
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("account"));
        assert!(message.contains("id"));
        assert!(message.contains("amt"));
    }

    #[test]
    fn test_ignored_column_retained_but_not_compared() {
        let ignore: HashSet<String> = ["ts".to_string()].into_iter().collect();
        let prepared =
            RowSet::from_delimited(&lines(&["id,amt,ts", "1,10,2024"]), ',', true)
                .prepare_for_match(&KeySpec::parse("id"), &ignore)
                .unwrap();
        assert!(prepared.rows.column_index("ts").is_some());
        assert_eq!(prepared.rows.value(0, "ts"), Some("2024"));
        assert_eq!(prepared.compare_columns, vec!["amt".to_string()]);
    }

    #[test]
    fn test_key_spec_resolution() {
        assert_eq!(KeySpec::resolve(None).effective_column(), DEFAULT_KEY_COLUMN);
        assert_eq!(KeySpec::resolve(Some("  ")).effective_column(), DEFAULT_KEY_COLUMN);
        assert_eq!(KeySpec::resolve(Some("acct")).effective_column(), "acct");
        let composite = KeySpec::resolve(Some("a, b"));
        assert!(composite.is_composite());
        assert_eq!(composite.columns(), &["a", "b"]);
        assert_eq!(composite.effective_column(), COMPOSITE_KEY_COLUMN);
    }
}
