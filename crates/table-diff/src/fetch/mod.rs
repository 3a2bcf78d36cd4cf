//! Source classification and row-set fetching.
//!
//! A [`SourceSpec`] names one side of a comparison; the fetcher turns it
//! into a [`FetchResult`] carrying the canonical rows plus metadata about
//! where they came from and how long the fetch took.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::DbTarget;
use crate::detect;
use crate::error::{CompareError, Result};
use crate::normalize::RowSet;
use crate::session::{engine_for, fetch_query_rows, SessionRegistry};

/// Maximum descriptor length for query text.
const QUERY_DESCRIPTOR_LEN: usize = 100;

/// What kind of source one side of a comparison is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    DelimitedFile,
    Inline,
    Query,
}

impl SourceKind {
    /// Human-readable label used in report metadata.
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::DelimitedFile => "Delimited File",
            SourceKind::Inline => "Inline Records",
            SourceKind::Query => "Database Query",
        }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    /// Delimited text file; delimiter auto-detected when unset.
    DelimitedFile {
        path: PathBuf,
        delimiter: Option<char>,
        has_header: bool,
    },

    /// Caller-supplied rows, already in canonical shape.
    Inline { descriptor: String, rows: RowSet },

    /// Live SQL query against a database target.
    Query { target: DbTarget, query: String },
}

impl SourceSpec {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceSpec::DelimitedFile { .. } => SourceKind::DelimitedFile,
            SourceSpec::Inline { .. } => SourceKind::Inline,
            SourceSpec::Query { .. } => SourceKind::Query,
        }
    }

    /// Full descriptor for report metadata: path, inline tag, or truncated
    /// query text plus database name.
    pub fn descriptor(&self) -> String {
        match self {
            SourceSpec::DelimitedFile { path, .. } => path.display().to_string(),
            SourceSpec::Inline { descriptor, .. } => descriptor.clone(),
            SourceSpec::Query { target, query } => {
                format!("{} [{}]", truncate_query(query), target.database)
            }
        }
    }

    /// Short, filename-safe hint used when generating report names.
    pub fn hint(&self) -> String {
        let raw = match self {
            SourceSpec::DelimitedFile { path, .. } => file_stem(path),
            SourceSpec::Inline { descriptor, .. } => descriptor.clone(),
            SourceSpec::Query { target, query } => {
                format!("{}_{}", target.database, table_hint(query))
            }
        };
        sanitize_hint(&raw)
    }
}

/// Rows fetched from one side, plus fetch metadata.
#[derive(Debug)]
pub struct FetchResult {
    pub rows: RowSet,
    pub kind: SourceKind,
    pub descriptor: String,
    pub row_count: usize,
    pub elapsed: Duration,
}

/// Fetches complete row sets from any source kind.
pub struct SourceFetcher<'a> {
    registry: &'a SessionRegistry,
    timeout: Duration,
}

impl<'a> SourceFetcher<'a> {
    pub fn new(registry: &'a SessionRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Fetch the complete row set for one source.
    pub async fn fetch(&self, spec: &SourceSpec) -> Result<FetchResult> {
        let start = Instant::now();
        let rows = match spec {
            SourceSpec::DelimitedFile {
                path,
                delimiter,
                has_header,
            } => self.fetch_file(path, *delimiter, *has_header)?,
            SourceSpec::Inline { rows, .. } => rows.clone(),
            SourceSpec::Query { target, query } => {
                let engine = engine_for(target.engine);
                let output =
                    fetch_query_rows(self.registry, engine, target, query, self.timeout).await?;
                output.rows
            }
        };

        let result = FetchResult {
            row_count: rows.len(),
            rows,
            kind: spec.kind(),
            descriptor: spec.descriptor(),
            elapsed: start.elapsed(),
        };
        info!(
            "Fetched {} rows from {} in {}ms",
            result.row_count,
            result.descriptor,
            result.elapsed.as_millis()
        );
        Ok(result)
    }

    fn fetch_file(
        &self,
        path: &Path,
        delimiter: Option<char>,
        has_header: bool,
    ) -> Result<RowSet> {
        if !path.exists() {
            return Err(CompareError::SourceNotFound(path.display().to_string()));
        }

        let delimiter = delimiter.unwrap_or_else(|| {
            let detected = detect::detect_delimiter(path);
            info!(
                "Auto-detected delimiter '{}' for {}",
                detect::printable(detected),
                path.display()
            );
            detected
        });

        let content = std::fs::read_to_string(path)
            .map_err(|e| CompareError::SourceNotFound(format!("{}: {}", path.display(), e)))?;
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        Ok(RowSet::from_delimited(&lines, delimiter, has_header))
    }
}

/// Extract a table-name hint from `SELECT ... FROM <table>` for filenames.
pub fn table_hint(query: &str) -> String {
    let words: Vec<&str> = query.split_whitespace().collect();
    for (i, word) in words.iter().enumerate() {
        if word.eq_ignore_ascii_case("FROM") {
            if let Some(table) = words.get(i + 1) {
                let cleaned: String = table
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                    .collect();
                if !cleaned.is_empty() {
                    return cleaned;
                }
            }
        }
    }
    "query".to_string()
}

/// Collapse whitespace and truncate query text for descriptors.
pub fn truncate_query(query: &str) -> String {
    let cleaned = query.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.len() > QUERY_DESCRIPTOR_LEN {
        format!("{}...", &cleaned[..QUERY_DESCRIPTOR_LEN - 3])
    } else {
        cleaned
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string())
}

fn sanitize_hint(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "source".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_table_hint_extraction() {
        assert_eq!(table_hint("SELECT * FROM accounts WHERE x = 1"), "accounts");
        assert_eq!(table_hint("select id from public.orders"), "publicorders");
        assert_eq!(table_hint("SELECT 1"), "query");
    }

    #[test]
    fn test_truncate_query_collapses_whitespace() {
        assert_eq!(truncate_query("SELECT *\n  FROM t"), "SELECT * FROM t");
        let long = format!("SELECT {} FROM t", "c,".repeat(100));
        let truncated = truncate_query(&long);
        assert_eq!(truncated.len(), 100);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_hint_is_filename_safe() {
        let spec = SourceSpec::DelimitedFile {
            path: PathBuf::from("/data/my report (v2).csv"),
            delimiter: None,
            has_header: true,
        };
        assert_eq!(spec.hint(), "my_report__v2_");
    }

    #[tokio::test]
    async fn test_missing_file_is_source_not_found() {
        let registry = SessionRegistry::new();
        let fetcher = SourceFetcher::new(&registry, Duration::from_secs(5));
        let spec = SourceSpec::DelimitedFile {
            path: PathBuf::from("no_such_file.csv"),
            delimiter: None,
            has_header: true,
        };
        let err = fetcher.fetch(&spec).await.unwrap_err();
        assert!(matches!(err, CompareError::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_file_fetch_with_auto_detection() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id;name").unwrap();
        writeln!(file, "1;Alice").unwrap();
        writeln!(file, "2;Bob").unwrap();

        let registry = SessionRegistry::new();
        let fetcher = SourceFetcher::new(&registry, Duration::from_secs(5));
        let spec = SourceSpec::DelimitedFile {
            path: file.path().to_path_buf(),
            delimiter: None,
            has_header: true,
        };

        let result = fetcher.fetch(&spec).await.unwrap();
        assert_eq!(result.kind, SourceKind::DelimitedFile);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows.columns(), &["id", "name"]);
        assert_eq!(result.rows.value(1, "name"), Some("Bob"));
    }

    #[tokio::test]
    async fn test_inline_fetch_passes_rows_through() {
        let mut rows = RowSet::new(vec!["id".to_string()]);
        rows.push_row(vec![Some("1".to_string())]);

        let registry = SessionRegistry::new();
        let fetcher = SourceFetcher::new(&registry, Duration::from_secs(5));
        let spec = SourceSpec::Inline {
            descriptor: "fixture".to_string(),
            rows,
        };

        let result = fetcher.fetch(&spec).await.unwrap();
        assert_eq!(result.kind, SourceKind::Inline);
        assert_eq!(result.row_count, 1);
        assert_eq!(result.descriptor, "fixture");
    }
}
