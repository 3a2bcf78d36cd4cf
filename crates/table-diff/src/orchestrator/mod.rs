//! Comparison orchestrator - main workflow coordinator.
//!
//! Sequences the full comparison: resolve options, fetch both sides,
//! reconcile them into the matcher's canonical shape, run the match, and
//! delegate report generation. Connection lifecycles are bounded by the
//! fetch step: when both sides are live queries the source connection is
//! closed before the target connection is opened, so at most one
//! comparison-owned connection exists at a time.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{CompareSettings, DbTarget};
use crate::error::{CompareError, Result};
use crate::fetch::{table_hint, FetchResult, SourceFetcher, SourceKind, SourceSpec};
use crate::matcher::{MatchSpec, Matcher};
use crate::normalize::{KeySpec, RowSet};
use crate::report::{write_rowset, ComparisonMeta, ReportWriter};
use crate::session::{engine_for, fetch_query_rows, safety, SessionRegistry};

/// Default per-query execution timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default preview row count.
const DEFAULT_PREVIEW_ROWS: usize = 5;

/// Caller-facing comparison options. Optional fields are resolved to
/// defaults in one explicit step before any I/O begins.
#[derive(Debug, Clone, Default)]
pub struct CompareOptions {
    /// Join-key column name(s), comma-separated for composite keys.
    pub key: Option<String>,

    /// Columns excluded from comparison.
    pub ignore_columns: Vec<String>,

    /// Per-column numeric tolerance percentages.
    pub thresholds: HashMap<String, f64>,

    /// Directory the report artifact is written into. Required.
    pub output_dir: PathBuf,

    /// Per-query execution timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl CompareOptions {
    /// Build options from YAML compare settings plus an output directory.
    pub fn from_settings(settings: &CompareSettings, output_dir: PathBuf) -> Self {
        Self {
            key: settings.key.clone(),
            ignore_columns: settings.ignore_columns.clone(),
            thresholds: settings.thresholds.clone(),
            output_dir,
            timeout_secs: settings.timeout_secs,
        }
    }

    fn resolve(&self) -> Result<ResolvedOptions> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(CompareError::Config("output_dir is required".into()));
        }
        crate::config::validate_thresholds(&self.thresholds)?;

        Ok(ResolvedOptions {
            key: KeySpec::resolve(self.key.as_deref()),
            ignore: self
                .ignore_columns
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            thresholds: self.thresholds.clone(),
            output_dir: self.output_dir.clone(),
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}

struct ResolvedOptions {
    key: KeySpec,
    ignore: HashSet<String>,
    thresholds: HashMap<String, f64>,
    output_dir: PathBuf,
    timeout: Duration,
}

/// Result of a completed comparison.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonSummary {
    /// Where the report artifact was written.
    pub report_path: PathBuf,

    /// Rows fetched from the source side.
    pub source_rows: usize,

    /// Rows fetched from the target side.
    pub target_rows: usize,

    /// Rows equal on every compared column.
    pub matched: usize,

    /// Rows present on both sides with differing values.
    pub mismatched: usize,

    /// Rows only present in the source.
    pub source_only: usize,

    /// Rows only present in the target.
    pub target_only: usize,

    /// Total wall-clock time in milliseconds.
    pub elapsed_ms: u64,
}

/// Result of a query preview.
#[derive(Debug, Serialize)]
pub struct QueryPreview {
    /// The bounded preview rows.
    pub rows: RowSet,

    /// Unbounded total row count of the query.
    pub total_rows: u64,

    /// Query execution time in milliseconds.
    pub elapsed_ms: u64,
}

/// Result of a query export.
#[derive(Debug, Serialize)]
pub struct ExportSummary {
    /// Where the export file was written.
    pub export_path: PathBuf,

    /// Rows exported.
    pub rows_exported: usize,

    /// Total wall-clock time in milliseconds.
    pub elapsed_ms: u64,
}

/// Comparison orchestrator.
///
/// Collaborators are injected: the registry owns connection lifecycles, the
/// matcher computes differences, the report writer owns the artifact layout.
pub struct ComparisonOrchestrator<'a> {
    registry: &'a SessionRegistry,
    matcher: &'a dyn Matcher,
    report_writer: &'a dyn ReportWriter,
}

impl<'a> ComparisonOrchestrator<'a> {
    pub fn new(
        registry: &'a SessionRegistry,
        matcher: &'a dyn Matcher,
        report_writer: &'a dyn ReportWriter,
    ) -> Self {
        Self {
            registry,
            matcher,
            report_writer,
        }
    }

    /// Run a full comparison between two sources.
    ///
    /// Any failure during fetch, preparation, matching or report generation
    /// aborts the whole comparison; sessions opened along the way are closed
    /// before the error is returned. On success the report path is returned
    /// whether or not differences were found.
    pub async fn compare(
        &self,
        source: &SourceSpec,
        target: &SourceSpec,
        options: &CompareOptions,
    ) -> Result<ComparisonSummary> {
        let started = Instant::now();
        let resolved = options.resolve()?;

        info!(
            "Starting comparison: {} vs {}",
            source.descriptor(),
            target.descriptor()
        );

        info!("Phase 1: fetching row sets");
        let (source_fetch, target_fetch) = self.fetch_both(source, target, &resolved).await?;

        let meta = ComparisonMeta {
            source_type: source_fetch.kind.label().to_string(),
            target_type: target_fetch.kind.label().to_string(),
            source_location: source_fetch.descriptor.clone(),
            target_location: target_fetch.descriptor.clone(),
            source_rows: source_fetch.row_count,
            target_rows: target_fetch.row_count,
            key_column: resolved.key.effective_column().to_string(),
            elapsed_ms: 0,
        };

        info!("Phase 2: preparing row sets for matching");
        let prepared_source = source_fetch
            .rows
            .prepare_for_match(&resolved.key, &resolved.ignore)?;
        let prepared_target = target_fetch
            .rows
            .prepare_for_match(&resolved.key, &resolved.ignore)?;
        debug_assert_eq!(prepared_source.key_column, prepared_target.key_column);

        info!("Phase 3: matching on key column '{}'", prepared_source.key_column);
        let match_spec = MatchSpec {
            compare_columns: prepared_source.compare_columns.clone(),
            thresholds: resolved.thresholds.clone(),
        };
        let report = self.matcher.match_rows(
            &prepared_source.rows,
            &prepared_target.rows,
            &prepared_source.key_column,
            &match_spec,
        )?;

        info!("Phase 4: writing report");
        let report_path = resolved.output_dir.join(report_name(source, target));
        let meta = ComparisonMeta {
            elapsed_ms: started.elapsed().as_millis() as u64,
            ..meta
        };
        self.report_writer.write(&report, &meta, &report_path)?;

        let summary = ComparisonSummary {
            report_path,
            source_rows: meta.source_rows,
            target_rows: meta.target_rows,
            matched: report.matched_count,
            mismatched: report.mismatched_count,
            source_only: report.source_only.len(),
            target_only: report.target_only.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Comparison completed: {} matched, {} mismatched, {} source-only, {} target-only",
            summary.matched, summary.mismatched, summary.source_only, summary.target_only
        );
        Ok(summary)
    }

    /// Execute a query and return a bounded preview plus the true total.
    pub async fn preview(
        &self,
        target: &DbTarget,
        query: &str,
        preview_rows: Option<usize>,
        timeout_secs: Option<u64>,
    ) -> Result<QueryPreview> {
        safety::validate_query_safety(query)?;

        let rows = preview_rows.unwrap_or(DEFAULT_PREVIEW_ROWS).max(1);
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let engine = engine_for(target.engine);

        let handle = self.registry.connect(engine, target).await?;
        let result = self
            .registry
            .execute(&handle, query, Some(rows), timeout)
            .await;
        if let Err(close_err) = self.registry.close(&handle).await {
            tracing::warn!("Failed to close preview session: {}", close_err);
        }
        let output = result?;

        Ok(QueryPreview {
            total_rows: output.total_rows.unwrap_or(0),
            elapsed_ms: output.elapsed.as_millis() as u64,
            rows: output.rows,
        })
    }

    /// Execute a query and export the full result set to a CSV file with an
    /// auto-generated name encoding the table hint and a timestamp.
    pub async fn export(
        &self,
        target: &DbTarget,
        query: &str,
        output_dir: &Path,
        timeout_secs: Option<u64>,
    ) -> Result<ExportSummary> {
        let started = Instant::now();
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let engine = engine_for(target.engine);

        let output = fetch_query_rows(self.registry, engine, target, query, timeout).await?;

        std::fs::create_dir_all(output_dir)
            .map_err(|e| CompareError::ReportGeneration(format!("{}: {}", output_dir.display(), e)))?;
        let name = format!("database_{}_export_{}.csv", table_hint(query), timestamp());
        let export_path = output_dir.join(name);
        write_rowset(&output.rows, &export_path)?;

        info!(
            "Exported {} rows to {}",
            output.rows.len(),
            export_path.display()
        );
        Ok(ExportSummary {
            rows_exported: output.rows.len(),
            export_path,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Fetch both sides. Query-vs-query runs strictly sequentially so the
    /// source connection is released before the target connection is
    /// acquired; every other combination fetches concurrently, each side
    /// releasing its own resources on failure.
    async fn fetch_both(
        &self,
        source: &SourceSpec,
        target: &SourceSpec,
        resolved: &ResolvedOptions,
    ) -> Result<(FetchResult, FetchResult)> {
        let fetcher = SourceFetcher::new(self.registry, resolved.timeout);

        if source.kind() == SourceKind::Query && target.kind() == SourceKind::Query {
            debug!("Both sides are live queries; fetching sequentially");
            let source_result = fetcher.fetch(source).await?;
            let target_result = fetcher.fetch(target).await?;
            Ok((source_result, target_result))
        } else {
            let (source_result, target_result) =
                tokio::join!(fetcher.fetch(source), fetcher.fetch(target));
            Ok((source_result?, target_result?))
        }
    }
}

/// Deterministic report name: both source hints, a type tag, a timestamp.
fn report_name(source: &SourceSpec, target: &SourceSpec) -> String {
    format!(
        "{}_vs_{}_{}_comparison_{}",
        source.hint(),
        target.hint(),
        type_tag(source, target),
        timestamp()
    )
}

fn type_tag(source: &SourceSpec, target: &SourceSpec) -> &'static str {
    match (source, target) {
        (SourceSpec::Query { target: s, .. }, SourceSpec::Query { target: t, .. }) => {
            let same = s.host == t.host
                && s.effective_port() == t.effective_port()
                && s.database == t.database;
            if same {
                "db"
            } else {
                "cross_db"
            }
        }
        (SourceSpec::DelimitedFile { .. }, SourceSpec::DelimitedFile { .. }) => "csv",
        (SourceSpec::Inline { .. }, SourceSpec::Inline { .. }) => "inline",
        _ => "mixed",
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}
