//! # table-diff
//!
//! Compare two tabular data sources and produce a structured difference
//! report. Sources can be mixed freely:
//!
//! - **Delimited text files** with automatic delimiter detection
//! - **Inline record sets** already in canonical row form
//! - **Live SQL queries** against PostgreSQL or MySQL, including queries
//!   against two different database servers
//!
//! The heavy lifting is the ingestion layer: every source is normalized into
//! the same ordered row format, join keys (single or composite) are
//! constructed uniformly, and database connections are strictly scoped to a
//! single comparison with guaranteed cleanup on every path.
//!
//! ## Example
//!
//! ```rust,no_run
//! use table_diff::{
//!     CompareOptions, ComparisonOrchestrator, CsvReportWriter, HashJoinMatcher,
//!     SessionRegistry, SourceSpec,
//! };
//!
//! #[tokio::main]
//! async fn main() -> table_diff::Result<()> {
//!     let registry = SessionRegistry::new();
//!     let orchestrator =
//!         ComparisonOrchestrator::new(&registry, &HashJoinMatcher, &CsvReportWriter);
//!
//!     let source = SourceSpec::DelimitedFile {
//!         path: "a.csv".into(),
//!         delimiter: None,
//!         has_header: true,
//!     };
//!     let target = SourceSpec::DelimitedFile {
//!         path: "b.csv".into(),
//!         delimiter: None,
//!         has_header: true,
//!     };
//!     let options = CompareOptions {
//!         key: Some("id".to_string()),
//!         output_dir: "reports".into(),
//!         ..Default::default()
//!     };
//!
//!     let summary = orchestrator.compare(&source, &target, &options).await?;
//!     println!("{} mismatched rows", summary.mismatched);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod detect;
pub mod error;
pub mod fetch;
pub mod matcher;
pub mod normalize;
pub mod orchestrator;
pub mod report;
pub mod session;

// Re-exports for convenient access
pub use config::{
    CompareSettings, ConnectionConfig, CrossDbConfig, DbTarget, EngineKind, QueryPairConfig,
    QuerySide,
};
pub use detect::{detect_delimiter, printable, DEFAULT_DELIMITER};
pub use error::{CompareError, Result};
pub use fetch::{FetchResult, SourceFetcher, SourceKind, SourceSpec};
pub use matcher::{HashJoinMatcher, MatchReport, MatchSpec, Matcher};
pub use normalize::{KeySpec, Prepared, RowSet, COMPOSITE_KEY_COLUMN, DEFAULT_KEY_COLUMN};
pub use orchestrator::{
    CompareOptions, ComparisonOrchestrator, ComparisonSummary, ExportSummary, QueryPreview,
};
pub use report::{ComparisonMeta, CsvReportWriter, ReportWriter};
pub use session::{
    fetch_query_rows, MysqlEngine, PostgresEngine, QueryEngine, SessionHandle, SessionRegistry,
};
