//! table-diff CLI - compare tabular data across files and databases.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use table_diff::{
    detect_delimiter, printable, CompareError, CompareOptions, ComparisonOrchestrator,
    ConnectionConfig, CrossDbConfig, CsvReportWriter, HashJoinMatcher, QueryPairConfig,
    SessionRegistry, SourceSpec,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "table-diff")]
#[command(about = "Compare tabular data across delimited files and live SQL queries")]
#[command(version)]
struct Cli {
    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two delimited text files
    Files {
        /// Source file path
        source: PathBuf,

        /// Target file path
        target: PathBuf,

        /// Source delimiter (auto-detected when omitted)
        #[arg(long)]
        source_delimiter: Option<char>,

        /// Target delimiter (auto-detected when omitted)
        #[arg(long)]
        target_delimiter: Option<char>,

        /// Treat the first source line as data rather than a header
        #[arg(long)]
        headerless_source: bool,

        /// Treat the first target line as data rather than a header
        #[arg(long)]
        headerless_target: bool,

        /// Join-key column(s), comma-separated for composite keys [default: ID]
        #[arg(long)]
        key: Option<String>,

        /// Comma-separated columns to exclude from comparison
        #[arg(long)]
        ignore_columns: Option<String>,

        /// Per-column numeric tolerance percentage, e.g. --threshold amt=0.5
        #[arg(long = "threshold", value_parser = parse_threshold)]
        thresholds: Vec<(String, f64)>,

        /// Directory the report artifact is written into
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Compare two queries over one database connection (YAML config)
    Db {
        /// Path to YAML comparison config
        config: PathBuf,

        /// Override the config's output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Compare queries across two database servers (YAML config)
    CrossDb {
        /// Path to YAML comparison config
        config: PathBuf,

        /// Override the config's output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Preview a query: bounded rows plus the unbounded total count
    Preview {
        /// Path to YAML connection config
        config: PathBuf,

        /// SELECT statement to preview
        #[arg(long)]
        query: String,

        /// Number of preview rows [default: 5]
        #[arg(long, default_value = "5")]
        rows: usize,

        /// Query timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Export a query's full result set to a CSV file
    Export {
        /// Path to YAML connection config
        config: PathBuf,

        /// SELECT statement to export
        #[arg(long)]
        query: String,

        /// Directory the export file is written into
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Query timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Detect the delimiter of a delimited text file
    Detect {
        /// File to probe
        file: PathBuf,
    },
}

fn parse_threshold(raw: &str) -> Result<(String, f64), String> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| "expected COLUMN=PERCENT".to_string())?;
    let pct: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid percentage '{}'", value.trim()))?;
    Ok((column.trim().to_string(), pct))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_format, &cli.verbosity);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_logging(format: &str, verbosity: &str) {
    let level = match verbosity {
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), CompareError> {
    let registry = SessionRegistry::new();
    let orchestrator = ComparisonOrchestrator::new(&registry, &HashJoinMatcher, &CsvReportWriter);

    match cli.command {
        Commands::Files {
            source,
            target,
            source_delimiter,
            target_delimiter,
            headerless_source,
            headerless_target,
            key,
            ignore_columns,
            thresholds,
            output_dir,
        } => {
            let source_spec = SourceSpec::DelimitedFile {
                path: source,
                delimiter: source_delimiter,
                has_header: !headerless_source,
            };
            let target_spec = SourceSpec::DelimitedFile {
                path: target,
                delimiter: target_delimiter,
                has_header: !headerless_target,
            };
            let options = CompareOptions {
                key,
                ignore_columns: split_columns(ignore_columns.as_deref()),
                thresholds: thresholds.into_iter().collect::<HashMap<_, _>>(),
                output_dir,
                timeout_secs: None,
            };

            let summary = orchestrator
                .compare(&source_spec, &target_spec, &options)
                .await?;
            emit_summary(&summary, cli.output_json)
        }

        Commands::Db { config, output_dir } => {
            let config = QueryPairConfig::load(config)?;
            let source_spec = SourceSpec::Query {
                target: config.connection.clone(),
                query: config.source_query.clone(),
            };
            let target_spec = SourceSpec::Query {
                target: config.connection.clone(),
                query: config.target_query.clone(),
            };
            let options = CompareOptions::from_settings(
                &config.compare,
                resolve_output_dir(output_dir, config.output_dir.clone()),
            );

            let summary = orchestrator
                .compare(&source_spec, &target_spec, &options)
                .await?;
            emit_summary(&summary, cli.output_json)
        }

        Commands::CrossDb { config, output_dir } => {
            let config = CrossDbConfig::load(config)?;
            let source_spec = SourceSpec::Query {
                target: config.source.target.clone(),
                query: config.source.query.clone(),
            };
            let target_spec = SourceSpec::Query {
                target: config.target.target.clone(),
                query: config.target.query.clone(),
            };
            let options = CompareOptions::from_settings(
                &config.compare,
                resolve_output_dir(output_dir, config.output_dir.clone()),
            );

            let summary = orchestrator
                .compare(&source_spec, &target_spec, &options)
                .await?;
            emit_summary(&summary, cli.output_json)
        }

        Commands::Preview {
            config,
            query,
            rows,
            timeout_secs,
        } => {
            let config = ConnectionConfig::load(config)?;
            let preview = orchestrator
                .preview(&config.connection, &query, Some(rows), timeout_secs)
                .await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&preview)?);
            } else {
                println!("{}", preview.rows.columns().join(","));
                for row in preview.rows.rows() {
                    let line: Vec<&str> = row.iter().map(|v| v.as_deref().unwrap_or("")).collect();
                    println!("{}", line.join(","));
                }
                println!();
                println!("Preview rows: {}", preview.rows.len());
                println!("Total rows: {}", preview.total_rows);
                println!("Elapsed: {}ms", preview.elapsed_ms);
            }
            Ok(())
        }

        Commands::Export {
            config,
            query,
            output_dir,
            timeout_secs,
        } => {
            let config = ConnectionConfig::load(config)?;
            let export = orchestrator
                .export(&config.connection, &query, &output_dir, timeout_secs)
                .await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&export)?);
            } else {
                println!("Exported {} rows to {}", export.rows_exported, export.export_path.display());
            }
            Ok(())
        }

        Commands::Detect { file } => {
            let delimiter = detect_delimiter(&file);
            if cli.output_json {
                println!(
                    "{}",
                    serde_json::json!({ "delimiter": printable(delimiter) })
                );
            } else {
                println!("{}", printable(delimiter));
            }
            Ok(())
        }
    }
}

fn split_columns(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn resolve_output_dir(flag: Option<PathBuf>, config: Option<PathBuf>) -> PathBuf {
    flag.or(config).unwrap_or_else(|| PathBuf::from("."))
}

fn emit_summary(
    summary: &table_diff::ComparisonSummary,
    as_json: bool,
) -> Result<(), CompareError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("Report: {}", summary.report_path.display());
        println!("Source rows: {}", summary.source_rows);
        println!("Target rows: {}", summary.target_rows);
        println!("Matched: {}", summary.matched);
        println!("Mismatched: {}", summary.mismatched);
        println!("Source only: {}", summary.source_only);
        println!("Target only: {}", summary.target_only);
        println!("Elapsed: {}ms", summary.elapsed_ms);
    }
    Ok(())
}
