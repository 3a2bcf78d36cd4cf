//! Error types for the comparison library.

use thiserror::Error;

/// Main error type for comparison operations.
#[derive(Error, Debug)]
pub enum CompareError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input file missing or unreadable
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// A requested key column is absent from the resolved headers
    #[error("Key column '{column}' not found. Available columns: [{}]", .available.join(", "))]
    KeyColumnMissing {
        column: String,
        available: Vec<String>,
    },

    /// Query rejected by the safety validator (non-SELECT or blocklisted keyword)
    #[error("Unsafe query operation not allowed: {0}")]
    UnsafeQuery(String),

    /// Connection could not be established or session is unknown
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// Query execution exceeded the configured timeout
    #[error("Query timed out after {0} seconds")]
    QueryTimeout(u64),

    /// Report artifact could not be written (distinct from comparison failure)
    #[error("Report generation failed: {0}")]
    ReportGeneration(String),

    /// Non-numeric or negative comparison tolerance
    #[error("Malformed threshold for column '{column}': {message}")]
    MalformedThreshold { column: String, message: String },

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL driver error
    #[error("MySQL error: {0}")]
    Mysql(#[from] sqlx::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompareError {
    /// Create a MalformedThreshold error.
    pub fn threshold(column: impl Into<String>, message: impl Into<String>) -> Self {
        CompareError::MalformedThreshold {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a KeyColumnMissing error from the attempted column and the
    /// resolved header list.
    pub fn key_missing(column: impl Into<String>, available: &[String]) -> Self {
        CompareError::KeyColumnMissing {
            column: column.into(),
            available: available.to_vec(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            CompareError::Config(_) | CompareError::Yaml(_) | CompareError::Json(_) => 1,
            CompareError::MalformedThreshold { .. } => 2,
            CompareError::UnsafeQuery(_) => 3,
            CompareError::KeyColumnMissing { .. } => 4,
            CompareError::ConnectionFailure(_)
            | CompareError::Postgres(_)
            | CompareError::Mysql(_) => 5,
            CompareError::QueryTimeout(_) => 6,
            CompareError::SourceNotFound(_) | CompareError::Io(_) => 7,
            CompareError::ReportGeneration(_) => 8,
        }
    }
}

/// Result type alias for comparison operations.
pub type Result<T> = std::result::Result<T, CompareError>;
