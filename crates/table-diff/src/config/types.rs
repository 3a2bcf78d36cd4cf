//! Configuration type definitions.
//!
//! Optional caller inputs are modelled as `Option<T>` so "not specified" and
//! "specified empty" stay distinguishable; defaults are resolved in a single
//! explicit step by the orchestrator.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Supported database vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Postgres,
    Mysql,
}

impl EngineKind {
    /// Vendor's default port.
    pub fn default_port(&self) -> u16 {
        match self {
            EngineKind::Postgres => 5432,
            EngineKind::Mysql => 3306,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Postgres => write!(f, "postgres"),
            EngineKind::Mysql => write!(f, "mysql"),
        }
    }
}

/// One database connection target.
#[derive(Clone, Serialize, Deserialize)]
pub struct DbTarget {
    /// Database vendor.
    pub engine: EngineKind,

    /// Database host.
    pub host: String,

    /// Port; vendor default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,
}

impl DbTarget {
    /// Port with the vendor default applied.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.engine.default_port())
    }

    /// `host:port/database` rendering for logs and error messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.effective_port(), self.database)
    }
}

// Manual Debug so credentials never leak into logs.
impl fmt::Debug for DbTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbTarget")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// One side of a database comparison: a connection target plus its query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySide {
    #[serde(flatten)]
    pub target: DbTarget,

    /// SELECT statement producing this side's rows.
    pub query: String,
}

/// Comparison tuning shared by every command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompareSettings {
    /// Join-key column name(s), comma-separated for composite keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Columns excluded from comparison (still carried in rows).
    #[serde(default)]
    pub ignore_columns: Vec<String>,

    /// Per-column numeric tolerance percentages.
    #[serde(default)]
    pub thresholds: HashMap<String, f64>,

    /// Per-query execution timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Config for comparing two queries against a single database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPairConfig {
    /// Shared connection target.
    pub connection: DbTarget,

    /// Query producing the source rows.
    pub source_query: String,

    /// Query producing the target rows.
    pub target_query: String,

    #[serde(default)]
    pub compare: CompareSettings,

    /// Directory the report artifact is written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

/// Config for comparing queries across two independent databases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossDbConfig {
    pub source: QuerySide,
    pub target: QuerySide,

    #[serde(default)]
    pub compare: CompareSettings,

    /// Directory the report artifact is written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

/// Config for single-connection operations (preview, export).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub connection: DbTarget,
}
