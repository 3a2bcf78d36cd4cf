//! Connection-scoped query execution.
//!
//! A [`SessionRegistry`] owns every live database connection as an opaque
//! session keyed by a generated identifier. The registry serializes its own
//! add/remove operations; queries themselves run with the session checked
//! out of the registry so one long fetch never blocks another session's
//! bookkeeping.
//!
//! Lifecycle discipline: every successful connect is matched by exactly one
//! close, a session is never queried after close, and the scoped
//! [`fetch_query_rows`] helper gives callers the connect/execute/close
//! sequence with the release guaranteed on both outcomes.

pub mod mysql;
pub mod postgres;
pub mod safety;

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DbTarget, EngineKind};
use crate::error::{CompareError, Result};
use crate::normalize::RowSet;

pub use mysql::MysqlEngine;
pub use postgres::PostgresEngine;

/// A vendor-specific way to open connections.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Open a connection to the target.
    async fn connect(&self, target: &DbTarget) -> Result<Box<dyn EngineConnection>>;
}

/// One live database connection.
///
/// Implementations return columnar metadata (name, ordinal) alongside row
/// data, stringified into the canonical [`RowSet`] shape.
#[async_trait]
pub trait EngineConnection: Send {
    /// Execute a query and collect the full result set.
    async fn query(&mut self, sql: &str) -> Result<RowSet>;

    /// Release the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Select the engine implementation for a vendor.
pub fn engine_for(kind: EngineKind) -> &'static dyn QueryEngine {
    match kind {
        EngineKind::Postgres => &PostgresEngine,
        EngineKind::Mysql => &MysqlEngine,
    }
}

/// Opaque identifier of a live session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(Uuid);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of one query execution.
#[derive(Debug)]
pub struct QueryOutput {
    /// Fetched rows (bounded in preview mode).
    pub rows: RowSet,

    /// Unbounded total row count; only computed in preview mode.
    pub total_rows: Option<u64>,

    /// Wall-clock execution time.
    pub elapsed: Duration,
}

/// Registry of live sessions keyed by opaque identifiers.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Box<dyn EngineConnection>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently open sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.lock().expect("registry poisoned").len()
    }

    /// Connect to a target and register the session.
    pub async fn connect(
        &self,
        engine: &dyn QueryEngine,
        target: &DbTarget,
    ) -> Result<SessionHandle> {
        let connection = engine.connect(target).await?;
        let id = Uuid::new_v4();
        self.sessions
            .lock()
            .expect("registry poisoned")
            .insert(id, connection);
        info!("Session {} connected to {}", id, target.endpoint());
        Ok(SessionHandle(id))
    }

    /// Execute a query on a registered session.
    ///
    /// The query text is safety-validated before touching the wire and the
    /// execution is bounded by `timeout`. With `preview_rows` set, the query
    /// is bounded with a LIMIT clause and a second round trip computes the
    /// unbounded total via a wrapping COUNT(*) subquery.
    pub async fn execute(
        &self,
        handle: &SessionHandle,
        query: &str,
        preview_rows: Option<usize>,
        timeout: Duration,
    ) -> Result<QueryOutput> {
        safety::validate_query_safety(query)?;

        let mut connection = self.take(handle)?;
        let result = Self::run_query(connection.as_mut(), query, preview_rows, timeout).await;
        self.put_back(handle, connection);
        result
    }

    /// Close a registered session. The handle is invalid afterwards.
    pub async fn close(&self, handle: &SessionHandle) -> Result<()> {
        let connection = self.take(handle)?;
        connection.close().await?;
        info!("Session {} closed", handle);
        Ok(())
    }

    async fn run_query(
        connection: &mut dyn EngineConnection,
        query: &str,
        preview_rows: Option<usize>,
        timeout: Duration,
    ) -> Result<QueryOutput> {
        let start = Instant::now();

        let effective_query = match preview_rows {
            Some(limit) => safety::add_row_limit(query, limit),
            None => query.trim().trim_end_matches(';').to_string(),
        };

        let rows = Self::bounded(connection.query(&effective_query), timeout).await?;

        let total_rows = match preview_rows {
            None => None,
            Some(_) => {
                let count_query = safety::count_wrapper(query);
                match Self::bounded(connection.query(&count_query), timeout).await {
                    Ok(count_set) => Some(parse_count(&count_set)),
                    Err(e) => {
                        debug!("Could not compute total row count: {}", e);
                        Some(0)
                    }
                }
            }
        };

        let elapsed = start.elapsed();
        debug!(
            "Query returned {} rows in {}ms",
            rows.len(),
            elapsed.as_millis()
        );

        Ok(QueryOutput {
            rows,
            total_rows,
            elapsed,
        })
    }

    async fn bounded<F>(future: F, timeout: Duration) -> Result<RowSet>
    where
        F: std::future::Future<Output = Result<RowSet>>,
    {
        match tokio::time::timeout(timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(CompareError::QueryTimeout(timeout.as_secs())),
        }
    }

    fn take(&self, handle: &SessionHandle) -> Result<Box<dyn EngineConnection>> {
        self.sessions
            .lock()
            .expect("registry poisoned")
            .remove(&handle.0)
            .ok_or_else(|| {
                CompareError::ConnectionFailure(format!("unknown or closed session {}", handle))
            })
    }

    fn put_back(&self, handle: &SessionHandle, connection: Box<dyn EngineConnection>) {
        self.sessions
            .lock()
            .expect("registry poisoned")
            .insert(handle.0, connection);
    }
}

/// Fetch one query's rows through a fully scoped session.
///
/// Connect, execute, close; the close runs on both outcomes. A close failure
/// during unwinding is logged and never replaces the primary error.
pub async fn fetch_query_rows(
    registry: &SessionRegistry,
    engine: &dyn QueryEngine,
    target: &DbTarget,
    query: &str,
    timeout: Duration,
) -> Result<QueryOutput> {
    // Refuse unsafe queries before any network activity.
    safety::validate_query_safety(query)?;

    let handle = registry.connect(engine, target).await?;
    let result = registry.execute(&handle, query, None, timeout).await;
    if let Err(close_err) = registry.close(&handle).await {
        warn!(
            "Failed to close session {} during cleanup: {}",
            handle, close_err
        );
    }
    result
}

fn parse_count(count_set: &RowSet) -> u64 {
    count_set
        .rows()
        .first()
        .and_then(|row| row.first())
        .and_then(|value| value.as_deref())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Engine whose connections serve canned rows and count their closes.
    struct StubEngine {
        fail_connect: bool,
        fail_query: bool,
        closes: Arc<AtomicUsize>,
    }

    struct StubConnection {
        fail_query: bool,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QueryEngine for StubEngine {
        async fn connect(&self, target: &DbTarget) -> Result<Box<dyn EngineConnection>> {
            if self.fail_connect {
                return Err(CompareError::ConnectionFailure(format!(
                    "{}: connection refused",
                    target.endpoint()
                )));
            }
            Ok(Box::new(StubConnection {
                fail_query: self.fail_query,
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    #[async_trait]
    impl EngineConnection for StubConnection {
        async fn query(&mut self, sql: &str) -> Result<RowSet> {
            if self.fail_query {
                return Err(CompareError::ConnectionFailure("query failed".to_string()));
            }
            let mut rows = RowSet::new(vec!["id".to_string(), "amt".to_string()]);
            if sql.contains("COUNT(*)") {
                rows = RowSet::new(vec!["total_count".to_string()]);
                rows.push_row(vec![Some("42".to_string())]);
            } else {
                rows.push_row(vec![Some("1".to_string()), Some("100".to_string())]);
            }
            Ok(rows)
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn stub(fail_connect: bool, fail_query: bool) -> (StubEngine, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        (
            StubEngine {
                fail_connect,
                fail_query,
                closes: Arc::clone(&closes),
            },
            closes,
        )
    }

    fn target() -> DbTarget {
        DbTarget {
            engine: EngineKind::Postgres,
            host: "localhost".to_string(),
            port: None,
            database: "db".to_string(),
            user: "u".to_string(),
            password: "p".to_string(),
        }
    }

    #[tokio::test]
    async fn test_scoped_fetch_closes_session_on_success() {
        let registry = SessionRegistry::new();
        let (engine, closes) = stub(false, false);

        let output = fetch_query_rows(
            &registry,
            &engine,
            &target(),
            "SELECT * FROM t",
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(output.rows.len(), 1);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scoped_fetch_closes_session_on_query_failure() {
        let registry = SessionRegistry::new();
        let (engine, closes) = stub(false, true);

        let err = fetch_query_rows(
            &registry,
            &engine,
            &target(),
            "SELECT * FROM t",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CompareError::ConnectionFailure(_)));
        assert_eq!(registry.active_count(), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsafe_query_fails_before_connect() {
        let registry = SessionRegistry::new();
        // A connect attempt would fail loudly; the validator must run first.
        let (engine, closes) = stub(true, false);

        let err = fetch_query_rows(
            &registry,
            &engine,
            &target(),
            "DROP TABLE x",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CompareError::UnsafeQuery(_)));
        assert_eq!(registry.active_count(), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_target_connect_failure_after_source_closed_leaves_no_sessions() {
        let registry = SessionRegistry::new();
        let baseline = registry.active_count();

        let (good, _closes) = stub(false, false);
        fetch_query_rows(
            &registry,
            &good,
            &target(),
            "SELECT * FROM src",
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let (bad, _) = stub(true, false);
        let err = fetch_query_rows(
            &registry,
            &bad,
            &target(),
            "SELECT * FROM tgt",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CompareError::ConnectionFailure(_)));
        assert_eq!(registry.active_count(), baseline);
    }

    #[tokio::test]
    async fn test_session_cannot_be_used_after_close() {
        let registry = SessionRegistry::new();
        let (engine, _) = stub(false, false);

        let handle = registry.connect(&engine, &target()).await.unwrap();
        registry.close(&handle).await.unwrap();

        let err = registry
            .execute(&handle, "SELECT 1", None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CompareError::ConnectionFailure(_)));

        let err = registry.close(&handle).await.unwrap_err();
        assert!(matches!(err, CompareError::ConnectionFailure(_)));
    }

    #[tokio::test]
    async fn test_preview_returns_bounded_rows_and_total() {
        let registry = SessionRegistry::new();
        let (engine, _) = stub(false, false);

        let handle = registry.connect(&engine, &target()).await.unwrap();
        let output = registry
            .execute(&handle, "SELECT * FROM t", Some(5), Duration::from_secs(5))
            .await
            .unwrap();
        registry.close(&handle).await.unwrap();

        assert_eq!(output.total_rows, Some(42));
        assert_eq!(output.rows.len(), 1);
    }
}
