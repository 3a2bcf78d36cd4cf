//! PostgreSQL query engine.
//!
//! Uses the simple-query protocol so every value arrives as text together
//! with column metadata, which is exactly the canonical row shape this layer
//! needs; no per-type decoding is required.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::debug;

use crate::config::DbTarget;
use crate::error::{CompareError, Result};
use crate::normalize::RowSet;
use crate::session::{EngineConnection, QueryEngine};

/// PostgreSQL engine.
pub struct PostgresEngine;

struct PostgresSession {
    client: Client,
    driver: JoinHandle<()>,
}

#[async_trait]
impl QueryEngine for PostgresEngine {
    async fn connect(&self, target: &DbTarget) -> Result<Box<dyn EngineConnection>> {
        let conninfo = format!(
            "host={} port={} dbname={} user={} password={}",
            target.host,
            target.effective_port(),
            target.database,
            target.user,
            target.password
        );

        let (client, connection) = tokio_postgres::connect(&conninfo, NoTls)
            .await
            .map_err(|e| {
                CompareError::ConnectionFailure(format!("{}: {}", target.endpoint(), e))
            })?;

        // The connection object drives the socket until the client is dropped.
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("PostgreSQL connection task ended: {}", e);
            }
        });

        debug!("Connected to PostgreSQL {}", target.endpoint());
        Ok(Box::new(PostgresSession { client, driver }))
    }
}

#[async_trait]
impl EngineConnection for PostgresSession {
    async fn query(&mut self, sql: &str) -> Result<RowSet> {
        let messages = self.client.simple_query(sql).await?;

        let mut set: Option<RowSet> = None;
        for message in messages {
            match message {
                SimpleQueryMessage::RowDescription(columns) => {
                    let names = columns.iter().map(|c| c.name().to_string()).collect();
                    set = Some(RowSet::new(names));
                }
                SimpleQueryMessage::Row(row) => {
                    let set = set.get_or_insert_with(|| {
                        let names =
                            row.columns().iter().map(|c| c.name().to_string()).collect();
                        RowSet::new(names)
                    });
                    let values = (0..row.len())
                        .map(|i| row.get(i).map(str::to_string))
                        .collect();
                    set.push_row(values);
                }
                _ => {}
            }
        }

        Ok(set.unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let PostgresSession { client, driver } = *self;
        drop(client);
        let _ = driver.await;
        Ok(())
    }
}
