//! MySQL/MariaDB query engine.
//!
//! The binary protocol returns typed values, so each column is decoded by
//! its reported type name and rendered to text for the canonical row shape.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo};
use tracing::debug;

use crate::config::DbTarget;
use crate::error::{CompareError, Result};
use crate::normalize::RowSet;
use crate::session::{EngineConnection, QueryEngine};

/// MySQL engine.
pub struct MysqlEngine;

struct MysqlSession {
    conn: MySqlConnection,
}

#[async_trait]
impl QueryEngine for MysqlEngine {
    async fn connect(&self, target: &DbTarget) -> Result<Box<dyn EngineConnection>> {
        let options = MySqlConnectOptions::new()
            .host(&target.host)
            .port(target.effective_port())
            .database(&target.database)
            .username(&target.user)
            .password(&target.password)
            .ssl_mode(MySqlSslMode::Preferred);

        let conn = options.connect().await.map_err(|e| {
            CompareError::ConnectionFailure(format!("{}: {}", target.endpoint(), e))
        })?;

        debug!("Connected to MySQL {}", target.endpoint());
        Ok(Box::new(MysqlSession { conn }))
    }
}

#[async_trait]
impl EngineConnection for MysqlSession {
    async fn query(&mut self, sql: &str) -> Result<RowSet> {
        let rows: Vec<MySqlRow> = sqlx::query(sql).fetch_all(&mut self.conn).await?;

        let Some(first) = rows.first() else {
            return Ok(RowSet::default());
        };

        let columns: Vec<String> = first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut set = RowSet::new(columns);
        for row in &rows {
            let mut values = Vec::with_capacity(row.columns().len());
            for idx in 0..row.columns().len() {
                values.push(decode_value(row, idx)?);
            }
            set.push_row(values);
        }
        Ok(set)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}

/// Decode one column of one row to its text rendering by reported type.
fn decode_value(row: &MySqlRow, idx: usize) -> Result<Option<String>> {
    let type_name = row.column(idx).type_info().name();

    let value = match type_name {
        "BOOLEAN" => row.try_get::<Option<bool>, _>(idx)?.map(|v| v.to_string()),
        "TINYINT" => row.try_get::<Option<i8>, _>(idx)?.map(|v| v.to_string()),
        "SMALLINT" => row.try_get::<Option<i16>, _>(idx)?.map(|v| v.to_string()),
        "MEDIUMINT" | "INT" => row.try_get::<Option<i32>, _>(idx)?.map(|v| v.to_string()),
        "BIGINT" => row.try_get::<Option<i64>, _>(idx)?.map(|v| v.to_string()),
        "TINYINT UNSIGNED" => row.try_get::<Option<u8>, _>(idx)?.map(|v| v.to_string()),
        "SMALLINT UNSIGNED" => row.try_get::<Option<u16>, _>(idx)?.map(|v| v.to_string()),
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => {
            row.try_get::<Option<u32>, _>(idx)?.map(|v| v.to_string())
        }
        "BIGINT UNSIGNED" | "BIT" => {
            row.try_get::<Option<u64>, _>(idx)?.map(|v| v.to_string())
        }
        "YEAR" => row.try_get::<Option<u16>, _>(idx)?.map(|v| v.to_string()),
        "FLOAT" => row.try_get::<Option<f32>, _>(idx)?.map(|v| v.to_string()),
        "DOUBLE" => row.try_get::<Option<f64>, _>(idx)?.map(|v| v.to_string()),
        "DECIMAL" => row
            .try_get::<Option<BigDecimal>, _>(idx)?
            .map(|v| v.to_string()),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map(|v| v.to_string()),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)?
            .map(|v| v.to_string()),
        "DATETIME" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|v| v.to_string()),
        "TIMESTAMP" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(|v| v.to_rfc3339()),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
            .try_get::<Option<Vec<u8>>, _>(idx)?
            .map(|bytes| bytes.iter().map(|b| format!("{b:02x}")).collect()),
        _ => row.try_get::<Option<String>, _>(idx)?,
    };

    Ok(value)
}
