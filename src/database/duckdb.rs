//! DuckDB database backend implementation
//!
//! Provides an embedded database backend usable as either side of the
//! pipeline. The connection sits behind an async mutex; waiting for it is
//! bounded by the pool's acquire timeout.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

use super::config::{ConnectionParams, PoolSettings};
use super::{DatabaseBackend, DatabaseError, DatabaseResult, PlaceholderStyle, Statement};
use crate::batch::{Batch, Value};

/// Path value that selects an in-memory database
pub const IN_MEMORY: &str = ":memory:";

/// Days from 0001-01-01 (CE day 1) to 1970-01-01
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

/// DuckDB database backend
pub struct DuckDBBackend {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection
    connection: Mutex<duckdb::Connection>,
    /// How long to wait for the connection before giving up
    acquire_timeout: Duration,
}

impl DuckDBBackend {
    /// Create a new DuckDB backend with a file-based database
    ///
    /// # Arguments
    /// * `db_path` - Path to the DuckDB database file
    ///
    /// # Returns
    /// A new DuckDB backend instance
    pub fn new(db_path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to open DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(connection),
            acquire_timeout: PoolSettings::default().acquire_timeout(),
        })
    }

    /// Create an in-memory DuckDB backend
    pub fn in_memory() -> DatabaseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(connection),
            acquire_timeout: PoolSettings::default().acquire_timeout(),
        })
    }

    /// Create a backend from connection parameters
    ///
    /// `params.database` holds the file path, or `:memory:`. An embedded
    /// database has no server to ping or recycle, so only the acquire
    /// timeout of `pool` applies.
    pub fn from_params(params: &ConnectionParams, pool: &PoolSettings) -> DatabaseResult<Self> {
        let path = params
            .database
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                DatabaseError::ConfigError(
                    "DuckDB connection requires 'database' (file path or :memory:)".to_string(),
                )
            })?;

        let backend = if path == IN_MEMORY {
            Self::in_memory()?
        } else {
            Self::new(path)?
        };

        Ok(backend.with_acquire_timeout(pool.acquire_timeout()))
    }

    /// Override how long callers wait for the connection
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if this is an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    async fn acquire(&self) -> DatabaseResult<MutexGuard<'_, duckdb::Connection>> {
        tokio::time::timeout(self.acquire_timeout, self.connection.lock())
            .await
            .map_err(|_| DatabaseError::PoolTimeout(self.acquire_timeout.as_secs()))
    }

    /// Convert a DuckDB ValueRef to a cell value
    ///
    /// ENUM labels and intervals become text DuckDB casts back on insert.
    /// Nested types (LIST, STRUCT, MAP and friends) are rejected.
    fn value_ref_to_value(column: &str, value: duckdb::types::ValueRef) -> DatabaseResult<Value> {
        use duckdb::types::{Value as Duck, ValueRef};

        let converted = match value {
            ValueRef::Null => Value::Null,
            ValueRef::Boolean(b) => Value::Bool(b),
            ValueRef::TinyInt(i) => Value::Int(i.into()),
            ValueRef::SmallInt(i) => Value::Int(i.into()),
            ValueRef::Int(i) => Value::Int(i.into()),
            ValueRef::BigInt(i) => Value::Int(i),
            ValueRef::HugeInt(i) => match i64::try_from(i) {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Text(i.to_string()),
            },
            ValueRef::UTinyInt(i) => Value::Int(i.into()),
            ValueRef::USmallInt(i) => Value::Int(i.into()),
            ValueRef::UInt(i) => Value::Int(i.into()),
            ValueRef::UBigInt(i) => match i64::try_from(i) {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Text(i.to_string()),
            },
            ValueRef::Float(f) => Value::Float(f.into()),
            ValueRef::Double(f) => Value::Float(f),
            ValueRef::Decimal(d) => Value::Text(d.to_string()),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
            ValueRef::Date32(days) => days
                .checked_add(UNIX_EPOCH_CE_DAYS)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .map(Value::Date)
                .unwrap_or(Value::Null),
            ValueRef::Time64(unit, raw) => time_from_micros(to_micros(unit, raw))
                .map(Value::Time)
                .ok_or_else(|| unsupported(column, &value))?,
            ValueRef::Timestamp(unit, raw) => DateTime::from_timestamp_micros(to_micros(unit, raw))
                .map(|ts| Value::Timestamp(ts.naive_utc()))
                .unwrap_or(Value::Null),
            ValueRef::Interval {
                months,
                days,
                nanos,
            } => Value::Text(format!(
                "{} months {} days {} microseconds",
                months,
                days,
                nanos / 1_000
            )),
            ValueRef::Enum(..) => match value.to_owned() {
                Duck::Enum(label) => Value::Text(label),
                _ => return Err(unsupported(column, &value)),
            },
            other => return Err(unsupported(column, &other)),
        };

        Ok(converted)
    }

    /// Convert a cell value into an owned DuckDB parameter
    fn to_duckdb_value(value: Value) -> duckdb::types::Value {
        use duckdb::types::{TimeUnit, Value as Duck};

        match value {
            Value::Null => Duck::Null,
            Value::Bool(b) => Duck::Boolean(b),
            Value::Int(i) => Duck::BigInt(i),
            Value::Float(f) => Duck::Double(f),
            Value::Text(s) => Duck::Text(s),
            Value::Bytes(b) => Duck::Blob(b),
            Value::Date(d) => Duck::Date32(d.num_days_from_ce() - UNIX_EPOCH_CE_DAYS),
            Value::Time(t) => Duck::Time64(
                TimeUnit::Microsecond,
                i64::from(t.num_seconds_from_midnight()) * 1_000_000
                    + i64::from(t.nanosecond() / 1_000),
            ),
            Value::Timestamp(ts) => {
                Duck::Timestamp(TimeUnit::Microsecond, ts.and_utc().timestamp_micros())
            }
        }
    }
}

fn unsupported(column: &str, value: &duckdb::types::ValueRef) -> DatabaseError {
    DatabaseError::UnsupportedType {
        column: column.to_string(),
        data_type: value.data_type().to_string(),
    }
}

/// Time of day from microseconds since midnight; `24:00:00` has no equivalent
fn time_from_micros(micros: i64) -> Option<NaiveTime> {
    let secs = u32::try_from(micros.div_euclid(1_000_000)).ok()?;
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
}

fn to_micros(unit: duckdb::types::TimeUnit, raw: i64) -> i64 {
    use duckdb::types::TimeUnit;

    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

#[async_trait(?Send)]
impl DatabaseBackend for DuckDBBackend {
    async fn query(&self, sql: &str) -> DatabaseResult<Batch> {
        let conn = self.acquire().await?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;

        // In DuckDB 1.4+, we need to execute the query first, then get columns
        let mut result_rows = stmt
            .query([])
            .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

        let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let columns: Vec<String> = (0..column_count)
            .map(|i| {
                result_rows
                    .as_ref()
                    .and_then(|r| r.column_name(i).ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("col{}", i))
            })
            .collect();

        let mut rows = Vec::new();
        while let Some(row) = result_rows
            .next()
            .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?
        {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value = row.get_ref(i).map_err(|e| {
                    DatabaseError::QueryFailed(format!("Failed to read column {}: {}", i, e))
                })?;
                values.push(Self::value_ref_to_value(&columns[i], value)?);
            }
            rows.push(values);
        }

        Ok(Batch::new(columns, rows))
    }

    async fn execute_batch(&self, sql: &str) -> DatabaseResult<()> {
        let conn = self.acquire().await?;

        conn.execute_batch(sql)
            .map_err(|e| DatabaseError::QueryFailed(format!("Batch execute failed: {}", e)))
    }

    async fn execute_transaction(&self, statements: Vec<Statement>) -> DatabaseResult<u64> {
        let mut conn = self.acquire().await?;

        let tx = conn.transaction().map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to begin transaction: {}", e))
        })?;

        let mut affected = 0u64;
        for (position, statement) in statements.into_iter().enumerate() {
            let params: Vec<duckdb::types::Value> = statement
                .params
                .into_iter()
                .map(Self::to_duckdb_value)
                .collect();

            // Dropping `tx` on the error path rolls the transaction back
            let count = tx
                .execute(&statement.sql, duckdb::params_from_iter(params))
                .map_err(|e| {
                    DatabaseError::TransactionFailed(format!(
                        "Statement {} failed: {}",
                        position + 1,
                        e
                    ))
                })?;
            affected += count as u64;
        }

        tx.commit().map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(affected)
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        let batch = self.query("SELECT 1 AS ok").await?;
        Ok(batch.row_count() == 1)
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }

    async fn close(&self) -> DatabaseResult<()> {
        // The connection is closed when the backend is dropped
        Ok(())
    }
}
