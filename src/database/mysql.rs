//! MySQL database backend implementation
//!
//! Source-side backend for operational MySQL and MariaDB servers, pooled
//! via mysql_async. Queries go through the binary protocol so cells arrive
//! typed rather than as text.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, TxOpts};
use std::time::Duration;
use tracing::{debug, warn};

use super::config::{ConnectionParams, PoolSettings};
use super::{DatabaseBackend, DatabaseError, DatabaseResult, PlaceholderStyle, Statement};
use crate::batch::{Batch, Value};

/// Default MySQL server port
pub const DEFAULT_PORT: u16 = 3306;

/// Character set number the server reports for binary strings
const BINARY_CHARSET: u16 = 63;

/// MySQL database backend
pub struct MySqlBackend {
    /// Connection pool
    pool: Pool,
    /// host:port/database, for log lines
    identity: String,
    acquire_timeout: Duration,
    /// Ping pooled connections before use
    pre_ping: bool,
}

impl MySqlBackend {
    /// Create a new pooled MySQL backend
    ///
    /// No connection is made until the first acquisition. Connections older
    /// than the pool's recycle age are closed instead of reused.
    pub fn from_params(params: &ConnectionParams, settings: &PoolSettings) -> DatabaseResult<Self> {
        let host = required(&params.host, "host")?;
        let dbname = required(&params.database, "database")?;
        let user = required(&params.login, "login")?;

        let max = settings.max_size();
        let constraints = PoolConstraints::new(settings.max_persistent.min(max), max)
            .ok_or_else(|| DatabaseError::ConfigError(format!("Invalid MySQL pool size {}", max)))?;
        let pool_opts = PoolOpts::default()
            .with_constraints(constraints)
            .with_abs_conn_ttl(Some(settings.recycle_age()));

        let opts = OptsBuilder::default()
            .ip_or_hostname(host)
            .tcp_port(params.port.unwrap_or(DEFAULT_PORT))
            .user(Some(user))
            .pass(params.password.clone())
            .db_name(Some(dbname))
            .pool_opts(pool_opts);

        Ok(Self {
            pool: Pool::new(Opts::from(opts)),
            identity: params.identity(),
            acquire_timeout: settings.acquire_timeout(),
            pre_ping: settings.pre_ping,
        })
    }

    /// Get a pooled connection within the acquire timeout
    async fn acquire(&self) -> DatabaseResult<Conn> {
        let get = async {
            let mut conn = self.pool.get_conn().await?;
            if self.pre_ping && conn.ping().await.is_err() {
                warn!(server = %self.identity, "Pooled connection failed ping, reconnecting");
                conn = self.pool.get_conn().await?;
            }
            Ok::<Conn, mysql_async::Error>(conn)
        };

        match tokio::time::timeout(self.acquire_timeout, get).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to MySQL at {}: {}",
                self.identity, e
            ))),
            Err(_) => Err(DatabaseError::PoolTimeout(self.acquire_timeout.as_secs())),
        }
    }

    /// Convert one binary-protocol cell according to its column metadata
    fn cell(column_type: ColumnType, charset: u16, value: &mysql_async::Value) -> Value {
        use mysql_async::Value as My;

        match value {
            My::NULL => Value::Null,
            My::Int(i) => Value::Int(*i),
            My::UInt(u) => i64::try_from(*u)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Text(u.to_string())),
            My::Float(f) => Value::Float(f64::from(*f)),
            My::Double(f) => Value::Float(*f),
            My::Bytes(bytes) => {
                if charset == BINARY_CHARSET && !is_textual(column_type) {
                    Value::Bytes(bytes.clone())
                } else {
                    Value::Text(String::from_utf8_lossy(bytes).into_owned())
                }
            }
            My::Date(year, month, day, hour, minute, second, micros) => {
                // Zero dates ("0000-00-00") have no calendar equivalent
                let Some(date) =
                    NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))
                else {
                    return Value::Null;
                };
                if matches!(
                    column_type,
                    ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE
                ) {
                    Value::Date(date)
                } else {
                    date.and_hms_micro_opt(
                        u32::from(*hour),
                        u32::from(*minute),
                        u32::from(*second),
                        *micros,
                    )
                    .map(Value::Timestamp)
                    .unwrap_or(Value::Null)
                }
            }
            My::Time(negative, days, hour, minute, second, micros) => {
                if !*negative && *days == 0 {
                    NaiveTime::from_hms_micro_opt(
                        u32::from(*hour),
                        u32::from(*minute),
                        u32::from(*second),
                        *micros,
                    )
                    .map(Value::Time)
                    .unwrap_or(Value::Null)
                } else {
                    // Elapsed time beyond one day, e.g. "-30:15:00.000000"
                    Value::Text(format!(
                        "{}{:02}:{:02}:{:02}.{:06}",
                        if *negative { "-" } else { "" },
                        u64::from(*days) * 24 + u64::from(*hour),
                        minute,
                        second,
                        micros
                    ))
                }
            }
        }
    }

    /// Convert a cell value into a bind parameter
    fn to_mysql_value(value: Value) -> mysql_async::Value {
        use mysql_async::Value as My;

        match value {
            Value::Null => My::NULL,
            Value::Bool(b) => My::Int(i64::from(b)),
            Value::Int(i) => My::Int(i),
            Value::Float(f) => My::Double(f),
            Value::Text(s) => My::Bytes(s.into_bytes()),
            Value::Bytes(b) => My::Bytes(b),
            Value::Date(d) => My::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
            Value::Time(t) => My::Time(
                false,
                0,
                t.hour() as u8,
                t.minute() as u8,
                t.second() as u8,
                t.nanosecond() / 1_000,
            ),
            Value::Timestamp(ts) => My::Date(
                ts.year() as u16,
                ts.month() as u8,
                ts.day() as u8,
                ts.hour() as u8,
                ts.minute() as u8,
                ts.second() as u8,
                ts.nanosecond() / 1_000,
            ),
        }
    }
}

fn required(value: &Option<String>, field: &str) -> DatabaseResult<String> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| DatabaseError::ConfigError(format!("MySQL connection requires '{}'", field)))
}

/// Column types reported with the binary charset that still carry text
fn is_textual(column_type: ColumnType) -> bool {
    matches!(
        column_type,
        ColumnType::MYSQL_TYPE_DECIMAL
            | ColumnType::MYSQL_TYPE_NEWDECIMAL
            | ColumnType::MYSQL_TYPE_JSON
            | ColumnType::MYSQL_TYPE_ENUM
            | ColumnType::MYSQL_TYPE_SET
    )
}

#[async_trait(?Send)]
impl DatabaseBackend for MySqlBackend {
    async fn query(&self, sql: &str) -> DatabaseResult<Batch> {
        let mut conn = self.acquire().await?;

        let mut result = conn
            .exec_iter(sql, ())
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;
        let meta = result.columns().map(|c| c.to_vec()).unwrap_or_default();
        let rows: Vec<mysql_async::Row> = result
            .collect()
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?;

        let columns: Vec<String> = meta.iter().map(|c| c.name_str().into_owned()).collect();
        let batch_rows = rows
            .iter()
            .map(|row| {
                meta.iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        row.as_ref(idx)
                            .map(|v| Self::cell(column.column_type(), column.character_set(), v))
                            .unwrap_or(Value::Null)
                    })
                    .collect()
            })
            .collect();

        Ok(Batch::new(columns, batch_rows))
    }

    async fn execute_batch(&self, sql: &str) -> DatabaseResult<()> {
        let mut conn = self.acquire().await?;

        conn.query_drop(sql)
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Batch execute failed: {}", e)))
    }

    async fn execute_transaction(&self, statements: Vec<Statement>) -> DatabaseResult<u64> {
        let mut conn = self.acquire().await?;

        let mut tx = conn
            .start_transaction(TxOpts::default())
            .await
            .map_err(|e| {
                DatabaseError::TransactionFailed(format!("Failed to begin transaction: {}", e))
            })?;

        let mut affected = 0u64;
        for (position, statement) in statements.into_iter().enumerate() {
            let params = if statement.params.is_empty() {
                Params::Empty
            } else {
                Params::Positional(
                    statement
                        .params
                        .into_iter()
                        .map(Self::to_mysql_value)
                        .collect(),
                )
            };

            debug!(statement = position + 1, "Executing statement");

            // Dropping `tx` on the error path rolls the transaction back
            tx.exec_drop(statement.sql.as_str(), params)
                .await
                .map_err(|e| {
                    DatabaseError::TransactionFailed(format!(
                        "Statement {} failed: {}",
                        position + 1,
                        e
                    ))
                })?;
            affected += tx.affected_rows();
        }

        tx.commit().await.map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(affected)
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        let mut conn = self.acquire().await?;
        let one: Option<i64> = conn
            .query_first("SELECT 1")
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Health check failed: {}", e)))?;
        Ok(one == Some(1))
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }

    fn backend_type(&self) -> &'static str {
        "mysql"
    }

    async fn close(&self) -> DatabaseResult<()> {
        self.pool
            .clone()
            .disconnect()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Failed to close pool: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysql_async::Value as My;

    const UTF8MB4: u16 = 255;

    #[tokio::test]
    async fn test_missing_login_is_config_error() {
        let params = ConnectionParams {
            backend: "mysql".to_string(),
            host: Some("db.internal".to_string()),
            database: Some("retail".to_string()),
            ..Default::default()
        };
        let result = MySqlBackend::from_params(&params, &PoolSettings::default());
        assert!(matches!(result, Err(DatabaseError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_pool_is_lazy() {
        let params = ConnectionParams::mysql("127.0.0.1", "retail", "etl", "secret");
        let backend = MySqlBackend::from_params(&params, &PoolSettings::default()).unwrap();
        assert_eq!(backend.backend_type(), "mysql");
        assert_eq!(backend.placeholder_style(), PlaceholderStyle::QuestionMark);
        assert_eq!(backend.identity, "127.0.0.1:3306/retail");
    }

    #[test]
    fn test_numeric_cells() {
        assert_eq!(
            MySqlBackend::cell(ColumnType::MYSQL_TYPE_LONG, BINARY_CHARSET, &My::Int(-4)),
            Value::Int(-4)
        );
        assert_eq!(
            MySqlBackend::cell(
                ColumnType::MYSQL_TYPE_LONGLONG,
                BINARY_CHARSET,
                &My::UInt(u64::MAX)
            ),
            Value::from(u64::MAX.to_string())
        );
        assert_eq!(
            MySqlBackend::cell(
                ColumnType::MYSQL_TYPE_NEWDECIMAL,
                BINARY_CHARSET,
                &My::Bytes(b"12.50".to_vec())
            ),
            Value::from("12.50")
        );
        assert!(MySqlBackend::cell(ColumnType::MYSQL_TYPE_LONG, BINARY_CHARSET, &My::NULL).is_null());
    }

    #[test]
    fn test_string_and_blob_cells() {
        assert_eq!(
            MySqlBackend::cell(
                ColumnType::MYSQL_TYPE_VAR_STRING,
                UTF8MB4,
                &My::Bytes(b"bolt".to_vec())
            ),
            Value::from("bolt")
        );
        assert_eq!(
            MySqlBackend::cell(
                ColumnType::MYSQL_TYPE_BLOB,
                BINARY_CHARSET,
                &My::Bytes(vec![0, 159])
            ),
            Value::Bytes(vec![0, 159])
        );
    }

    #[test]
    fn test_temporal_cells() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 29).unwrap();
        assert_eq!(
            MySqlBackend::cell(
                ColumnType::MYSQL_TYPE_DATE,
                BINARY_CHARSET,
                &My::Date(2025, 8, 29, 0, 0, 0, 0)
            ),
            Value::Date(date)
        );
        assert_eq!(
            MySqlBackend::cell(
                ColumnType::MYSQL_TYPE_DATETIME,
                BINARY_CHARSET,
                &My::Date(2025, 8, 29, 13, 5, 9, 250)
            ),
            Value::Timestamp(date.and_hms_micro_opt(13, 5, 9, 250).unwrap())
        );
        assert!(
            MySqlBackend::cell(
                ColumnType::MYSQL_TYPE_DATE,
                BINARY_CHARSET,
                &My::Date(0, 0, 0, 0, 0, 0, 0)
            )
            .is_null()
        );
        assert_eq!(
            MySqlBackend::cell(
                ColumnType::MYSQL_TYPE_TIME,
                BINARY_CHARSET,
                &My::Time(false, 0, 8, 30, 0, 0)
            ),
            Value::Time(NaiveTime::from_hms_opt(8, 30, 0).unwrap())
        );
        assert_eq!(
            MySqlBackend::cell(
                ColumnType::MYSQL_TYPE_TIME,
                BINARY_CHARSET,
                &My::Time(true, 1, 6, 15, 0, 0)
            ),
            Value::from("-30:15:00.000000")
        );
    }

    #[test]
    fn test_bind_values() {
        let ts = NaiveDate::from_ymd_opt(2025, 8, 29)
            .unwrap()
            .and_hms_opt(13, 5, 9)
            .unwrap();
        assert_eq!(
            MySqlBackend::to_mysql_value(Value::Timestamp(ts)),
            My::Date(2025, 8, 29, 13, 5, 9, 0)
        );
        assert_eq!(MySqlBackend::to_mysql_value(Value::Bool(true)), My::Int(1));
        assert_eq!(
            MySqlBackend::to_mysql_value(Value::from("nut")),
            My::Bytes(b"nut".to_vec())
        );
        assert_eq!(MySqlBackend::to_mysql_value(Value::Null), My::NULL);
    }
}
