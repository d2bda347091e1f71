//! PostgreSQL database backend implementation
//!
//! Provides a PostgreSQL backend for either side of the pipeline.
//! Uses connection pooling via deadpool-postgres.

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::{
    Config, ManagerConfig, Object, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use std::time::Duration;
use tokio_postgres::NoTls;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};
use tracing::debug;

use super::config::{ConnectionParams, PoolSettings};
use super::{DatabaseBackend, DatabaseError, DatabaseResult, PlaceholderStyle, Statement};
use crate::batch::{Batch, Value};

/// Largest number of bind parameters PostgreSQL accepts in one statement
pub const MAX_BIND_PARAMS: usize = 65_535;

type SqlError = Box<dyn std::error::Error + Sync + Send>;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// PostgreSQL database backend
pub struct PostgresBackend {
    /// Connection pool
    pool: Pool,
    /// host:port/database, for log lines
    identity: String,
    /// Connections older than this are evicted before acquisition
    recycle_age: Duration,
    /// Pool wait timeout, reported on timeouts
    acquire_timeout: Duration,
}

impl PostgresBackend {
    /// Create a new pooled PostgreSQL backend
    ///
    /// # Arguments
    /// * `params` - Host, database, login and password of the server
    /// * `settings` - Pool sizing, timeouts and liveness checking
    ///
    /// # Returns
    /// A new PostgreSQL backend instance. No connection is made until the
    /// first acquisition.
    pub async fn from_params(
        params: &ConnectionParams,
        settings: &PoolSettings,
    ) -> DatabaseResult<Self> {
        let host = required(&params.host, "host")?;
        let dbname = required(&params.database, "database")?;
        let user = required(&params.login, "login")?;

        let mut cfg = Config::new();
        cfg.host = Some(host);
        cfg.port = params.port;
        cfg.dbname = Some(dbname);
        cfg.user = Some(user);
        cfg.password = params.password.clone();
        cfg.application_name = Some("landing-elt".to_string());
        if let Some(schema) = params.schema.as_deref().filter(|s| !s.is_empty()) {
            cfg.options = Some(format!("-c search_path={}", schema));
        }

        let mut manager = ManagerConfig::default();
        manager.recycling_method = if settings.pre_ping {
            RecyclingMethod::Verified
        } else {
            RecyclingMethod::Fast
        };
        cfg.manager = Some(manager);

        let mut timeouts = Timeouts::default();
        timeouts.wait = Some(settings.acquire_timeout());
        timeouts.create = Some(settings.acquire_timeout());
        timeouts.recycle = Some(settings.acquire_timeout());
        let mut pool_config = PoolConfig::new(settings.max_size());
        pool_config.timeouts = timeouts;
        cfg.pool = Some(pool_config);

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to create PostgreSQL pool: {}", e))
        })?;

        Ok(Self {
            pool,
            identity: params.identity(),
            recycle_age: settings.recycle_age(),
            acquire_timeout: settings.acquire_timeout(),
        })
    }

    /// Get a pooled connection, replacing ones past their recycle age
    async fn acquire(&self) -> DatabaseResult<Object> {
        let max_age = self.recycle_age;
        let _ = self.pool.retain(|_, metrics| metrics.age() < max_age);

        self.pool.get().await.map_err(|e| match e {
            PoolError::Timeout(_) => DatabaseError::PoolTimeout(self.acquire_timeout.as_secs()),
            other => DatabaseError::ConnectionFailed(format!(
                "Failed to connect to PostgreSQL at {}: {}",
                self.identity, other
            )),
        })
    }

    /// Read one cell according to its column type
    fn cell(row: &tokio_postgres::Row, idx: usize) -> DatabaseResult<Value> {
        let column = &row.columns()[idx];
        let ty = column.type_();
        let read_err = |e: tokio_postgres::Error| {
            DatabaseError::QueryFailed(format!("Failed to read column {}: {}", column.name(), e))
        };

        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx).map_err(read_err)?.into()
        } else if *ty == Type::INT2 {
            Value::from(row.try_get::<_, Option<i16>>(idx).map_err(read_err)?.map(i64::from))
        } else if *ty == Type::INT4 {
            Value::from(row.try_get::<_, Option<i32>>(idx).map_err(read_err)?.map(i64::from))
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx).map_err(read_err)?.into()
        } else if *ty == Type::OID {
            Value::from(row.try_get::<_, Option<u32>>(idx).map_err(read_err)?.map(i64::from))
        } else if *ty == Type::FLOAT4 {
            Value::from(row.try_get::<_, Option<f32>>(idx).map_err(read_err)?.map(f64::from))
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx).map_err(read_err)?.into()
        } else if is_text(ty) {
            row.try_get::<_, Option<String>>(idx).map_err(read_err)?.into()
        } else if *ty == Type::DATE {
            row.try_get::<_, Option<NaiveDate>>(idx).map_err(read_err)?.into()
        } else if *ty == Type::TIMESTAMP {
            row.try_get::<_, Option<NaiveDateTime>>(idx)
                .map_err(read_err)?
                .map(Value::Timestamp)
                .unwrap_or(Value::Null)
        } else if *ty == Type::TIMESTAMPTZ {
            row.try_get::<_, Option<DateTime<Utc>>>(idx)
                .map_err(read_err)?
                .map(|ts| Value::Timestamp(ts.naive_utc()))
                .unwrap_or(Value::Null)
        } else if *ty == Type::TIME {
            row.try_get::<_, Option<NaiveTime>>(idx).map_err(read_err)?.into()
        } else if *ty == Type::BYTEA {
            row.try_get::<_, Option<Vec<u8>>>(idx)
                .map_err(read_err)?
                .map(Value::Bytes)
                .unwrap_or(Value::Null)
        } else if *ty == Type::NUMERIC {
            row.try_get::<_, Option<NumericText>>(idx)
                .map_err(read_err)?
                .map(|n| n.0)
                .into()
        } else if *ty == Type::INTERVAL {
            row.try_get::<_, Option<IntervalText>>(idx)
                .map_err(read_err)?
                .map(|i| i.0)
                .into()
        } else if *ty == Type::UUID {
            row.try_get::<_, Option<uuid::Uuid>>(idx)
                .map_err(read_err)?
                .map(|u| u.to_string())
                .into()
        } else if *ty == Type::JSON || *ty == Type::JSONB {
            row.try_get::<_, Option<serde_json::Value>>(idx)
                .map_err(read_err)?
                .map(|j| j.to_string())
                .into()
        } else if matches!(ty.kind(), Kind::Enum(_)) {
            row.try_get::<_, Option<EnumLabel>>(idx)
                .map_err(read_err)?
                .map(|l| l.0)
                .into()
        } else {
            // Arrays, composites and ranges need an explicit ::text cast in the query
            return Err(DatabaseError::UnsupportedType {
                column: column.name().to_string(),
                data_type: ty.name().to_string(),
            });
        };

        Ok(value)
    }
}

fn required(value: &Option<String>, field: &str) -> DatabaseResult<String> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            DatabaseError::ConfigError(format!("PostgreSQL connection requires '{}'", field))
        })
}

fn is_text(ty: &Type) -> bool {
    *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
}

/// NUMERIC cell rendered as its decimal text
struct NumericText(String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, SqlError> {
        decode_numeric(raw).map(NumericText)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// INTERVAL cell rendered as `<m> months <d> days <us> microseconds`
struct IntervalText(String);

impl<'a> FromSql<'a> for IntervalText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, SqlError> {
        let raw: [u8; 16] = raw
            .try_into()
            .map_err(|_| format!("invalid INTERVAL length {}", raw.len()))?;
        let micros = i64::from_be_bytes([
            raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
        ]);
        let days = i32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);
        let months = i32::from_be_bytes([raw[12], raw[13], raw[14], raw[15]]);
        Ok(IntervalText(format!(
            "{} months {} days {} microseconds",
            months, days, micros
        )))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

/// Label of a user-defined enum; enums travel as plain text
struct EnumLabel(String);

impl<'a> FromSql<'a> for EnumLabel {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, SqlError> {
        Ok(EnumLabel(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
    }
}

fn read_u16(raw: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([raw[at], raw[at + 1]])
}

/// Decode the binary NUMERIC format: a header of digit count, weight, sign
/// and display scale, followed by base-10000 digits
fn decode_numeric(raw: &[u8]) -> Result<String, SqlError> {
    if raw.len() < 8 {
        return Err(format!("invalid NUMERIC length {}", raw.len()).into());
    }
    let ndigits = usize::from(read_u16(raw, 0));
    let weight = read_u16(raw, 2) as i16;
    let sign = read_u16(raw, 4);
    let dscale = usize::from(read_u16(raw, 6));

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid NUMERIC sign {:#06x}", other).into()),
    }
    if raw.len() != 8 + 2 * ndigits {
        return Err(format!("NUMERIC with {} digits has {} bytes", ndigits, raw.len()).into());
    }
    let digits: Vec<u16> = (0..ndigits).map(|i| read_u16(raw, 8 + 2 * i)).collect();
    let digit = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=i32::from(weight) {
            if i == 0 {
                out.push_str(&digit(i).to_string());
            } else {
                out.push_str(&format!("{:04}", digit(i)));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = i32::from(weight) + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}

/// Encode decimal text in the binary NUMERIC format
fn encode_numeric(text: &str, out: &mut BytesMut) -> Result<(), SqlError> {
    let text = text.trim();
    let special = match text {
        "NaN" => Some(NUMERIC_NAN),
        "Infinity" | "inf" => Some(NUMERIC_PINF),
        "-Infinity" | "-inf" => Some(NUMERIC_NINF),
        _ => None,
    };
    if let Some(sign) = special {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(sign);
        out.put_u16(0);
        return Ok(());
    }

    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit())
    {
        return Err(format!("'{}' is not a decimal number", text).into());
    }
    let int_part = int_part.trim_start_matches('0');
    let dscale = u16::try_from(frac_part.len())?;

    // Align both sides on base-10000 digit boundaries around the point
    let int_digits = format!("{}{}", "0".repeat((4 - int_part.len() % 4) % 4), int_part);
    let frac_digits = format!("{}{}", frac_part, "0".repeat((4 - frac_part.len() % 4) % 4));
    let mut weight = i16::try_from(int_digits.len() / 4)? - 1;
    let mut groups = int_digits
        .as_bytes()
        .chunks(4)
        .chain(frac_digits.as_bytes().chunks(4))
        .map(|chunk| {
            chunk
                .iter()
                .fold(0i16, |acc, b| acc * 10 + i16::from(b - b'0'))
        })
        .collect::<Vec<i16>>();

    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups = groups.split_off(leading);
    weight -= i16::try_from(leading)?;
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }
    let sign = if negative && !groups.is_empty() {
        NUMERIC_NEG
    } else {
        NUMERIC_POS
    };

    out.put_i16(i16::try_from(groups.len())?);
    out.put_i16(weight);
    out.put_u16(sign);
    out.put_u16(dscale);
    for group in groups {
        out.put_i16(group);
    }
    Ok(())
}

/// Encode `<n> months <n> days <n> microseconds` text in the binary INTERVAL format
fn encode_interval(text: &str, out: &mut BytesMut) -> Result<(), SqlError> {
    let (mut months, mut days, mut micros) = (0i32, 0i32, 0i64);
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.is_empty() || parts.len() % 2 != 0 {
        return Err(format!("'{}' is not an interval", text).into());
    }
    for pair in parts.chunks(2) {
        match pair[1].trim_end_matches('s') {
            "month" | "mon" => months = pair[0].parse()?,
            "day" => days = pair[0].parse()?,
            "microsecond" | "u" => micros = pair[0].parse()?,
            unit => return Err(format!("unknown interval unit '{}'", unit).into()),
        }
    }
    out.put_i64(micros);
    out.put_i32(days);
    out.put_i32(months);
    Ok(())
}

/// Bind text into a column whose binary format is not text
fn text_to_sql(text: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, SqlError> {
    if *ty == Type::NUMERIC {
        encode_numeric(text, out)?;
        Ok(IsNull::No)
    } else if *ty == Type::INTERVAL {
        encode_interval(text, out)?;
        Ok(IsNull::No)
    } else if *ty == Type::UUID {
        uuid::Uuid::parse_str(text)?.to_sql(ty, out)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        serde_json::from_str::<serde_json::Value>(text)?.to_sql(ty, out)
    } else if *ty == Type::TIME {
        text.parse::<NaiveTime>()?.to_sql(ty, out)
    } else {
        text.to_sql(ty, out)
    }
}

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => {
                if *ty == Type::INT2 {
                    i16::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*i as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*i as f64).to_sql(ty, out)
                } else if is_text(ty) || *ty == Type::NUMERIC {
                    text_to_sql(&i.to_string(), ty, out)
                } else {
                    i.to_sql(ty, out)
                }
            }
            Value::Float(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else if is_text(ty) || *ty == Type::NUMERIC {
                    text_to_sql(&f.to_string(), ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            Value::Text(s) => text_to_sql(s, ty, out),
            Value::Bytes(b) => b.to_sql(ty, out),
            Value::Date(d) => d.to_sql(ty, out),
            Value::Time(t) => t.to_sql(ty, out),
            Value::Timestamp(ts) => {
                if *ty == Type::TIMESTAMPTZ {
                    ts.and_utc().to_sql(ty, out)
                } else {
                    ts.to_sql(ty, out)
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[async_trait(?Send)]
impl DatabaseBackend for PostgresBackend {
    async fn query(&self, sql: &str) -> DatabaseResult<Batch> {
        let client = self.acquire().await?;

        let statement = client
            .prepare(sql)
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let rows = client
            .query(&statement, &[])
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

        let mut batch_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let values = (0..columns.len())
                .map(|idx| Self::cell(row, idx))
                .collect::<DatabaseResult<Vec<Value>>>()?;
            batch_rows.push(values);
        }

        Ok(Batch::new(columns, batch_rows))
    }

    async fn execute_batch(&self, sql: &str) -> DatabaseResult<()> {
        let client = self.acquire().await?;

        client
            .batch_execute(sql)
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Batch execute failed: {}", e)))
    }

    async fn execute_transaction(&self, statements: Vec<Statement>) -> DatabaseResult<u64> {
        if let Some(position) = statements
            .iter()
            .position(|s| s.params.len() > MAX_BIND_PARAMS)
        {
            return Err(DatabaseError::TransactionFailed(format!(
                "Statement {} binds {} parameters, more than the PostgreSQL limit of {}; use a smaller chunk size",
                position + 1,
                statements[position].params.len(),
                MAX_BIND_PARAMS
            )));
        }

        let mut client = self.acquire().await?;

        let tx = client.transaction().await.map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to begin transaction: {}", e))
        })?;

        let mut affected = 0u64;
        for (position, statement) in statements.iter().enumerate() {
            let params: Vec<&(dyn ToSql + Sync)> = statement
                .params
                .iter()
                .map(|v| v as &(dyn ToSql + Sync))
                .collect();

            debug!(
                statement = position + 1,
                params = params.len(),
                "Executing statement"
            );

            // Dropping `tx` on the error path rolls the transaction back
            affected += tx
                .execute(statement.sql.as_str(), &params)
                .await
                .map_err(|e| {
                    DatabaseError::TransactionFailed(format!(
                        "Statement {} failed: {}",
                        position + 1,
                        e
                    ))
                })?;
        }

        tx.commit().await.map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(affected)
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        let client = self.acquire().await?;
        let row = client
            .query_one("SELECT 1::INT4", &[])
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Health check failed: {}", e)))?;
        let one: i32 = row
            .try_get(0)
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Health check failed: {}", e)))?;
        Ok(one == 1)
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Numbered
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn close(&self) -> DatabaseResult<()> {
        self.pool.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_host_is_config_error() {
        let params = ConnectionParams {
            backend: "postgres".to_string(),
            database: Some("retail".to_string()),
            login: Some("etl".to_string()),
            ..Default::default()
        };
        let result = PostgresBackend::from_params(&params, &PoolSettings::default()).await;
        assert!(matches!(result, Err(DatabaseError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_pool_is_lazy() {
        // Nothing listens here; building the pool must still succeed
        let params = ConnectionParams::postgres("127.0.0.1", "retail", "etl", "secret");
        let backend = PostgresBackend::from_params(&params, &PoolSettings::default())
            .await
            .unwrap();
        assert_eq!(backend.backend_type(), "postgres");
        assert_eq!(backend.placeholder_style(), PlaceholderStyle::Numbered);
        assert_eq!(backend.pool.status().max_size, 4);
    }

    #[test]
    fn test_null_binds_as_sql_null() {
        let mut out = BytesMut::new();
        let is_null = Value::Null.to_sql(&Type::INT4, &mut out).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn test_int_narrows_to_column_type() {
        let mut out = BytesMut::new();
        Value::Int(7).to_sql(&Type::INT4, &mut out).unwrap();
        assert_eq!(out.len(), 4);

        let mut out = BytesMut::new();
        Value::Int(7).to_sql(&Type::INT8, &mut out).unwrap();
        assert_eq!(out.len(), 8);

        let mut out = BytesMut::new();
        assert!(Value::Int(i64::MAX).to_sql(&Type::INT2, &mut out).is_err());
    }

    fn numeric_bytes(weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut out = BytesMut::new();
        out.put_i16(digits.len() as i16);
        out.put_i16(weight);
        out.put_u16(sign);
        out.put_u16(dscale);
        for d in digits {
            out.put_i16(*d);
        }
        out.to_vec()
    }

    #[test]
    fn test_decode_numeric() {
        // 12.50
        let raw = numeric_bytes(0, NUMERIC_POS, 2, &[12, 5000]);
        assert_eq!(decode_numeric(&raw).unwrap(), "12.50");

        // -123456789
        let raw = numeric_bytes(2, NUMERIC_NEG, 0, &[1, 2345, 6789]);
        assert_eq!(decode_numeric(&raw).unwrap(), "-123456789");

        // 10000, trailing zero digits are not sent
        let raw = numeric_bytes(1, NUMERIC_POS, 0, &[1]);
        assert_eq!(decode_numeric(&raw).unwrap(), "10000");

        // 0.00000012
        let raw = numeric_bytes(-2, NUMERIC_POS, 8, &[12]);
        assert_eq!(decode_numeric(&raw).unwrap(), "0.00000012");

        let raw = numeric_bytes(0, NUMERIC_POS, 0, &[]);
        assert_eq!(decode_numeric(&raw).unwrap(), "0");

        let raw = numeric_bytes(0, NUMERIC_NAN, 0, &[]);
        assert_eq!(decode_numeric(&raw).unwrap(), "NaN");

        assert!(decode_numeric(&[0, 1]).is_err());
    }

    #[test]
    fn test_encode_numeric_matches_server_layout() {
        let mut out = BytesMut::new();
        encode_numeric("12.50", &mut out).unwrap();
        assert_eq!(out.to_vec(), numeric_bytes(0, NUMERIC_POS, 2, &[12, 5000]));

        let mut out = BytesMut::new();
        encode_numeric("-0.0012", &mut out).unwrap();
        assert_eq!(out.to_vec(), numeric_bytes(-1, NUMERIC_NEG, 4, &[12]));

        let mut out = BytesMut::new();
        encode_numeric("10000", &mut out).unwrap();
        assert_eq!(out.to_vec(), numeric_bytes(1, NUMERIC_POS, 0, &[1]));

        let mut out = BytesMut::new();
        encode_numeric("0.00", &mut out).unwrap();
        assert_eq!(out.to_vec(), numeric_bytes(0, NUMERIC_POS, 2, &[]));

        let mut out = BytesMut::new();
        assert!(encode_numeric("12,5", &mut out).is_err());
    }

    #[test]
    fn test_numeric_text_survives_load() {
        for text in ["12.50", "-987654.321", "0.00000012", "42"] {
            let mut out = BytesMut::new();
            Value::from(text).to_sql(&Type::NUMERIC, &mut out).unwrap();
            assert_eq!(decode_numeric(&out).unwrap(), text);
        }
    }

    #[test]
    fn test_interval_text() {
        let mut out = BytesMut::new();
        out.put_i64(5_400_000_000);
        out.put_i32(2);
        out.put_i32(1);
        let decoded = IntervalText::from_sql(&Type::INTERVAL, &out).unwrap();
        assert_eq!(decoded.0, "1 months 2 days 5400000000 microseconds");

        let mut encoded = BytesMut::new();
        Value::from(decoded.0)
            .to_sql(&Type::INTERVAL, &mut encoded)
            .unwrap();
        assert_eq!(encoded, out);
    }

    #[test]
    fn test_text_binds_into_typed_columns() {
        let mut out = BytesMut::new();
        Value::from("67e55044-10b1-426f-9247-bb680e5fe0c8")
            .to_sql(&Type::UUID, &mut out)
            .unwrap();
        assert_eq!(out.len(), 16);

        let mut out = BytesMut::new();
        Value::from("08:30:00").to_sql(&Type::TIME, &mut out).unwrap();
        assert_eq!(out.len(), 8);

        let mut out = BytesMut::new();
        assert!(Value::from("not json").to_sql(&Type::JSONB, &mut out).is_err());
    }

    #[tokio::test]
    async fn test_oversized_statement_rejected_before_connecting() {
        let params = ConnectionParams::postgres("127.0.0.1", "retail", "etl", "secret");
        let backend = PostgresBackend::from_params(&params, &PoolSettings::default())
            .await
            .unwrap();
        let statement =
            Statement::with_params("INSERT INTO t VALUES ...", vec![Value::Null; MAX_BIND_PARAMS + 1]);
        let result = backend.execute_transaction(vec![statement]).await;
        assert!(matches!(result, Err(DatabaseError::TransactionFailed(_))));
    }
}
