//! Database backend abstraction for extraction and loading
//!
//! This module provides the handle type the pipeline talks to:
//! - DuckDB: Embedded database, usable as source or warehouse (and in tests)
//! - PostgreSQL: Pooled server connections via deadpool-postgres
//! - MySQL: Pooled source connections via mysql_async
//!
//! Backends only know how to run a query into a [`Batch`] and how to run a
//! list of parameterized statements inside one transaction. Everything that
//! decides *which* statements to run lives in [`crate::pipeline`].

use async_trait::async_trait;

use crate::batch::{Batch, Value};

// Re-export implementations based on features
#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "postgres-backend")]
pub mod postgres;

#[cfg(feature = "mysql-backend")]
pub mod mysql;

pub mod config;
pub mod provider;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDBBackend;

#[cfg(feature = "postgres-backend")]
pub use self::postgres::PostgresBackend;

#[cfg(feature = "mysql-backend")]
pub use self::mysql::MySqlBackend;

pub use config::{BackendType, ConnectionParams, PoolSettings};
pub use provider::{ConnectionRole, Handle, open};

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Timed out waiting for a pooled connection
    #[error("Timed out after {0}s waiting for a pooled connection")]
    PoolTimeout(u64),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed (and was rolled back)
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// A column type the backend cannot convert into a cell value
    #[error("Unsupported column type {data_type} for column {column}")]
    UnsupportedType { column: String, data_type: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Bind parameter marker syntax of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` for every parameter (DuckDB, Snowflake, MySQL)
    QuestionMark,
    /// `$1`, `$2`, ... numbered from 1 per statement (PostgreSQL)
    Numbered,
}

impl PlaceholderStyle {
    /// Marker for the parameter at zero-based `index`
    pub fn marker(&self, index: usize) -> String {
        match self {
            PlaceholderStyle::QuestionMark => "?".to_string(),
            PlaceholderStyle::Numbered => format!("${}", index + 1),
        }
    }
}

/// A SQL statement with its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with placeholders
    pub sql: String,
    /// Parameter values, in placeholder order
    pub params: Vec<Value>,
}

impl Statement {
    /// A statement without parameters
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A statement with parameters
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Database backend trait
///
/// A backend is a pooled handle onto one database. It is reused for many
/// sequential calls within a pipeline run.
#[async_trait(?Send)]
pub trait DatabaseBackend: Send + Sync {
    /// Execute a SQL query and materialize its result set
    ///
    /// # Arguments
    /// * `sql` - SQL query to execute
    ///
    /// # Returns
    /// Batch with the result columns and rows
    async fn query(&self, sql: &str) -> DatabaseResult<Batch>;

    /// Execute one or more `;`-separated statements without parameters
    async fn execute_batch(&self, sql: &str) -> DatabaseResult<()>;

    /// Execute statements in order inside a single transaction
    ///
    /// Either every statement commits or none does: on the first failure
    /// the transaction is rolled back and the error returned.
    ///
    /// # Returns
    /// Total number of rows affected
    async fn execute_transaction(&self, statements: Vec<Statement>) -> DatabaseResult<u64>;

    /// Check if database is healthy and accessible
    async fn health_check(&self) -> DatabaseResult<bool>;

    /// Bind parameter syntax for statements sent to this backend
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Get the database backend type name ("duckdb", "postgres" or "mysql")
    fn backend_type(&self) -> &'static str;

    /// Close the database connection
    async fn close(&self) -> DatabaseResult<()>;
}

/// Output format for rendered batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Format a batch for display
pub fn format_batch(batch: &Batch, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_as_json(batch),
        OutputFormat::Csv => format_as_csv(batch),
        OutputFormat::Table => format_as_table(batch),
    }
}

fn format_as_json(batch: &Batch) -> String {
    let rows: Vec<serde_json::Value> = batch
        .rows
        .iter()
        .map(|row| {
            let map: serde_json::Map<String, serde_json::Value> = batch
                .columns
                .iter()
                .zip(row)
                .map(|(col, value)| {
                    let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                    (col.clone(), json)
                })
                .collect();
            serde_json::Value::Object(map)
        })
        .collect();

    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

fn format_as_csv(batch: &Batch) -> String {
    let mut output = String::new();

    // Header row
    output.push_str(&batch.columns.join(","));
    output.push('\n');

    for row in &batch.rows {
        let values: Vec<String> = row
            .iter()
            .map(|value| match value {
                Value::Null => String::new(),
                Value::Text(s) => {
                    if s.contains(',') || s.contains('"') || s.contains('\n') {
                        format!("\"{}\"", s.replace('"', "\"\""))
                    } else {
                        s.clone()
                    }
                }
                other => other.render(),
            })
            .collect();
        output.push_str(&values.join(","));
        output.push('\n');
    }

    output
}

fn format_as_table(batch: &Batch) -> String {
    if batch.is_empty() {
        return "(0 rows)".to_string();
    }

    let rendered: Vec<Vec<String>> = batch
        .rows
        .iter()
        .map(|row| row.iter().map(Value::render).collect())
        .collect();

    // Calculate column widths
    let mut widths: Vec<usize> = batch.columns.iter().map(|c| c.len()).collect();
    for row in &rendered {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.len());
            }
        }
    }

    let mut output = String::new();

    let header: Vec<String> = batch
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
        .collect();
    output.push_str(&header.join(" | "));
    output.push('\n');

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&separator.join("-+-"));
    output.push('\n');

    for row in &rendered {
        let values: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:width$}", cell, width = widths.get(i).copied().unwrap_or(0)))
            .collect();
        output.push_str(&values.join(" | "));
        output.push('\n');
    }

    output.push_str(&format!("({} rows)", batch.row_count()));

    output
}
