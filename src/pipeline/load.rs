//! Bulk loading into the warehouse
//!
//! A load is one transaction: truncate the target, then insert the batch
//! with multi-row `INSERT ... VALUES (...), (...)` statements. Either the
//! whole thing commits or the target keeps its previous contents.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use super::table::validate_identifier;
use crate::batch::{Batch, Row};
use crate::database::{DatabaseBackend, DatabaseError, PlaceholderStyle, Statement};
use crate::error::{PipelineError, PipelineResult};

/// How the target table is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Full refresh of a dimension table
    Replace,
    /// Window load of a fact table into its staging table
    Append,
}

impl std::fmt::Display for LoadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadMode::Replace => write!(f, "replace"),
            LoadMode::Append => write!(f, "append"),
        }
    }
}

/// Target and batching of one load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    pub target_schema: String,
    pub target_table: String,
    pub mode: LoadMode,
    /// Rows per insert statement; `None` sends everything in one statement
    pub chunk_size: Option<usize>,
}

impl LoadPlan {
    pub fn replace(target_schema: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            target_schema: target_schema.into(),
            target_table: target_table.into(),
            mode: LoadMode::Replace,
            chunk_size: None,
        }
    }

    pub fn append(target_schema: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            target_schema: target_schema.into(),
            target_table: target_table.into(),
            mode: LoadMode::Append,
            chunk_size: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: Option<usize>) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// `schema.table`, or just `table` when the schema is empty
    pub fn qualified_table(&self) -> String {
        if self.target_schema.is_empty() {
            self.target_table.clone()
        } else {
            format!("{}.{}", self.target_schema, self.target_table)
        }
    }

    fn validate(&self) -> PipelineResult<()> {
        if self.chunk_size == Some(0) {
            return Err(PipelineError::config(format!(
                "Chunk size for table '{}' must be greater than zero",
                self.target_table
            )));
        }
        if !self.target_schema.is_empty() && !validate_identifier(&self.target_schema) {
            return Err(PipelineError::config(format!(
                "Invalid target schema '{}'",
                self.target_schema
            )));
        }
        if !validate_identifier(&self.target_table) {
            return Err(PipelineError::config(format!(
                "Invalid table name '{}'",
                self.target_table
            )));
        }
        Ok(())
    }
}

/// Result of a committed load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Qualified target table
    pub table: String,
    pub mode: LoadMode,
    pub rows: usize,
    /// Insert statements sent, not counting the truncate
    pub statements: usize,
    pub chunk_size: Option<usize>,
}

/// Builder for multi-row insert statements into one table
pub struct MultiRowInsert<'a> {
    table: &'a str,
    columns: &'a [String],
    style: PlaceholderStyle,
}

impl<'a> MultiRowInsert<'a> {
    pub fn new(table: &'a str, columns: &'a [String], style: PlaceholderStyle) -> Self {
        Self {
            table,
            columns,
            style,
        }
    }

    /// One statement inserting all of `rows`
    ///
    /// Placeholder numbering starts over in every statement.
    pub fn statement(&self, rows: Vec<Row>) -> Statement {
        let width = self.columns.len();
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ",
            self.table,
            self.columns.join(", ")
        );

        let mut params = Vec::with_capacity(rows.len() * width);
        for (r, row) in rows.into_iter().enumerate() {
            if r > 0 {
                sql.push_str(", ");
            }
            let markers: Vec<String> = (0..width)
                .map(|c| self.style.marker(r * width + c))
                .collect();
            sql.push('(');
            sql.push_str(&markers.join(", "));
            sql.push(')');
            params.extend(row);
        }

        Statement::with_params(sql, params)
    }

    /// Statements covering `rows`, `chunk_size` rows at a time
    ///
    /// Produces `ceil(rows / chunk_size)` statements, one when unchunked and
    /// none for no rows.
    pub fn statements(&self, rows: Vec<Row>, chunk_size: Option<usize>) -> Vec<Statement> {
        if rows.is_empty() {
            return Vec::new();
        }
        let chunk = chunk_size.filter(|c| *c > 0).unwrap_or(rows.len());

        let mut statements = Vec::with_capacity(rows.len().div_ceil(chunk));
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let part: Vec<Row> = rows.by_ref().take(chunk).collect();
            statements.push(self.statement(part));
        }
        statements
    }
}

/// Build the insert statements for loading `batch` into `table`
pub fn build_insert_statements(
    table: &str,
    batch: Batch,
    chunk_size: Option<usize>,
    style: PlaceholderStyle,
) -> Result<Vec<Statement>, DatabaseError> {
    if let Some(column) = batch.columns.iter().find(|c| !validate_identifier(c)) {
        return Err(DatabaseError::InvalidInput(format!(
            "Column name '{}' is not a plain identifier",
            column
        )));
    }
    if batch.columns.is_empty() && !batch.is_empty() {
        return Err(DatabaseError::InvalidInput(
            "Batch has rows but no columns".to_string(),
        ));
    }
    let width = batch.column_count();
    if let Some(position) = batch.rows.iter().position(|row| row.len() != width) {
        return Err(DatabaseError::InvalidInput(format!(
            "Row {} has {} values, expected {}",
            position + 1,
            batch.rows[position].len(),
            width
        )));
    }

    let Batch { columns, rows } = batch;
    Ok(MultiRowInsert::new(table, &columns, style).statements(rows, chunk_size))
}

/// Replace the contents of the plan's target table with `batch`
///
/// Truncate and inserts share one transaction. An empty batch still commits
/// the truncate.
pub async fn load(
    batch: Batch,
    warehouse: &dyn DatabaseBackend,
    plan: &LoadPlan,
) -> PipelineResult<LoadReport> {
    plan.validate()?;

    let table = plan.qualified_table();
    let rows = batch.row_count();
    let load_err = |source| PipelineError::Load {
        table: plan.target_table.clone(),
        source,
    };

    let inserts = build_insert_statements(
        &table,
        batch,
        plan.chunk_size,
        warehouse.placeholder_style(),
    )
    .map_err(load_err)?;
    let statement_count = inserts.len();

    let mut statements = Vec::with_capacity(statement_count + 1);
    statements.push(Statement::new(format!("TRUNCATE TABLE {}", table)));
    statements.extend(inserts);

    debug!(table = %table, statements = statements.len(), "Beginning load transaction");
    let started = Instant::now();

    if let Err(e) = warehouse.execute_transaction(statements).await {
        info!(
            table = %table,
            rows,
            status = "rolled_back",
            chunk_size = ?plan.chunk_size,
            statements = statement_count,
            "Load failed"
        );
        return Err(load_err(e));
    }

    info!(
        table = %table,
        rows,
        status = "committed",
        mode = %plan.mode,
        chunk_size = ?plan.chunk_size,
        statements = statement_count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Loaded"
    );

    Ok(LoadReport {
        table,
        mode: plan.mode,
        rows,
        statements: statement_count,
        chunk_size: plan.chunk_size,
    })
}
