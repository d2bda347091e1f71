//! Extraction from the source database

use std::time::Instant;

use tracing::{debug, info};

use super::table::validate_identifier;
use crate::batch::Batch;
use crate::database::DatabaseBackend;
use crate::error::{PipelineError, PipelineResult};

/// Default extraction query for a table
pub fn default_query(table_name: &str) -> String {
    format!("SELECT * FROM {}", table_name)
}

/// Run the extraction query of `table_name` against `source`
///
/// Without a query the whole table is selected. The result is fully
/// materialized; nothing is retried.
pub async fn extract(
    table_name: &str,
    source: &dyn DatabaseBackend,
    query: Option<&str>,
) -> PipelineResult<Batch> {
    let sql = match query.map(str::trim).filter(|q| !q.is_empty()) {
        Some(query) => query.to_string(),
        None => {
            if !validate_identifier(table_name) {
                return Err(PipelineError::config(format!(
                    "Invalid table name '{}'",
                    table_name
                )));
            }
            default_query(table_name)
        }
    };

    debug!(table = table_name, sql = %sql, "Extracting");
    let started = Instant::now();

    let batch = source
        .query(&sql)
        .await
        .map_err(|source| PipelineError::Extract {
            table: table_name.to_string(),
            source,
        })?;

    info!(
        table = table_name,
        rows = batch.row_count(),
        columns = batch.column_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Extracted"
    );
    Ok(batch)
}
