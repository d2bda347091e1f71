//! Warehouse bootstrap from a DDL file

use std::path::Path;

use tracing::{debug, info};

use crate::database::{DatabaseBackend, Statement};
use crate::error::{PipelineError, PipelineResult};

/// Split a SQL script on `;`, dropping blank and comment-only pieces
pub fn split_statements(script: &str) -> Vec<String> {
    script
        .split(';')
        .map(str::trim)
        .filter(|stmt| {
            stmt.lines()
                .map(str::trim)
                .any(|line| !line.is_empty() && !line.starts_with("--"))
        })
        .map(str::to_string)
        .collect()
}

/// Run every statement of the DDL file at `path` in one transaction
///
/// # Returns
/// Number of statements executed
pub async fn bootstrap(warehouse: &dyn DatabaseBackend, path: &Path) -> PipelineResult<usize> {
    if !path.is_file() {
        return Err(PipelineError::config(format!(
            "DDL file not found: {}",
            path.display()
        )));
    }

    let script = tokio::fs::read_to_string(path).await.map_err(|e| {
        PipelineError::config(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let statements: Vec<Statement> = split_statements(&script)
        .into_iter()
        .inspect(|sql| debug!(sql = %sql, "Bootstrap statement"))
        .map(Statement::new)
        .collect();
    let count = statements.len();

    warehouse
        .execute_transaction(statements)
        .await
        .map_err(|source| PipelineError::Load {
            table: path.display().to_string(),
            source,
        })?;

    info!(file = %path.display(), statements = count, "Warehouse bootstrapped");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements() {
        let script = "CREATE SCHEMA IF NOT EXISTS landing;\n\n\
                      -- dimension tables\n\
                      CREATE TABLE landing.products (id INT);\n\
                      ;\n\
                      -- trailing comment";
        let statements = split_statements(script);
        assert_eq!(
            statements,
            vec![
                "CREATE SCHEMA IF NOT EXISTS landing",
                "-- dimension tables\nCREATE TABLE landing.products (id INT)",
            ]
        );
    }

    #[cfg(feature = "duckdb-backend")]
    #[tokio::test]
    async fn test_bootstrap_duckdb() {
        use crate::database::DuckDBBackend;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let ddl = dir.path().join("create_tables.sql");
        std::fs::write(
            &ddl,
            "CREATE SCHEMA IF NOT EXISTS landing;\nCREATE TABLE landing.products (id INTEGER);\n",
        )
        .unwrap();

        let db = DuckDBBackend::in_memory().unwrap();
        assert_eq!(bootstrap(&db, &ddl).await.unwrap(), 2);
        assert!(db.query("SELECT * FROM landing.products").await.is_ok());
    }

    #[cfg(feature = "duckdb-backend")]
    #[tokio::test]
    async fn test_missing_file_is_config_error() {
        use crate::database::DuckDBBackend;

        let db = DuckDBBackend::in_memory().unwrap();
        let err = bootstrap(&db, Path::new("/nonexistent/ddl.sql"))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
