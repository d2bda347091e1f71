//! Connection provider
//!
//! Builds pooled database handles for the source system and the warehouse
//! from [`ConnectionParams`], regardless of where those parameters came from.

use std::sync::Arc;

use tracing::info;

use super::config::{BackendType, ConnectionParams, PoolSettings};
use super::{DatabaseBackend, DatabaseError};
use crate::error::{PipelineError, PipelineResult};

/// Shared, pooled handle onto one database
pub type Handle = Arc<dyn DatabaseBackend>;

/// Which side of the pipeline a connection serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// Operational database data is extracted from
    Source,
    /// Analytical warehouse data is loaded into
    Warehouse,
}

impl std::fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionRole::Source => write!(f, "source"),
            ConnectionRole::Warehouse => write!(f, "warehouse"),
        }
    }
}

/// Open a pooled handle for `role`
///
/// Fails with [`PipelineError::Connection`] when the backend tag is unknown
/// or not compiled in, when required credentials are missing, or when the
/// initial handshake fails. Never logs the password.
pub async fn open(
    role: ConnectionRole,
    params: &ConnectionParams,
    pool: &PoolSettings,
) -> PipelineResult<Handle> {
    let backend: BackendType = params
        .backend
        .parse()
        .map_err(|e: String| PipelineError::Connection(DatabaseError::ConfigError(e)))?;

    info!(
        role = %role,
        backend = %backend,
        target = %params.identity(),
        login = params.login.as_deref().unwrap_or("-"),
        role_name = params.role.as_deref().unwrap_or("-"),
        warehouse = params.warehouse.as_deref().unwrap_or("-"),
        pool_size = pool.max_size(),
        "Opening connection"
    );

    if backend == BackendType::MySql && role == ConnectionRole::Warehouse {
        return Err(PipelineError::Connection(DatabaseError::ConfigError(
            "MySQL can only serve as the source connection".to_string(),
        )));
    }

    let handle = connect(backend, params, pool)
        .await
        .map_err(PipelineError::Connection)?;

    match handle.health_check().await {
        Ok(true) => {}
        Ok(false) => {
            return Err(PipelineError::Connection(DatabaseError::ConnectionFailed(
                format!("{} handshake returned no result", role),
            )));
        }
        Err(e) => return Err(PipelineError::Connection(e)),
    }

    info!(role = %role, backend = handle.backend_type(), "Connection ready");
    Ok(handle)
}

async fn connect(
    backend: BackendType,
    params: &ConnectionParams,
    pool: &PoolSettings,
) -> Result<Handle, DatabaseError> {
    match backend {
        BackendType::DuckDB => {
            #[cfg(feature = "duckdb-backend")]
            {
                let backend = super::duckdb::DuckDBBackend::from_params(params, pool)?;
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "duckdb-backend"))]
            {
                let _ = (params, pool);
                Err(DatabaseError::ConfigError(
                    "DuckDB backend not enabled. Build with --features duckdb-backend".to_string(),
                ))
            }
        }
        BackendType::Postgres => {
            #[cfg(feature = "postgres-backend")]
            {
                let backend = super::postgres::PostgresBackend::from_params(params, pool).await?;
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "postgres-backend"))]
            {
                let _ = (params, pool);
                Err(DatabaseError::ConfigError(
                    "PostgreSQL backend not enabled. Build with --features postgres-backend"
                        .to_string(),
                ))
            }
        }
        BackendType::MySql => {
            #[cfg(feature = "mysql-backend")]
            {
                let backend = super::mysql::MySqlBackend::from_params(params, pool)?;
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "mysql-backend"))]
            {
                let _ = (params, pool);
                Err(DatabaseError::ConfigError(
                    "MySQL backend not enabled. Build with --features mysql-backend".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_backend_is_connection_error() {
        let params = ConnectionParams {
            backend: "oracle".to_string(),
            ..Default::default()
        };
        let err = open(ConnectionRole::Source, &params, &PoolSettings::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Connection(_)));
        assert!(err.to_string().contains("oracle"));
    }

    #[tokio::test]
    async fn test_empty_backend_is_connection_error() {
        let params = ConnectionParams::default();
        let result = open(ConnectionRole::Warehouse, &params, &PoolSettings::default()).await;
        assert!(matches!(result, Err(PipelineError::Connection(_))));
    }

    #[cfg(feature = "duckdb-backend")]
    #[tokio::test]
    async fn test_open_duckdb_in_memory() {
        let params = ConnectionParams::duckdb(":memory:");
        let handle = open(ConnectionRole::Warehouse, &params, &PoolSettings::default())
            .await
            .unwrap();
        assert_eq!(handle.backend_type(), "duckdb");
    }

    #[cfg(feature = "duckdb-backend")]
    #[tokio::test]
    async fn test_duckdb_without_path_is_connection_error() {
        let params = ConnectionParams {
            backend: "duckdb".to_string(),
            ..Default::default()
        };
        let result = open(ConnectionRole::Source, &params, &PoolSettings::default()).await;
        assert!(matches!(result, Err(PipelineError::Connection(_))));
    }

    #[tokio::test]
    async fn test_mysql_warehouse_is_rejected() {
        let params = ConnectionParams::mysql("127.0.0.1", "retail", "etl", "secret");
        let err = open(ConnectionRole::Warehouse, &params, &PoolSettings::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PipelineError::Connection(DatabaseError::ConfigError(_))
        ));
        assert!(err.to_string().contains("source"));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(ConnectionRole::Source.to_string(), "source");
        assert_eq!(ConnectionRole::Warehouse.to_string(), "warehouse");
    }
}
