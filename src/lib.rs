//! Landing ELT - move operational tables into a warehouse landing schema
//!
//! Provides:
//! - Pooled source and warehouse handles (DuckDB, PostgreSQL; MySQL as a source)
//! - Extraction of tables into in-memory batches
//! - Transactional truncate-and-insert loading with multi-row inserts
//! - Dimension (full refresh) and fact (date window) table-set runs
//! - Sequential downstream transformation phases
//!
//! ```no_run
//! # async fn demo() -> landing_elt::PipelineResult<()> {
//! use landing_elt::database::{ConnectionParams, ConnectionRole, PoolSettings, open};
//! use landing_elt::pipeline::{LoadKind, Orchestrator, RunSettings, TableSpec};
//!
//! let pool = PoolSettings::default();
//! let source = open(ConnectionRole::Source, &ConnectionParams::duckdb("retail.duckdb"), &pool).await?;
//! let warehouse = open(ConnectionRole::Warehouse, &ConnectionParams::duckdb("dw.duckdb"), &pool).await?;
//!
//! let tables = vec![TableSpec::dimension("products", None)?];
//! let mut orchestrator = Orchestrator::new(source.as_ref(), warehouse.as_ref(), RunSettings::default());
//! orchestrator.run(LoadKind::Dimension, &tables, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod database;
pub mod error;
pub mod pipeline;
pub mod transform;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use batch::{Batch, Row, Value};
pub use config::PipelineConfig;
pub use database::{
    ConnectionParams, ConnectionRole, DatabaseBackend, DatabaseError, Handle, PoolSettings,
};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{
    DateWindow, LoadKind, LoadPlan, Orchestrator, RunReport, RunSettings, RunState, TableSource,
    TableSpec,
};
pub use transform::{TransformError, TransformPhase, run_phases};
