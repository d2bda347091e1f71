//! Table-set orchestration
//!
//! Drives extract then load for every table of a run, sequentially and in
//! the order given. The first failure stops the run; tables that already
//! committed stay committed.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::extract::extract;
use super::load::{LoadPlan, LoadReport, load};
use super::table::{LoadKind, TableKind, TableSource, TableSpec, resolve_tables};
use super::window::{DateWindow, substitute_window};
use crate::database::DatabaseBackend;
use crate::error::{PipelineError, PipelineResult};

/// Default rows per insert statement for fact loads
pub const DEFAULT_FACT_CHUNK_SIZE: usize = 100_000;

/// Default warehouse schema receiving extracted tables
pub const DEFAULT_TARGET_SCHEMA: &str = "landing";

/// Per-run load settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSettings {
    #[serde(default = "default_target_schema")]
    pub target_schema: String,
    #[serde(default)]
    pub dimension_chunk_size: Option<usize>,
    #[serde(default = "default_fact_chunk_size")]
    pub fact_chunk_size: Option<usize>,
}

fn default_target_schema() -> String {
    DEFAULT_TARGET_SCHEMA.to_string()
}

fn default_fact_chunk_size() -> Option<usize> {
    Some(DEFAULT_FACT_CHUNK_SIZE)
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            target_schema: default_target_schema(),
            dimension_chunk_size: None,
            fact_chunk_size: default_fact_chunk_size(),
        }
    }
}

impl RunSettings {
    fn chunk_size(&self, kind: LoadKind) -> Option<usize> {
        match kind {
            LoadKind::Dimension => self.dimension_chunk_size,
            LoadKind::Fact => self.fact_chunk_size,
        }
    }
}

/// Where a run currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Resolving,
    Extracting(String),
    Loading(String),
    Done,
    /// Terminal; `table` is absent for failures before the first table
    Failed { table: Option<String>, cause: String },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed { .. })
    }
}

/// Outcome of one table in a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableOutcome {
    pub table: String,
    pub load: LoadReport,
    pub elapsed_ms: u64,
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub kind: LoadKind,
    pub window: Option<DateWindow>,
    pub tables: Vec<TableOutcome>,
    pub duration: Duration,
}

impl RunReport {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.load.rows).sum()
    }
}

/// Runs table sets from one source into one warehouse
pub struct Orchestrator<'a> {
    source: &'a dyn DatabaseBackend,
    warehouse: &'a dyn DatabaseBackend,
    settings: RunSettings,
    state: RunState,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        source: &'a dyn DatabaseBackend,
        warehouse: &'a dyn DatabaseBackend,
        settings: RunSettings,
    ) -> Self {
        Self {
            source,
            warehouse,
            settings,
            state: RunState::Idle,
        }
    }

    /// Current state of the last (or ongoing) run
    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Resolve the table set from `source` and run it
    pub async fn run_source(
        &mut self,
        kind: LoadKind,
        source: &TableSource,
        window: Option<DateWindow>,
    ) -> PipelineResult<RunReport> {
        self.transition(RunState::Resolving);
        let tables = match resolve_tables(kind, source) {
            Ok(tables) => tables,
            Err(e) => return Err(self.fail(None, e)),
        };
        self.run(kind, &tables, window).await
    }

    /// Extract and load every table of `tables`, in order
    ///
    /// Fact runs need a window. All specs must match `kind`; both are
    /// checked before anything is extracted.
    pub async fn run(
        &mut self,
        kind: LoadKind,
        tables: &[TableSpec],
        window: Option<DateWindow>,
    ) -> PipelineResult<RunReport> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        self.transition(RunState::Resolving);
        if let Err(e) = self.check(kind, tables, window.as_ref()) {
            return Err(self.fail(None, e));
        }

        info!(
            run_id = %run_id,
            kind = %kind,
            tables = tables.len(),
            window = ?window.map(|w| w.to_string()),
            target_schema = %self.settings.target_schema,
            "Starting run"
        );

        let mut outcomes = Vec::with_capacity(tables.len());
        for spec in tables {
            let table_started = Instant::now();

            self.transition(RunState::Extracting(spec.name.clone()));
            let query = match (&spec.kind, window.as_ref()) {
                (TableKind::Dimension { query }, _) => query.clone(),
                (TableKind::Fact { query_template }, Some(window)) => {
                    Some(substitute_window(query_template, window))
                }
                (TableKind::Fact { .. }, None) => None,
            };
            let batch = match extract(&spec.name, self.source, query.as_deref()).await {
                Ok(batch) => batch,
                Err(e) => return Err(self.fail(Some(&spec.name), e)),
            };

            self.transition(RunState::Loading(spec.name.clone()));
            let plan = self.plan(kind, spec);
            let report = match load(batch, self.warehouse, &plan).await {
                Ok(report) => report,
                Err(e) => return Err(self.fail(Some(&spec.name), e)),
            };

            outcomes.push(TableOutcome {
                table: spec.name.clone(),
                load: report,
                elapsed_ms: table_started.elapsed().as_millis() as u64,
            });
        }

        self.transition(RunState::Done);
        let report = RunReport {
            run_id,
            kind,
            window,
            tables: outcomes,
            duration: started.elapsed(),
        };
        info!(
            run_id = %run_id,
            kind = %kind,
            tables = report.tables.len(),
            rows = report.total_rows(),
            duration_ms = report.duration.as_millis() as u64,
            "Run complete"
        );
        Ok(report)
    }

    fn check(
        &self,
        kind: LoadKind,
        tables: &[TableSpec],
        window: Option<&DateWindow>,
    ) -> PipelineResult<()> {
        if kind == LoadKind::Fact && window.is_none() {
            return Err(PipelineError::config("Fact loads require a date window"));
        }
        if let Some(spec) = tables.iter().find(|s| s.load_kind() != kind) {
            return Err(PipelineError::config(format!(
                "Table '{}' is a {} table but the run loads {} tables",
                spec.name,
                spec.load_kind(),
                kind
            )));
        }
        if self.settings.chunk_size(kind) == Some(0) {
            return Err(PipelineError::config(format!(
                "{} chunk size must be greater than zero",
                kind
            )));
        }
        Ok(())
    }

    fn plan(&self, kind: LoadKind, spec: &TableSpec) -> LoadPlan {
        let plan = match kind {
            LoadKind::Dimension => LoadPlan::replace(&self.settings.target_schema, &spec.name),
            LoadKind::Fact => LoadPlan::append(&self.settings.target_schema, &spec.name),
        };
        plan.with_chunk_size(self.settings.chunk_size(kind))
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "Run state");
        self.state = next;
    }

    fn fail(&mut self, table: Option<&str>, cause: PipelineError) -> PipelineError {
        error!(table = table.unwrap_or("-"), error = %cause, "Run failed");
        self.transition(RunState::Failed {
            table: table.map(str::to_string),
            cause: cause.to_string(),
        });
        cause
    }
}

#[cfg(all(test, feature = "duckdb-backend"))]
mod tests {
    use super::*;
    use crate::database::DuckDBBackend;
    use chrono::NaiveDate;

    async fn pair() -> (DuckDBBackend, DuckDBBackend) {
        let source = DuckDBBackend::in_memory().unwrap();
        source
            .execute_batch(
                "CREATE TABLE products (id INTEGER, name VARCHAR);
                 INSERT INTO products VALUES (1, 'bolt'), (2, 'nut');
                 CREATE TABLE suppliers (id INTEGER, name VARCHAR);
                 INSERT INTO suppliers VALUES (1, 'acme');",
            )
            .await
            .unwrap();
        let warehouse = DuckDBBackend::in_memory().unwrap();
        warehouse
            .execute_batch(
                "CREATE SCHEMA landing;
                 CREATE TABLE landing.products (id INTEGER, name VARCHAR);
                 CREATE TABLE landing.suppliers (id INTEGER, name VARCHAR);",
            )
            .await
            .unwrap();
        (source, warehouse)
    }

    #[tokio::test]
    async fn test_dimension_run_reaches_done() {
        let (source, warehouse) = pair().await;
        let mut orchestrator = Orchestrator::new(&source, &warehouse, RunSettings::default());
        let tables = vec![
            TableSpec::dimension("products", None).unwrap(),
            TableSpec::dimension("suppliers", None).unwrap(),
        ];

        let report = orchestrator
            .run(LoadKind::Dimension, &tables, None)
            .await
            .unwrap();

        assert_eq!(orchestrator.state(), &RunState::Done);
        assert_eq!(report.tables.len(), 2);
        assert_eq!(report.total_rows(), 3);
    }

    #[tokio::test]
    async fn test_fact_run_without_window_is_rejected() {
        let (source, warehouse) = pair().await;
        let mut orchestrator = Orchestrator::new(&source, &warehouse, RunSettings::default());
        let tables = vec![TableSpec::fact("products", "SELECT * FROM products").unwrap()];

        let err = orchestrator
            .run(LoadKind::Fact, &tables, None)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(orchestrator.state(), RunState::Failed { table: None, .. }));
    }

    #[tokio::test]
    async fn test_kind_mismatch_rejected_before_extract() {
        let (source, warehouse) = pair().await;
        let mut orchestrator = Orchestrator::new(&source, &warehouse, RunSettings::default());
        let tables = vec![TableSpec::fact("products", "SELECT * FROM products").unwrap()];
        let window = DateWindow::ending(NaiveDate::from_ymd_opt(2025, 8, 29).unwrap()).unwrap();

        let err = orchestrator
            .run(LoadKind::Dimension, &tables, Some(window))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_tables() {
        let (source, warehouse) = pair().await;
        let mut orchestrator = Orchestrator::new(&source, &warehouse, RunSettings::default());
        let tables = vec![
            TableSpec::dimension("products", None).unwrap(),
            TableSpec::dimension("missing", None).unwrap(),
            TableSpec::dimension("suppliers", None).unwrap(),
        ];

        let err = orchestrator
            .run(LoadKind::Dimension, &tables, None)
            .await
            .unwrap_err();
        assert_eq!(err.table(), Some("missing"));
        assert_eq!(
            orchestrator.state(),
            &RunState::Failed {
                table: Some("missing".to_string()),
                cause: err.to_string(),
            }
        );

        // products committed before the failure, suppliers never ran
        let products = warehouse.query("SELECT * FROM landing.products").await.unwrap();
        assert_eq!(products.row_count(), 2);
        let suppliers = warehouse.query("SELECT * FROM landing.suppliers").await.unwrap();
        assert_eq!(suppliers.row_count(), 0);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = RunSettings::default();
        assert_eq!(settings.target_schema, "landing");
        assert_eq!(settings.chunk_size(LoadKind::Dimension), None);
        assert_eq!(settings.chunk_size(LoadKind::Fact), Some(100_000));
    }
}
