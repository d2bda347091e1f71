//! Run CLI command
//!
//! Loads the dimension and/or fact table sets, then runs the configured
//! transformation phases.

use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::cli::error::CliError;
use crate::cli::{load_config, runtime};
use crate::config::{PipelineConfig, parse_date, schedule_dates_from_env};
use crate::database::{ConnectionRole, open};
use crate::pipeline::{DateWindow, LoadKind, Orchestrator, RunReport};
use crate::transform::run_phases;

/// Run command arguments
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Config file path
    pub config: PathBuf,
    /// "dimension", "fact", or `None` for both
    pub kind: Option<String>,
    /// Current window boundary (YYYY-MM-DD)
    pub ds: Option<String>,
    /// Previous window boundary (YYYY-MM-DD)
    pub prev_ds: Option<String>,
    /// Skip the transformation phases
    pub skip_transform: bool,
}

/// Load kinds selected by `--kind`
pub fn selected_kinds(kind: Option<&str>) -> Result<Vec<LoadKind>, CliError> {
    match kind {
        Some(kind) => Ok(vec![kind.parse::<LoadKind>()?]),
        None => Ok(vec![LoadKind::Dimension, LoadKind::Fact]),
    }
}

/// Resolve the date window from flags, then environment, then today
pub fn resolve_window(
    ds: Option<&str>,
    prev_ds: Option<&str>,
    today: NaiveDate,
) -> Result<DateWindow, CliError> {
    let (env_prev, env_current) = schedule_dates_from_env()?;
    let current = ds.map(parse_date).transpose()?.or(env_current);
    let previous = prev_ds.map(parse_date).transpose()?.or(env_prev);
    Ok(DateWindow::resolve(previous, current, today)?)
}

/// Run the pipeline
pub fn handle_run(args: &RunArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let kinds = selected_kinds(args.kind.as_deref())?;
    let today = chrono::Local::now().date_naive();
    let window = resolve_window(args.ds.as_deref(), args.prev_ds.as_deref(), today)?;

    let rt = runtime()?;

    rt.block_on(async {
        tokio::select! {
            result = execute(&config, &kinds, window, args.skip_transform) => result,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted; uncommitted work is rolled back");
                Err(CliError::Interrupted)
            }
        }
    })
}

async fn execute(
    config: &PipelineConfig,
    kinds: &[LoadKind],
    window: DateWindow,
    skip_transform: bool,
) -> Result<(), CliError> {
    let source = open(ConnectionRole::Source, &config.source()?, &config.pool).await?;
    let warehouse = open(ConnectionRole::Warehouse, &config.warehouse()?, &config.pool).await?;

    let mut orchestrator =
        Orchestrator::new(source.as_ref(), warehouse.as_ref(), config.run_settings());

    for &kind in kinds {
        if kinds.len() > 1 && !config.has_tables(kind) {
            warn!(kind = %kind, "No tables configured, skipping");
            continue;
        }
        let table_source = config.table_source(kind)?;
        let window = (kind == LoadKind::Fact).then_some(window);
        let report = orchestrator.run_source(kind, &table_source, window).await?;
        print_report(&report);
    }

    source.close().await.ok();
    warehouse.close().await.ok();

    if skip_transform || config.transform.phases.is_empty() {
        info!("Skipping transformation phases");
        return Ok(());
    }

    let outcomes = run_phases(&config.transform.phases, window.current_boundary).await?;
    for outcome in outcomes {
        println!("  phase {:<20} ok ({}ms)", outcome.name, outcome.elapsed_ms);
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    match &report.window {
        Some(window) => println!("{} run {} for {}", report.kind, report.run_id, window),
        None => println!("{} run {}", report.kind, report.run_id),
    }
    for table in &report.tables {
        println!(
            "  {:<30} {:>10} rows  {:>4} statements  {}ms",
            table.load.table, table.load.rows, table.load.statements, table.elapsed_ms
        );
    }
    println!(
        "  {} tables, {} rows in {}ms",
        report.tables.len(),
        report.total_rows(),
        report.duration.as_millis()
    );
}
