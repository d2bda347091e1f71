//! Tables CLI command
//!
//! Prints the resolved table set of each load kind without connecting to
//! anything.

use std::path::PathBuf;

use super::run::selected_kinds;
use crate::cli::error::CliError;
use crate::cli::load_config;
use crate::pipeline::extract::default_query;
use crate::pipeline::{DateWindow, TableKind, TableSpec, resolve_tables, substitute_window};

/// Tables command arguments
#[derive(Debug, Clone)]
pub struct TablesArgs {
    /// Config file path
    pub config: PathBuf,
    /// "dimension", "fact", or `None` for both
    pub kind: Option<String>,
    /// Window used to render fact queries
    pub window: DateWindow,
}

/// Print the configured tables
pub fn handle_tables(args: &TablesArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;

    for kind in selected_kinds(args.kind.as_deref())? {
        if !config.has_tables(kind) {
            println!("{}: (none)", kind);
            continue;
        }
        let specs = resolve_tables(kind, &config.table_source(kind)?)?;
        println!("{} ({} tables):", kind, specs.len());
        for spec in &specs {
            println!("  {:<30} {}", spec.name, describe(spec, &args.window));
        }
    }

    Ok(())
}

fn describe(spec: &TableSpec, window: &DateWindow) -> String {
    let query = match &spec.kind {
        TableKind::Dimension { query: None } => return default_query(&spec.name),
        TableKind::Dimension { query: Some(query) } => query.clone(),
        TableKind::Fact { query_template } => substitute_window(query_template, window),
    };
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}
