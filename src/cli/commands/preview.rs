//! Preview CLI command
//!
//! Runs an ad-hoc query against the source or the warehouse and prints the
//! result, e.g. to check a fact query before scheduling it.

use std::path::PathBuf;
use std::time::Instant;

use crate::cli::error::CliError;
use crate::cli::{load_config, runtime};
use crate::database::{ConnectionRole, OutputFormat, format_batch, open};
use crate::pipeline::{DateWindow, substitute_window};

/// Preview command arguments
#[derive(Debug, Clone)]
pub struct PreviewArgs {
    /// Config file path
    pub config: PathBuf,
    /// SQL query, may contain date placeholders
    pub sql: String,
    /// Query the warehouse instead of the source
    pub warehouse: bool,
    /// Output format
    pub format: String,
    /// Window substituted into the query
    pub window: DateWindow,
}

/// Execute a preview query
pub fn handle_preview(args: &PreviewArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;

    // Parse output format
    let output_format: OutputFormat = args
        .format
        .parse()
        .map_err(|e: String| CliError::InvalidArgument(e))?;

    let (role, params) = if args.warehouse {
        (ConnectionRole::Warehouse, config.warehouse()?)
    } else {
        (ConnectionRole::Source, config.source()?)
    };
    let sql = substitute_window(&args.sql, &args.window);

    let rt = runtime()?;

    rt.block_on(async {
        let handle = open(role, &params, &config.pool).await?;

        let started = Instant::now();
        let batch = handle
            .query(&sql)
            .await
            .map_err(|e| CliError::IoError(format!("Query failed: {}", e)))?;
        handle.close().await.ok();

        // Format and print result
        println!("{}", format_batch(&batch, output_format));

        // Print execution time for non-JSON formats
        if output_format != OutputFormat::Json {
            eprintln!("\nExecution time: {}ms", started.elapsed().as_millis());
        }
        Ok::<(), CliError>(())
    })
}
