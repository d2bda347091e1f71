//! Init CLI command
//!
//! Writes a sample configuration, or bootstraps the warehouse tables from
//! the configured DDL file.

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::cli::{load_config, runtime};
use crate::config::sample_config;
use crate::database::{ConnectionRole, open};
use crate::pipeline::bootstrap;

/// Init command arguments
#[derive(Debug, Clone)]
pub struct InitArgs {
    /// Config file path
    pub config: PathBuf,
    /// Write a sample config instead of bootstrapping
    pub write_config: bool,
    /// Overwrite an existing config file
    pub force: bool,
}

/// Initialize the config file or the warehouse
pub fn handle_init(args: &InitArgs) -> Result<(), CliError> {
    if args.write_config {
        return write_sample_config(args);
    }

    let config = load_config(&args.config)?;
    let ddl = config.bootstrap_path().ok_or_else(|| {
        CliError::InvalidArgument("No bootstrap_ddl configured".to_string())
    })?;

    let rt = runtime()?;

    rt.block_on(async {
        let warehouse =
            open(ConnectionRole::Warehouse, &config.warehouse()?, &config.pool).await?;
        let count = bootstrap(warehouse.as_ref(), &ddl).await?;
        warehouse.close().await.ok();

        println!("Executed {} statements from {}", count, ddl.display());
        Ok::<(), CliError>(())
    })
}

fn write_sample_config(args: &InitArgs) -> Result<(), CliError> {
    if args.config.exists() && !args.force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists. Use --force to overwrite.",
            args.config.display()
        )));
    }

    std::fs::write(&args.config, sample_config())
        .map_err(|e| CliError::FileWriteError(args.config.clone(), e.to_string()))?;

    println!("Wrote sample configuration to {}", args.config.display());
    Ok(())
}
