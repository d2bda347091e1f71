//! Command line interface

pub mod commands;
pub mod error;

use std::path::Path;

use crate::config::PipelineConfig;
use error::CliError;

/// Load the pipeline configuration for a command
pub(crate) fn load_config(path: &Path) -> Result<PipelineConfig, CliError> {
    if !path.exists() {
        return Err(CliError::ConfigNotFound(path.to_path_buf()));
    }
    Ok(PipelineConfig::load(path)?)
}

/// Create the runtime a command blocks on
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))
}
