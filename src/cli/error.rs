//! CLI-specific error types

use std::path::PathBuf;
use thiserror::Error;

use crate::error::PipelineError;
use crate::transform::TransformError;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Config file not found: {0}. Run 'landing-elt init --write-config' to create one.")]
    ConfigNotFound(PathBuf),

    #[error("Failed to write file {0}: {1}")]
    FileWriteError(PathBuf, String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("Transformation error: {0}")]
    Transform(#[from] TransformError),

    #[error("Interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    IoError(String),
}
