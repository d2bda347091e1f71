//! Downstream transformation phases
//!
//! After every table has landed, the configured phases (typically dbt
//! source tests, run, model tests and snapshot) run as local commands, one
//! after another. A phase only starts when the previous one exited cleanly.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Environment variable carrying the run date into every phase
pub const RUN_DATE_ENV: &str = "RUN_DATE";

/// One transformation phase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransformPhase {
    pub name: String,
    /// Program followed by its arguments
    pub command: Vec<String>,
    /// Working directory, defaults to the current one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl TransformPhase {
    pub fn new(name: impl Into<String>, command: &[&str]) -> Self {
        Self {
            name: name.into(),
            command: command.iter().map(|s| s.to_string()).collect(),
            working_dir: None,
        }
    }
}

/// Error type for transformation phases
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Phase {phase} has an empty command")]
    EmptyCommand { phase: String },

    #[error("Failed to start phase {phase}: {source}")]
    Spawn {
        phase: String,
        #[source]
        source: std::io::Error,
    },

    /// `code` is `None` when the process was killed by a signal
    #[error("Phase {phase} failed with exit code {code:?}")]
    Failed { phase: String, code: Option<i32> },
}

/// Outcome of a phase that ran to success
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseOutcome {
    pub name: String,
    pub elapsed_ms: u64,
}

/// Run `phases` in order with `RUN_DATE` set to `run_date`
///
/// Stops at the first phase that cannot start or exits unsuccessfully.
pub async fn run_phases(
    phases: &[TransformPhase],
    run_date: NaiveDate,
) -> Result<Vec<PhaseOutcome>, TransformError> {
    let run_date = run_date.format("%Y-%m-%d").to_string();
    let mut outcomes = Vec::with_capacity(phases.len());

    for phase in phases {
        let Some((program, args)) = phase.command.split_first() else {
            return Err(TransformError::EmptyCommand {
                phase: phase.name.clone(),
            });
        };

        info!(phase = %phase.name, command = %phase.command.join(" "), run_date = %run_date, "Starting phase");
        let started = Instant::now();

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .env(RUN_DATE_ENV, &run_date)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &phase.working_dir {
            command.current_dir(dir);
        }

        let status = command
            .status()
            .await
            .map_err(|source| TransformError::Spawn {
                phase: phase.name.clone(),
                source,
            })?;

        if !status.success() {
            warn!(phase = %phase.name, code = ?status.code(), "Phase failed");
            return Err(TransformError::Failed {
                phase: phase.name.clone(),
                code: status.code(),
            });
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(phase = %phase.name, elapsed_ms, "Phase complete");
        outcomes.push(PhaseOutcome {
            name: phase.name.clone(),
            elapsed_ms,
        });
    }

    Ok(outcomes)
}
