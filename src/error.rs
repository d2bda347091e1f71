//! Pipeline error taxonomy
//!
//! Every error that leaves the core is one of four kinds. Extraction and load
//! failures always carry the name of the table they happened on so the caller
//! can attribute a failed run.

use thiserror::Error;

use crate::database::DatabaseError;

/// Error type for pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Pool, authentication or network failure while opening a handle
    #[error("Connection error: {0}")]
    Connection(#[source] DatabaseError),

    /// Invalid load kind, missing fact query, malformed table spec or window
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Query execution failed on the source
    #[error("Extract failed for table {table}: {source}")]
    Extract {
        table: String,
        #[source]
        source: DatabaseError,
    },

    /// Transaction or insert failed on the warehouse; the transaction was rolled back
    #[error("Load failed for table {table}: {source}")]
    Load {
        table: String,
        #[source]
        source: DatabaseError,
    },
}

impl PipelineError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        PipelineError::Configuration(message.into())
    }

    /// The table this error is attributed to, if any
    pub fn table(&self) -> Option<&str> {
        match self {
            PipelineError::Extract { table, .. } | PipelineError::Load { table, .. } => {
                Some(table)
            }
            _ => None,
        }
    }

    /// Whether this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_attribution() {
        let err = PipelineError::Extract {
            table: "sales".to_string(),
            source: DatabaseError::QueryFailed("boom".to_string()),
        };
        assert_eq!(err.table(), Some("sales"));
        assert!(err.to_string().contains("sales"));
        assert!(err.to_string().contains("boom"));

        let err = PipelineError::config("bad");
        assert!(err.table().is_none());
        assert!(err.is_configuration());
    }
}
