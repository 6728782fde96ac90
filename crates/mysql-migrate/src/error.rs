//! Error types for the migration library.

use std::time::Duration;

use thiserror::Error;

use crate::resilience::Realm;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing database name, invalid bound, bad regex, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Layered configuration could not be assembled or deserialized
    #[error("Configuration error: {0}")]
    ConfigLoad(#[from] ::config::ConfigError),

    /// Connection string could not be parsed
    #[error("Invalid connection string: {0}")]
    Url(#[from] mysql_async::UrlError),

    /// Database connection or query error
    #[error("Database error: {0}")]
    Database(#[from] mysql_async::Error),

    /// A single database command ran longer than its configured timeout
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Source data did not have the shape the query promised
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// The realm's circuit breaker is open and rejected the call
    #[error("Circuit breaker for {realm} is open")]
    CircuitOpen { realm: Realm },

    /// A pipeline worker failed
    #[error("Stage {stage} failed: {message}")]
    Stage { stage: String, message: String },

    /// At least one pipeline stage recorded a fault; `first_error` is the
    /// earliest failure in stage order
    #[error("Pipeline has errors in stages: {}", failed_stages.join(", "))]
    Pipeline {
        failed_stages: Vec<String>,
        #[source]
        first_error: Box<MigrateError>,
    },

    /// Job exceeded its configured timeout
    #[error("Job timed out after {0:?}")]
    JobTimeout(Duration),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,

    /// Invalid regular expression in include/exclude/skip/limit patterns
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Stage error
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a DataIntegrity error
    pub fn integrity(message: impl Into<String>) -> Self {
        MigrateError::DataIntegrity(message.into())
    }

    /// Whether the resilience policy may retry the failed operation.
    ///
    /// Only network/database faults are transient. Configuration, integrity
    /// and cancellation errors fail immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MigrateError::Database(_)
                | MigrateError::Timeout { .. }
                | MigrateError::CircuitOpen { .. }
                | MigrateError::Io(_)
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        1
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
