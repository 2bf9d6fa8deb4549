//! Error types for the migration library.
//!
//! Only fatal conditions are represented here. Row-level and table-level
//! problems that the run recovers from are carried as values
//! ([`crate::core::RowOutcome`], [`crate::orchestrator::TableStatus`]).

use thiserror::Error;

/// Exit code for configuration errors (bad locator, bad spec file).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for connectivity failures.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for strict schema application failures.
pub const EXIT_SCHEMA_ERROR: u8 = 3;
/// Exit code for failures while loading table data.
pub const EXIT_LOAD_ERROR: u8 = 4;
/// Exit code for local I/O failures.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (malformed locator, unsupported scheme, invalid spec).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A store could not be reached or failed its round-trip check.
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// A DDL statement failed in the strict schema path.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A connection-level failure while loading a table.
    #[error("Load failed for table {table}: {message}")]
    Load { table: String, message: String },

    /// Source (SQLite) driver error.
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// PostgreSQL driver error.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL driver error.
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML deserialization error (spec files).
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error (summary output).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred.
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Load error for a table.
    pub fn load(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Load {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Schema(_) => EXIT_SCHEMA_ERROR,
            MigrateError::Load { .. }
            | MigrateError::Source(_)
            | MigrateError::Postgres(_)
            | MigrateError::Mysql(_) => EXIT_LOAD_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain.
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
