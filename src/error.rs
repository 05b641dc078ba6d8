//! Error types for sqlweave.

use thiserror::Error;

/// The main error type for sqlweave operations.
#[derive(Debug, Error)]
pub enum WeaveError {
    /// Failed to parse an operation or base-statement template.
    #[error("Template error at position {position}: {message}")]
    Template { position: usize, message: String },

    /// Template slots do not line up with the declared parameters.
    #[error(
        "Operation '{operation}' declares {parameters} parameter(s) but its template has {slots} slot(s)"
    )]
    SlotMismatch {
        operation: String,
        parameters: usize,
        slots: usize,
    },

    /// Two operations with the same name in one table.
    #[error("Duplicate operation '{0}'")]
    DuplicateOperation(String),

    /// A mandatory parameter was neither supplied nor defaulted.
    #[error("Parameter '{parameter}' is required by operation '{operation}'")]
    RequiredParameter { parameter: String, operation: String },

    /// A supplied parameter value could not be interpreted.
    #[error("Invalid value for parameter '{parameter}' of operation '{operation}': {message}")]
    InvalidParameter {
        parameter: String,
        operation: String,
        message: String,
    },

    /// An insert row left out a required merge operation.
    #[error("Operation '{operation}' is required by table '{table}'")]
    RequiredOperation { operation: String, table: String },

    /// An insert row produced a different column list than the first row.
    #[error("Insert row {row} does not supply the same columns as the first row")]
    ColumnMismatch { row: usize },

    /// An insert row writes the same column twice.
    #[error("Insert row {row} writes column '{column}' more than once")]
    DuplicateColumn { row: usize, column: String },

    /// Read path invoked with nothing pending and no open reader.
    #[error("no queries to execute against the database.")]
    NoQueries,

    /// Command path invoked with nothing pending and no open reader.
    #[error("no commands to execute against the database.")]
    NoCommands,

    /// Statements cannot be queued while a result reader is open.
    #[error("Cannot add statements while a result reader is open")]
    ReaderOpen,

    /// The connection has not been opened.
    #[error("Connection is not open")]
    ConnectionClosed,

    /// The SQL text references a variable that was never bound.
    #[error("Variable '{0}' is not bound")]
    UnboundVariable(String),

    /// Failed to parse a request expression.
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error, passed through as-is.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// A blocking database task panicked or was cancelled.
    #[error("Database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A result row could not be decoded into the requested type.
    #[error("Row decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Invalid TOML configuration.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WeaveError {
    /// Create a parse error at the given position.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// Create a template error at the given position.
    pub fn template(position: usize, message: impl Into<String>) -> Self {
        Self::Template {
            position,
            message: message.into(),
        }
    }

    /// Create a required-parameter error.
    pub fn required(parameter: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::RequiredParameter {
            parameter: parameter.into(),
            operation: operation.into(),
        }
    }

    /// Whether this error reports misuse of a query context rather than a failure.
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, Self::NoQueries | Self::NoCommands | Self::ReaderOpen)
    }
}

/// Result type alias for sqlweave operations.
pub type WeaveResult<T> = Result<T, WeaveError>;
