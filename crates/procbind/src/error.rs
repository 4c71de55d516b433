//! Error types for the data-access library.

use thiserror::Error;

/// Main error type for data-access and mapping operations.
#[derive(Error, Debug)]
pub enum DataAccessError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The connection could not be opened.
    #[error("Unable to open the connection: {0}")]
    ConnectionOpen(String),

    /// Command execution failed on the data source
    #[error("{message}")]
    Command { message: String, context: String },

    /// Command exceeded its timeout
    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    /// A value could not be converted to the requested type
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Mapping a column into a property failed
    #[error("Failed to map column {column} into {property}: {message}")]
    Mapping {
        column: String,
        property: String,
        message: String,
    },

    /// Row index outside the row source
    #[error("Row {row} is out of range (row count {count})")]
    RowOutOfRange { row: usize, count: usize },

    /// Column index outside the row source
    #[error("Column {column} is out of range (column count {count})")]
    ColumnOutOfRange { column: usize, count: usize },

    /// Security token mismatch on a gated call
    #[error("Security token validation failed.  Access to service is denied.")]
    TokenRejected,

    /// Raw modification touched a different number of rows than asserted
    #[error(
        "The number of records to be updated is: {actual}, but the desired number of records to modify was: {expected}.  Transaction is rolled back."
    )]
    RowCountMismatch { actual: u64, expected: u64 },

    /// The asserted row count must be positive
    #[error("The number of records modified needs to be greater than 0.")]
    InvalidExpectedCount,

    /// Transaction state error
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DataAccessError {
    /// Create a Command error with context about where it occurred
    pub fn command(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        DataAccessError::Command {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Conversion error
    pub fn conversion(message: impl Into<String>) -> Self {
        DataAccessError::Conversion(message.into())
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        if let DataAccessError::Command { context, .. } = self {
            if !context.is_empty() {
                output.push_str(&format!("  Context: {}\n", context));
            }
        }

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

/// Result type alias for data-access operations.
pub type Result<T> = std::result::Result<T, DataAccessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_rejected_message_is_exact() {
        assert_eq!(
            DataAccessError::TokenRejected.to_string(),
            "Security token validation failed.  Access to service is denied."
        );
    }

    #[test]
    fn test_row_count_mismatch_message() {
        let err = DataAccessError::RowCountMismatch {
            actual: 3,
            expected: 1,
        };
        assert_eq!(
            err.to_string(),
            "The number of records to be updated is: 3, but the desired number of records to modify was: 1.  Transaction is rolled back."
        );
    }

    #[test]
    fn test_command_error_displays_message_only() {
        let err = DataAccessError::command("deadlock victim", "executing dbo.SaveOrder");
        assert_eq!(err.to_string(), "deadlock victim");
        assert!(err.format_detailed().contains("executing dbo.SaveOrder"));
    }
}
