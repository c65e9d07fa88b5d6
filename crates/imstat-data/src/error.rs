//! Error types for the column model

use thiserror::Error;

/// Errors raised while building or editing columns and datasets
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Column already exists: {0}")]
    ColumnExists(String),

    #[error("Label code {0} already exists")]
    DuplicateLabel(i32),

    #[error("Label code {0} is reserved for missing values")]
    ReservedCode(i32),

    #[error("Label code {0} not found")]
    LabelNotFound(i32),

    #[error("Label code {code} is still used by column {column}")]
    LabelInUse { column: String, code: i32 },

    #[error("Value {code} in column {column} has no label")]
    CodeWithoutLabel { column: String, code: i32 },

    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Invalid label move: {0}")]
    InvalidMove(String),

    #[error("Label '{0}' is not numeric")]
    NotNumeric(String),

    #[error("Type error: {0}")]
    TypeError(String),
}

/// Result type for column model operations
pub type DataResult<T> = Result<T, DataError>;
