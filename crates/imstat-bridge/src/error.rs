//! Error types for imstat-bridge

use imstat_data::DataError;
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for bridge operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// No dataset is loaded, or a collaborator is missing
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A requested column does not exist
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Column model errors
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Filter errors
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// The shared dataset lock was poisoned by a panicking writer
    #[error("Dataset lock poisoned")]
    Poisoned,

    /// Buffer serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter-specific errors. Messages carry original column names.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    /// No dataset is loaded
    #[error("{0}")]
    Precondition(String),

    /// The script calls something outside the allow-list
    #[error("Filter is not safe because of: {construct}")]
    Unsafe { construct: String },

    /// The script did not return one logical value per row
    #[error("Filter returned {found} of length {actual} instead of a logical vector of length {expected}, make sure you entered all column names *exactly* right.")]
    ShapeMismatch {
        expected: usize,
        actual: usize,
        found: String,
    },

    /// The filter excludes every row
    #[error("Filtered out all data..")]
    Vacuous,

    /// The script failed to parse or evaluate
    #[error("{0}")]
    Script(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}
