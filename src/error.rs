//! Error types for the block-tree term dictionary.
//!
//! All errors are represented by the [`BlockTreeError`] enum. Corruption of
//! on-disk data, misuse of an API and failures of the storage layer are kept
//! apart so callers can decide what is recoverable.
//!
//! # Examples
//!
//! ```
//! use blocktree_ords::error::{BlockTreeError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(BlockTreeError::illegal_argument("min_items_in_block must be >= 2"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for block-tree operations.
#[derive(Error, Debug)]
pub enum BlockTreeError {
    /// I/O errors surfaced by the storage collaborator.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index-related errors
    #[error("Index error: {0}")]
    Index(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// On-disk data violates a format invariant. Never retried.
    #[error("Corrupt index: {0}")]
    Corrupt(String),

    /// An argument is outside the accepted domain.
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// An operation was invoked in a state that does not allow it.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with BlockTreeError.
pub type Result<T> = std::result::Result<T, BlockTreeError>;

impl BlockTreeError {
    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        BlockTreeError::Index(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        BlockTreeError::Storage(msg.into())
    }

    /// Create a new corruption error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        BlockTreeError::Corrupt(msg.into())
    }

    /// Create a new illegal argument error.
    pub fn illegal_argument<S: Into<String>>(msg: S) -> Self {
        BlockTreeError::IllegalArgument(msg.into())
    }

    /// Create a new illegal state error.
    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        BlockTreeError::IllegalState(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        BlockTreeError::InvalidOperation(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        BlockTreeError::SerializationError(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        BlockTreeError::Other(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        BlockTreeError::Other(format!("Not found: {}", msg.into()))
    }

    /// Returns true if this error reports corrupt on-disk data.
    pub fn is_corruption(&self) -> bool {
        matches!(self, BlockTreeError::Corrupt(_))
    }

    /// Returns true if this error reports API misuse rather than bad data.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            BlockTreeError::IllegalArgument(_)
                | BlockTreeError::IllegalState(_)
                | BlockTreeError::InvalidOperation(_)
        )
    }
}
