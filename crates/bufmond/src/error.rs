//! Error types for bufmond
//!
//! Errors fall into three classes:
//! - fatal: the daemon logs a diagnostic and exits ([`BufmondError::is_fatal`])
//! - transient: state is left untouched and the next store change
//!   re-drives the reconciliation pass ([`BufmondError::is_retryable`])
//! - per-attribute: logged, the attribute is dropped, the insert continues

use thiserror::Error;

use crate::store::{ColumnType, TxnStatus};

/// Buffer monitoring daemon errors
#[derive(Error, Debug)]
pub enum BufmondError {
    /// The system is configured but the catalog was never placed
    #[error("Catalog missing after system ready: {reason}")]
    CatalogMissingAfterReady {
        /// What was missing
        reason: String,
    },

    /// Catalog could not be read or parsed, possibly mid-write
    #[error("Catalog {path} is incomplete: {message}")]
    CatalogParseIncomplete {
        /// Catalog path
        path: String,
        /// Parser or IO message
        message: String,
    },

    /// Transaction ended in a non-success terminal status
    #[error("Transaction did not commit: {status}")]
    StoreTransactionConflict {
        /// Terminal status reported by the store
        status: TxnStatus,
    },

    /// Store backend operation failed
    #[error("Store operation failed: {operation}: {message}")]
    StoreIo {
        /// The operation that failed (e.g., "keys", "hgetall", "commit")
        operation: String,
        /// Error message
        message: String,
    },

    /// Attribute not present in the table schema
    #[error("Unknown column '{column}' for table '{table}'")]
    UnknownRowAttribute {
        /// Table name
        table: String,
        /// Rejected column
        column: String,
    },

    /// Attribute value does not fit the column type
    #[error("Column '{column}' of table '{table}' expects {expected}")]
    AttributeType {
        /// Table name
        table: String,
        /// Rejected column
        column: String,
        /// Schema type of the column
        expected: ColumnType,
    },

    /// Attribute belongs to a column the collector owns at runtime
    #[error("Column '{column}' of table '{table}' is written by the collector only")]
    RuntimeAttribute {
        /// Table name
        table: String,
        /// Rejected column
        column: String,
    },

    /// No administrative row to receive the global configuration
    #[error("No row in table '{table}' to receive the buffer monitoring configuration")]
    MissingSystemRow {
        /// Administrative table name
        table: String,
    },

    /// Control socket error
    #[error("Control channel error: {0}")]
    Control(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BufmondError {
    /// Creates a store error.
    pub fn store_io(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreIo {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a catalog parse error.
    pub fn parse_incomplete(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CatalogParseIncomplete {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a missing-catalog error.
    pub fn catalog_missing(reason: impl Into<String>) -> Self {
        Self::CatalogMissingAfterReady {
            reason: reason.into(),
        }
    }

    /// Returns true if the daemon must terminate on this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BufmondError::CatalogMissingAfterReady { .. } | BufmondError::Configuration(_)
        )
    }

    /// Returns true if the next store change may succeed where this failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BufmondError::CatalogParseIncomplete { .. }
                | BufmondError::StoreTransactionConflict { .. }
                | BufmondError::StoreIo { .. }
                | BufmondError::MissingSystemRow { .. }
        )
    }
}

/// Result type for bufmond operations
pub type Result<T> = std::result::Result<T, BufmondError>;
