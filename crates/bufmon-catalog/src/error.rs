//! Error types for catalog generation

use thiserror::Error;

/// Catalog generator errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The ASIC family has no registered profile
    #[error("Unsupported ASIC profile '{0}'")]
    UnsupportedProfile(String),

    /// Port count outside the accepted range
    #[error("Invalid port count {0}: at least one port is required")]
    InvalidPortCount(u32),

    /// Catalog file could not be written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog could not be encoded
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;
