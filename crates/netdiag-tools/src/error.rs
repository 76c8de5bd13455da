//! Error types for netdiag-tools

use thiserror::Error;

/// Tool error type
#[derive(Debug, Error)]
pub enum Error {
    /// Tool not found
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Tool registration rejected
    #[error("invalid tool registration: {0}")]
    Registration(String),

    /// Tool or executor failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Inventory lookup failed
    #[error("inventory error: {0}")]
    Inventory(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
