//! Error types for network resolution.

use thiserror::Error;

use orca_core::CoreError;

/// Result type alias for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors that can occur while resolving network resources.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Invalid context value for '{key}': {source}")]
    InvalidContext {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid port range {from}-{to}")]
    InvalidPortRange { from: u16, to: u16 },
}
