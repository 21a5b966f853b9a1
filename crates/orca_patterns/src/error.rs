//! Error types for deployment patterns.

use thiserror::Error;

use orca_core::CoreError;
use orca_network::NetworkError;

/// Result type alias for pattern operations.
pub type PatternResult<T> = Result<T, PatternError>;

/// Errors that can occur while building deployment patterns.
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Load-balanced service '{0}' needs a load balancer listener, but none is configured")]
    MissingListener(String),

    #[error("Service discovery for '{0}' needs a Cloud Map namespace, but none is configured")]
    MissingNamespace(String),

    #[error("Invalid service discovery for '{service}': {reason}")]
    InvalidServiceDiscovery { service: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
