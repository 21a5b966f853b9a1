//! Error types for the construct substrate.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while building or synthesizing a construct tree.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid construct id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error("There is already a construct with id '{id}' in '{scope}'")]
    DuplicateId { id: String, scope: String },

    #[error("Logical id '{logical_id}' is already used in stack '{stack}'")]
    DuplicateLogicalId { logical_id: String, stack: String },

    #[error("Unknown construct node: {0}")]
    UnknownNode(usize),

    #[error("Construct '{0}' is not a resource")]
    NotAResource(String),

    #[error("Construct '{0}' is not a stack")]
    NotAStack(String),

    #[error("Construct '{0}' is not defined inside a stack")]
    NotInStack(String),

    #[error("Cannot look up {provider} context: stack '{stack}' has no concrete account and region")]
    EnvironmentAgnostic { provider: String, stack: String },

    #[error("Cannot reference '{logical_id}' of stack '{producer}' from stack '{consumer}'")]
    CrossStackReference {
        logical_id: String,
        producer: String,
        consumer: String,
    },

    #[error("Cannot make '{dependent}' depend on '{dependency}': they are not in the same template")]
    CrossStackDependency { dependent: String, dependency: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
