use serde_json::Value as JsonValue;
use thiserror::Error;

/// Error type for client and worker operations.
#[derive(Debug, Error)]
pub enum GreeterError {
    /// The configuration is unusable. Raised before any work is attempted.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// A workflow with the same name is already in the registry.
    #[error("workflow `{name}` is already registered")]
    WorkflowAlreadyRegistered { name: String },

    /// The workflow must be registered before it can be started.
    #[error("workflow `{name}` is not registered")]
    WorkflowNotRegistered { name: String },

    /// Waiting on a run outlived the caller's deadline.
    #[error("workflow {workflow_id} did not reach a terminal state within {timeout_secs}s")]
    WaitTimeout {
        workflow_id: uuid::Uuid,
        timeout_secs: u64,
    },

    /// No run row exists for the given id.
    #[error("workflow {workflow_id} not found")]
    WorkflowNotFound { workflow_id: uuid::Uuid },

    /// The awaited run reached the failed state.
    #[error("workflow {workflow_id} failed: {message}")]
    WorkflowFailed {
        workflow_id: uuid::Uuid,
        message: String,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for client and worker operations.
pub type GreeterResult<T> = Result<T, GreeterError>;

/// Result type alias for workflow bodies.
///
/// Workflow implementations use `anyhow` internally; the worker records the
/// failure and decides between retry and permanent failure.
pub type WorkflowResult<T> = Result<T, anyhow::Error>;

/// Serialize a workflow failure for storage on the run row.
pub fn serialize_failure(err: &anyhow::Error) -> JsonValue {
    serde_json::json!({
        "name": "Error",
        "message": err.to_string(),
        "backtrace": format!("{:?}", err),
    })
}
