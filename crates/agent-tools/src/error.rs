//! Error types for tool registration and execution

use agent_core::{ErrorKind, Retryable};
use std::time::Duration;
use thiserror::Error;

/// Result type for tool operations
pub type Result<T> = std::result::Result<T, ToolError>;

/// Errors raised while registering or running a tool
///
/// Every variant maps to an [`ErrorKind`]; the invocation subsystem turns
/// them into `ToolCallResponse`s and never lets them escape to the runtime.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Unexpected failure inside a tool body; treated as transient
    #[error("Tool execution failed: {0}")]
    Failed(String),

    /// Deliberate failure the tool knows cannot be fixed by retrying
    #[error("Tool failed permanently: {0}")]
    Permanent(String),

    /// Arguments did not match the declared parameters
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Tool read the run context without declaring itself context-aware
    #[error("Tool '{0}' is not context-aware")]
    ContextUnavailable(String),

    /// Tool body panicked
    #[error("Tool panicked: {0}")]
    Panicked(String),

    /// Tool body did not finish within its timeout
    #[error("Tool call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Failure reported by an external tool callable
    #[error("External tool failed ({kind}): {message}")]
    External { kind: ErrorKind, message: String },

    /// Return value could not be serialized
    #[error("Failed to serialize tool output: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Tool name registered twice
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    /// Error propagated from a tool body with `?`
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ToolError {
    /// Taxonomy kind reported in the tool response
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Failed(_) | ToolError::Panicked(_) | ToolError::Other(_) => {
                ErrorKind::ToolCallTemporaryFailure
            }
            ToolError::Permanent(_)
            | ToolError::InvalidArguments(_)
            | ToolError::ContextUnavailable(_)
            | ToolError::DuplicateTool(_) => ErrorKind::ToolCallPermanentFailure,
            ToolError::Timeout(_) => ErrorKind::ToolCallTimeout,
            ToolError::Serialization(_) => ErrorKind::SerializationError,
            ToolError::External { kind, .. } => match kind {
                ErrorKind::Success => ErrorKind::Unknown,
                other => *other,
            },
        }
    }
}

impl Retryable for ToolError {
    fn error_kind(&self) -> ErrorKind {
        self.kind()
    }

    /// A hung call is never re-attempted, whatever the retryable set says
    fn is_final(&self) -> bool {
        self.kind() == ErrorKind::ToolCallTimeout
    }
}
