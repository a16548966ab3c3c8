//! Error types for agent-core
//!
//! Two layers live here. [`ErrorKind`] is the closed taxonomy attached to
//! structured results (run outputs and tool responses); [`Error`] is the
//! `Result` error for the few failures that are not folded into a result.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for agent-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for agent operations
#[derive(Error, Debug)]
pub enum Error {
    /// Generic error message
    #[error("{0}")]
    Generic(String),

    /// Agent initialization failed
    #[error("Agent initialization failed: {0}")]
    InitializationFailed(String),

    /// Agent processing failed
    #[error("Agent processing failed: {0}")]
    ProcessingFailed(String),

    /// Required configuration is missing or inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The model boundary failed in a way it could not express as a result
    #[error("Model call failed: {0}")]
    Model(String),

    /// Value could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Closed taxonomy of run and tool-call outcomes
///
/// `Success` is the "no error" sentinel. Each kind carries a static
/// retryable flag consulted by [`crate::RetryPolicy`] unless the policy
/// overrides the retryable set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Success,
    NoResponse,
    Refused,
    Filtered,
    LengthExceeded,
    ToolCallPermanentFailure,
    ToolCallTemporaryFailure,
    ToolCallTimeout,
    JsonError,
    SerializationError,
    GenericModelCallFailure,
    DataValidationFailure,
    ModelRunTerminated,
    Unknown,
}

impl ErrorKind {
    /// Every kind, in declaration order
    pub const ALL: [ErrorKind; 14] = [
        ErrorKind::Success,
        ErrorKind::NoResponse,
        ErrorKind::Refused,
        ErrorKind::Filtered,
        ErrorKind::LengthExceeded,
        ErrorKind::ToolCallPermanentFailure,
        ErrorKind::ToolCallTemporaryFailure,
        ErrorKind::ToolCallTimeout,
        ErrorKind::JsonError,
        ErrorKind::SerializationError,
        ErrorKind::GenericModelCallFailure,
        ErrorKind::DataValidationFailure,
        ErrorKind::ModelRunTerminated,
        ErrorKind::Unknown,
    ];

    /// Whether a failure of this kind may succeed when attempted again
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::NoResponse
                | ErrorKind::ToolCallTemporaryFailure
                | ErrorKind::JsonError
                | ErrorKind::GenericModelCallFailure
        )
    }

    /// `true` only for the `Success` sentinel
    pub fn is_success(self) -> bool {
        self == ErrorKind::Success
    }

    /// Stable upper-case identifier, identical to the serialized form
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Success => "SUCCESS",
            ErrorKind::NoResponse => "NO_RESPONSE",
            ErrorKind::Refused => "REFUSED",
            ErrorKind::Filtered => "FILTERED",
            ErrorKind::LengthExceeded => "LENGTH_EXCEEDED",
            ErrorKind::ToolCallPermanentFailure => "TOOL_CALL_PERMANENT_FAILURE",
            ErrorKind::ToolCallTemporaryFailure => "TOOL_CALL_TEMPORARY_FAILURE",
            ErrorKind::ToolCallTimeout => "TOOL_CALL_TIMEOUT",
            ErrorKind::JsonError => "JSON_ERROR",
            ErrorKind::SerializationError => "SERIALIZATION_ERROR",
            ErrorKind::GenericModelCallFailure => "GENERIC_MODEL_CALL_FAILURE",
            ErrorKind::DataValidationFailure => "DATA_VALIDATION_FAILURE",
            ErrorKind::ModelRunTerminated => "MODEL_RUN_TERMINATED",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-level error attached to every [`crate::AgentOutput`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AgentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The "no error" value
    pub fn success() -> Self {
        Self::new(ErrorKind::Success, "Success")
    }

    pub fn is_success(&self) -> bool {
        self.kind.is_success()
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
