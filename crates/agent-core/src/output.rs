//! Terminal result of a run

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AgentError, AgentMessage, ErrorKind, UsageSnapshot};

/// What a run returns, successful or not
///
/// The history is always present: `all_messages` is the seeded history
/// followed by everything appended during the run, and `new_messages` is the
/// appended suffix alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Final structured output; `None` on failure
    pub data: Option<Value>,
    pub new_messages: Vec<AgentMessage>,
    pub all_messages: Vec<AgentMessage>,
    pub usage: UsageSnapshot,
    pub error: AgentError,
}

impl AgentOutput {
    pub fn success(
        data: Value,
        new_messages: Vec<AgentMessage>,
        all_messages: Vec<AgentMessage>,
        usage: UsageSnapshot,
    ) -> Self {
        Self {
            data: Some(data),
            new_messages,
            all_messages,
            usage,
            error: AgentError::success(),
        }
    }

    pub fn error(
        error: AgentError,
        new_messages: Vec<AgentMessage>,
        all_messages: Vec<AgentMessage>,
        usage: UsageSnapshot,
    ) -> Self {
        Self {
            data: None,
            new_messages,
            all_messages,
            usage,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_success()
    }

    pub fn error_kind(&self) -> ErrorKind {
        self.error.kind
    }

    /// Deserialize the output into an application type
    pub fn data_as<T: DeserializeOwned>(&self) -> crate::Result<Option<T>> {
        match &self.data {
            None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    /// The output as text: strings verbatim, anything else as compact JSON
    pub fn text(&self) -> Option<String> {
        self.data.as_ref().map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    }
}
