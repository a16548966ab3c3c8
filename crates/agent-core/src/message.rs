//! Message history types
//!
//! A run's history is an append-only list of [`AgentMessage`]s. Messages are
//! never mutated after they are appended; producers hand the runtime a
//! [`MessagePayload`] and the runtime stamps it with ids and a timestamp via
//! [`MessageStamper`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ErrorKind;

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque id supplied by the model; echoed by the response
    pub call_id: String,
    pub tool_name: String,
    /// Raw argument payload as produced by the model (usually JSON)
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments: arguments.into(),
        }
    }
}

/// The outcome of exactly one [`ToolCallRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub call_id: String,
    pub tool_name: String,
    /// `ErrorKind::Success` when the call succeeded
    pub kind: ErrorKind,
    /// Serialized return value, or the failure description
    pub response: String,
    pub sent_at: DateTime<Utc>,
}

impl ToolCallResponse {
    pub fn success(request: &ToolCallRequest, response: impl Into<String>) -> Self {
        Self::with_kind(request, ErrorKind::Success, response)
    }

    pub fn failure(request: &ToolCallRequest, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::with_kind(request, kind, message)
    }

    fn with_kind(request: &ToolCallRequest, kind: ErrorKind, response: impl Into<String>) -> Self {
        Self {
            call_id: request.call_id.clone(),
            tool_name: request.tool_name.clone(),
            kind,
            response: response.into(),
            sent_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind.is_success()
    }
}

/// Variant payload of a history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Rendered system prompt. `dynamic` prompts are regenerated every run and
    /// are stripped from seeded history in streaming mode.
    SystemPrompt { content: String, dynamic: bool },
    UserPrompt { content: String },
    ToolCallRequest(ToolCallRequest),
    ToolCallResponse(ToolCallResponse),
    TextOutput { content: String },
    StructuredOutput { content: Value },
}

impl MessagePayload {
    pub fn system_prompt(content: impl Into<String>) -> Self {
        Self::SystemPrompt {
            content: content.into(),
            dynamic: true,
        }
    }

    pub fn user_prompt(content: impl Into<String>) -> Self {
        Self::UserPrompt {
            content: content.into(),
        }
    }

    pub fn text_output(content: impl Into<String>) -> Self {
        Self::TextOutput {
            content: content.into(),
        }
    }

    /// Short lowercase name of the variant, for logs
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::SystemPrompt { .. } => "system_prompt",
            Self::UserPrompt { .. } => "user_prompt",
            Self::ToolCallRequest(_) => "tool_call_request",
            Self::ToolCallResponse(_) => "tool_call_response",
            Self::TextOutput { .. } => "text_output",
            Self::StructuredOutput { .. } => "structured_output",
        }
    }
}

/// An immutable entry in a run's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub session_id: Option<String>,
    pub run_id: String,
    /// Unique and monotonically increasing within a history
    pub message_id: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: MessagePayload,
}

impl AgentMessage {
    pub fn is_system_prompt(&self) -> bool {
        matches!(self.payload, MessagePayload::SystemPrompt { .. })
    }

    pub fn tool_call_request(&self) -> Option<&ToolCallRequest> {
        match &self.payload {
            MessagePayload::ToolCallRequest(request) => Some(request),
            _ => None,
        }
    }

    pub fn tool_call_response(&self) -> Option<&ToolCallResponse> {
        match &self.payload {
            MessagePayload::ToolCallResponse(response) => Some(response),
            _ => None,
        }
    }
}

/// Assigns ids and timestamps to payloads for one run
///
/// Ids continue after the highest id found in the seeded history, so a
/// multi-turn conversation keeps unique, increasing ids across runs.
#[derive(Debug)]
pub struct MessageStamper {
    session_id: Option<String>,
    run_id: String,
    next_id: u64,
}

impl MessageStamper {
    pub fn new(
        session_id: Option<String>,
        run_id: impl Into<String>,
        seeded: &[AgentMessage],
    ) -> Self {
        let next_id = seeded
            .iter()
            .map(|m| m.message_id)
            .max()
            .map_or(1, |max| max + 1);
        Self {
            session_id,
            run_id: run_id.into(),
            next_id,
        }
    }

    pub fn stamp(&mut self, payload: MessagePayload) -> AgentMessage {
        let message_id = self.next_id;
        self.next_id += 1;
        AgentMessage {
            session_id: self.session_id.clone(),
            run_id: self.run_id.clone(),
            message_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Interleave a turn's requests with their responses
///
/// Responses are matched to requests by call id, so the result keeps the
/// request order no matter in which order the responses were produced.
/// A request without a response is paired with an `UNKNOWN` failure.
pub fn pair_tool_calls(
    requests: &[ToolCallRequest],
    responses: Vec<ToolCallResponse>,
) -> Vec<MessagePayload> {
    let mut responses: Vec<Option<ToolCallResponse>> = responses.into_iter().map(Some).collect();
    let mut payloads = Vec::with_capacity(requests.len() * 2);
    for request in requests {
        let response = responses
            .iter_mut()
            .find(|slot| {
                slot.as_ref()
                    .is_some_and(|response| response.call_id == request.call_id)
            })
            .and_then(Option::take)
            .unwrap_or_else(|| {
                ToolCallResponse::failure(request, ErrorKind::Unknown, "No response produced")
            });
        payloads.push(MessagePayload::ToolCallRequest(request.clone()));
        payloads.push(MessagePayload::ToolCallResponse(response));
    }
    payloads
}
