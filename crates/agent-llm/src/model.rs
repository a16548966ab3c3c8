//! Model boundary over an [`LLMProvider`]
//!
//! Translates the run history into a completion request and the completion
//! back into a model turn. Structured output goes through a synthetic
//! [`FINAL_OUTPUT_TOOL`] whose input schema is the run's output schema;
//! calling it ends the run.

use agent_core::{
    AgentError, AgentMessage, Error, ErrorKind, MessagePayload, ProcessingMode, Result,
    ToolCallRequest, ToolCallResponse,
};
use agent_runtime::{Model, ModelInput, ModelTurn, StreamSink};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    CompletionRequest, CompletionResponse, ContentBlock, LLMProvider, Message, Role, StopReason,
    ToolDefinition,
};

/// Name of the tool the model calls to deliver its final answer
pub const FINAL_OUTPUT_TOOL: &str = "final_output";

const FINAL_OUTPUT_DESCRIPTION: &str =
    "Call this tool exactly once, when you are done, with your final answer as its input.";

/// [`Model`] backed by any [`LLMProvider`]
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    /// Completion request for one exchange
    pub fn build_request(input: &ModelInput) -> CompletionRequest {
        let context = &input.context;
        let settings = context.settings();
        let (system, messages) = convert_history(context.messages());

        let mut tools: Vec<ToolDefinition> = input.tools.iter().map(ToolDefinition::from).collect();
        if context.mode() == ProcessingMode::Direct {
            tools.push(ToolDefinition::new(
                FINAL_OUTPUT_TOOL,
                FINAL_OUTPUT_DESCRIPTION,
                input.output_schema.clone(),
            ));
        }

        let builder = CompletionRequest::builder(settings.model.clone())
            .messages(messages)
            .max_tokens(settings.max_tokens)
            .temperature(settings.temperature)
            .top_p(settings.top_p)
            .tools(tools);
        let builder = match system {
            Some(system) => builder.system(system),
            None => builder,
        };
        builder.build()
    }

    async fn exchange(&self, input: ModelInput, sink: Option<StreamSink>) -> Result<ModelTurn> {
        let request = Self::build_request(&input);
        let context = input.context.clone();
        debug!(
            agent = %input.agent.name,
            run_id = %context.run_id(),
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let result = match sink {
            None => self.provider.complete(request).await,
            Some(sink) => {
                let (tx, mut rx) = mpsc::unbounded_channel::<String>();
                let forward = async {
                    while let Some(chunk) = rx.recv().await {
                        sink.write_str(&chunk);
                    }
                };
                let (result, ()) =
                    tokio::join!(self.provider.complete_streaming(request, tx), forward);
                result
            }
        };

        context.usage().add_requests(1);
        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_transient() => {
                warn!(run_id = %context.run_id(), error = %e, "Transient provider failure");
                return Ok(ModelTurn::failed(AgentError::new(
                    ErrorKind::GenericModelCallFailure,
                    e.to_string(),
                )));
            }
            Err(e) => return Err(Error::Model(e.to_string())),
        };
        context.usage().add_tokens(
            response.usage.input_tokens as u64,
            response.usage.output_tokens as u64,
        );
        debug!(
            run_id = %context.run_id(),
            stop_reason = ?response.stop_reason,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Completion received"
        );

        interpret(input, response).await
    }
}

#[async_trait]
impl Model for ProviderModel {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn exchange_messages(&self, input: ModelInput) -> Result<ModelTurn> {
        self.exchange(input, None).await
    }

    async fn exchange_messages_streaming(
        &self,
        input: ModelInput,
        sink: StreamSink,
    ) -> Result<ModelTurn> {
        self.exchange(input, Some(sink)).await
    }
}

/// Turn a completion into the next step of the run
async fn interpret(input: ModelInput, response: CompletionResponse) -> Result<ModelTurn> {
    let stopped = match response.stop_reason {
        StopReason::MaxTokens => Some((
            ErrorKind::LengthExceeded,
            "Response truncated at the token limit",
        )),
        StopReason::Refusal => Some((ErrorKind::Refused, "Model refused to answer")),
        StopReason::ContentFilter => Some((
            ErrorKind::Filtered,
            "Response blocked by the content filter",
        )),
        StopReason::EndTurn | StopReason::StopSequence | StopReason::ToolUse => None,
    };
    if let Some((kind, message)) = stopped {
        return Ok(ModelTurn::failed(AgentError::new(kind, message)));
    }

    let mode = input.context.mode();
    let text = response.message.text();
    let mut final_output = None;
    let mut requests = Vec::new();
    for (id, name, arguments) in response.tool_uses() {
        if mode == ProcessingMode::Direct && name == FINAL_OUTPUT_TOOL {
            final_output.get_or_insert_with(|| arguments.clone());
        } else {
            requests.push(ToolCallRequest::new(id, name, arguments.to_string()));
        }
    }

    let mut messages = Vec::new();
    if !text.trim().is_empty() && (!requests.is_empty() || final_output.is_some()) {
        messages.push(MessagePayload::text_output(text.trim()));
    }

    // Pending tool calls win over a final answer given in the same turn
    if !requests.is_empty() {
        let turn = input.tool_runner.run_turn(input.context.clone(), requests).await;
        messages.extend(turn.payloads());
        return Ok(match turn.failure() {
            Some(error) => ModelTurn::Complete {
                messages,
                result: Err(error),
            },
            None => ModelTurn::Continue(messages),
        });
    }

    if let Some(value) = final_output {
        return Ok(ModelTurn::Complete {
            messages,
            result: Ok(value),
        });
    }

    let text = text.trim();
    if text.is_empty() {
        return Ok(ModelTurn::failed(AgentError::new(
            ErrorKind::NoResponse,
            "Model returned an empty response",
        )));
    }
    Ok(match mode {
        ProcessingMode::Streaming => ModelTurn::output(Value::String(text.to_string())),
        ProcessingMode::Direct => match parse_json_text(text) {
            Ok(value) => ModelTurn::output(value),
            Err(e) => ModelTurn::failed(AgentError::new(
                ErrorKind::JsonError,
                format!("Model output is not valid JSON: {e}"),
            )),
        },
    })
}

/// Parse JSON answered as plain text, tolerating a markdown fence
fn parse_json_text(text: &str) -> serde_json::Result<Value> {
    let body = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(text);
    serde_json::from_str(body.trim())
}

fn is_tool_payload(payload: &MessagePayload) -> bool {
    matches!(
        payload,
        MessagePayload::ToolCallRequest(_) | MessagePayload::ToolCallResponse(_)
    )
}

fn tool_use_block(request: &ToolCallRequest) -> ContentBlock {
    let input = serde_json::from_str(&request.arguments)
        .unwrap_or_else(|_| Value::String(request.arguments.clone()));
    ContentBlock::ToolUse {
        id: request.call_id.clone(),
        name: request.tool_name.clone(),
        input,
    }
}

fn tool_result_block(response: &ToolCallResponse) -> ContentBlock {
    ContentBlock::ToolResult {
        tool_use_id: response.call_id.clone(),
        content: response.response.clone(),
        is_error: (!response.is_success()).then_some(true),
    }
}

fn push_message(messages: &mut Vec<Message>, message: Message) {
    match messages.last_mut() {
        Some(last) if last.role == message.role => last.absorb(message),
        _ => messages.push(message),
    }
}

/// Split history into the latest system prompt and provider messages
///
/// Each run of tool request/response payloads becomes one assistant message
/// with the tool uses and one user message with the results. Adjacent
/// messages of the same role are merged.
pub fn convert_history(history: &[AgentMessage]) -> (Option<String>, Vec<Message>) {
    let mut system = None;
    let mut messages = Vec::new();
    let mut payloads = history.iter().map(|m| &m.payload).peekable();

    while let Some(payload) = payloads.next() {
        match payload {
            MessagePayload::SystemPrompt { content, .. } => system = Some(content.clone()),
            MessagePayload::UserPrompt { content } => {
                push_message(&mut messages, Message::user(content.clone()));
            }
            MessagePayload::TextOutput { content } => {
                push_message(&mut messages, Message::assistant(content.clone()));
            }
            MessagePayload::StructuredOutput { content } => {
                push_message(&mut messages, Message::assistant(content.to_string()));
            }
            MessagePayload::ToolCallRequest(_) | MessagePayload::ToolCallResponse(_) => {
                let mut uses = Vec::new();
                let mut results = Vec::new();
                let run = std::iter::once(payload)
                    .chain(std::iter::from_fn(|| payloads.next_if(|p| is_tool_payload(p))));
                for item in run {
                    match item {
                        MessagePayload::ToolCallRequest(request) => {
                            uses.push(tool_use_block(request));
                        }
                        MessagePayload::ToolCallResponse(response) => {
                            results.push(tool_result_block(response));
                        }
                        _ => {}
                    }
                }
                if !uses.is_empty() {
                    push_message(&mut messages, Message::blocks(Role::Assistant, uses));
                }
                if !results.is_empty() {
                    push_message(&mut messages, Message::blocks(Role::User, results));
                }
            }
        }
    }

    (system, messages)
}
