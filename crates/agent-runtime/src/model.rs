//! Model boundary
//!
//! The executor never talks to a provider directly. It hands a [`Model`]
//! the current history snapshot, the output schema, the tool catalogue and a
//! tool runner; the model decides whether to run tools (and does so through
//! the runner) or to finish.

use agent_core::{AgentError, MessagePayload, Result, RunContext};
use agent_tools::{ToolDefinition, ToolRunner};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedSender;

use crate::extension::{AgentInfo, Extension};

/// Everything a model needs for one exchange
#[derive(Clone)]
pub struct ModelInput {
    /// Run context carrying the history snapshot for this exchange
    pub context: Arc<RunContext>,
    /// JSON schema the final output must satisfy
    pub output_schema: Value,
    /// Catalogue definitions in registration order
    pub tools: Vec<ToolDefinition>,
    pub tool_runner: Arc<dyn ToolRunner>,
    pub extensions: Vec<Arc<dyn Extension>>,
    pub agent: AgentInfo,
}

/// Decision returned by one exchange
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// Tool calls were executed; append these payloads and exchange again
    Continue(Vec<MessagePayload>),
    /// The run is over for this attempt
    Complete {
        /// Payloads produced before finishing (text, tool pairs)
        messages: Vec<MessagePayload>,
        /// Raw final output, or the run-level error
        result: std::result::Result<Value, AgentError>,
    },
}

impl ModelTurn {
    pub fn output(value: Value) -> Self {
        Self::Complete {
            messages: Vec::new(),
            result: Ok(value),
        }
    }

    pub fn failed(error: AgentError) -> Self {
        Self::Complete {
            messages: Vec::new(),
            result: Err(error),
        }
    }
}

/// Incremental output sink for streaming runs
///
/// Every chunk is accumulated and, when a receiver is attached, forwarded.
#[derive(Clone, Default)]
pub struct StreamSink {
    buffer: Arc<Mutex<Vec<u8>>>,
    forward: Option<UnboundedSender<Vec<u8>>>,
}

impl std::fmt::Debug for StreamSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSink")
            .field("buffered", &self.len())
            .field("forwarding", &self.forward.is_some())
            .finish()
    }
}

impl StreamSink {
    pub fn new(forward: Option<UnboundedSender<Vec<u8>>>) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            forward,
        }
    }

    pub fn write(&self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(chunk);
        if let Some(forward) = &self.forward {
            // A dropped receiver only stops forwarding
            let _ = forward.send(chunk.to_vec());
        }
    }

    pub fn write_str(&self, chunk: &str) {
        self.write(chunk.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Everything written so far, decoded lossily
    pub fn text(&self) -> String {
        self.text_since(0)
    }

    /// Text written after the first `start` bytes, decoded lossily
    pub fn text_since(&self, start: usize) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(buffer.get(start..).unwrap_or_default()).into_owned()
    }
}

/// A language model seen through the executor's eyes
///
/// Implementations must run every pending tool call of a turn through
/// `input.tool_runner` and report the resulting payloads. Returning `Err`
/// is reserved for unexpected failures; it ends the run and reaches the
/// caller unchanged.
#[async_trait]
pub trait Model: Send + Sync {
    fn name(&self) -> &str {
        "model"
    }

    async fn exchange_messages(&self, input: ModelInput) -> Result<ModelTurn>;

    /// Streaming exchange; by default the final text is written in one chunk
    async fn exchange_messages_streaming(
        &self,
        input: ModelInput,
        sink: StreamSink,
    ) -> Result<ModelTurn> {
        let turn = self.exchange_messages(input).await?;
        if let ModelTurn::Complete { result: Ok(value), .. } = &turn {
            match value {
                Value::String(text) => sink.write_str(text),
                Value::Null => {}
                other => sink.write_str(&other.to_string()),
            }
        }
        Ok(turn)
    }
}
