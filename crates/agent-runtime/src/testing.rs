//! Scripted model for tests
//!
//! Enabled in this crate's tests and, for downstream crates, through the
//! `testing` feature.

use agent_core::{AgentError, AgentMessage, Error, ErrorKind, Result, ToolCallRequest};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::executor::OUTPUT_KEY;
use crate::model::{Model, ModelInput, ModelTurn};

/// One scripted model response
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Run these calls through the tool runner
    ToolCalls(Vec<ToolCallRequest>),
    /// Finish with this raw final output
    Output(Value),
    /// Finish with a run-level error
    Error(AgentError),
    /// Fail the exchange itself
    Fail(String),
}

impl ScriptedTurn {
    pub fn call(call_id: &str, tool_name: &str, arguments: &str) -> Self {
        Self::ToolCalls(vec![ToolCallRequest::new(call_id, tool_name, arguments)])
    }

    /// Final output wrapped the way direct runs expect it
    pub fn output(value: impl Into<Value>) -> Self {
        let value: Value = value.into();
        Self::Output(json!({ OUTPUT_KEY: value }))
    }

    pub fn error(kind: ErrorKind, message: &str) -> Self {
        Self::Error(AgentError::new(kind, message))
    }
}

/// Model replaying a fixed script, one turn per exchange
///
/// Every exchange counts one request. The history seen by each exchange is
/// recorded; running past the end of the script is a model failure.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    tokens: (u64, u64),
    calls: AtomicU32,
    histories: Mutex<Vec<Vec<AgentMessage>>>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            ..Self::default()
        }
    }

    /// Tokens reported for every exchange
    pub fn with_tokens(mut self, request: u64, response: u64) -> Self {
        self.tokens = (request, response);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// History snapshot handed to each exchange, in order
    pub fn histories(&self) -> Vec<Vec<AgentMessage>> {
        self.histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn exchange_messages(&self, input: ModelInput) -> Result<ModelTurn> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let usage = input.context.usage();
        usage.add_requests(1);
        usage.add_tokens(self.tokens.0, self.tokens.1);
        self.histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(input.context.messages().to_vec());

        let next = self
            .turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            None => Err(Error::Model("script exhausted".to_string())),
            Some(ScriptedTurn::Fail(message)) => Err(Error::Model(message)),
            Some(ScriptedTurn::Output(value)) => Ok(ModelTurn::output(value)),
            Some(ScriptedTurn::Error(error)) => Ok(ModelTurn::failed(error)),
            Some(ScriptedTurn::ToolCalls(requests)) => {
                let turn = input
                    .tool_runner
                    .run_turn(input.context.clone(), requests)
                    .await;
                let messages = turn.payloads();
                Ok(match turn.failure() {
                    Some(error) => ModelTurn::Complete {
                        messages,
                        result: Err(error),
                    },
                    None => ModelTurn::Continue(messages),
                })
            }
        }
    }
}
