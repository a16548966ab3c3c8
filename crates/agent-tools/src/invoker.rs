//! Tool invocation subsystem
//!
//! Turns the model's [`ToolCallRequest`]s into [`ToolCallResponse`]s. Every
//! call goes through approval, catalogue lookup, argument decoding and a
//! retry loop whose attempts each run on the executor under the tool's
//! timeout. Failures never escape as errors: they are folded into the
//! response with the matching [`ErrorKind`].

use agent_core::{
    AgentError, AgentEvent, ErrorKind, EventBus, MessagePayload, RetryPolicy, RunContext,
    ToolCallRequest, ToolCallResponse, pair_tool_calls,
};
use agent_utils::preview;
use async_trait::async_trait;
use futures::future::join_all;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::params::decode_arguments;
use crate::tool::{ToolInvocation, ToolKind, render_payload};
use crate::{ApprovalSeeker, AutoApprove, RegisteredTool, Result, ToolCatalogue, ToolError};

/// Outcome of one batch of tool calls
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    pub requests: Vec<ToolCallRequest>,
    /// One response per request, same order
    pub responses: Vec<ToolCallResponse>,
}

impl TurnResult {
    /// Requests and responses interleaved for the history
    pub fn payloads(&self) -> Vec<MessagePayload> {
        pair_tool_calls(&self.requests, self.responses.clone())
    }

    /// Run-level failure of the batch, if any
    ///
    /// A permanently failed call, or a transient one whose retries are
    /// exhausted, ends the run. Timeouts are left to the model.
    pub fn failure(&self) -> Option<AgentError> {
        self.responses
            .iter()
            .find(|r| !r.is_success() && r.kind != ErrorKind::ToolCallTimeout)
            .map(|r| {
                AgentError::new(
                    ErrorKind::ToolCallPermanentFailure,
                    format!("Tool call '{}' ({}) failed: {}", r.tool_name, r.call_id, r.response),
                )
            })
    }
}

/// Executes the tool calls of a model turn
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run a single call to completion; never fails
    async fn run_tool(
        &self,
        context: Arc<RunContext>,
        request: ToolCallRequest,
    ) -> ToolCallResponse;

    /// Run a batch, concurrently unless the run disabled parallel calls
    async fn run_turn(
        &self,
        context: Arc<RunContext>,
        requests: Vec<ToolCallRequest>,
    ) -> TurnResult {
        let responses = if context.settings().parallel_tool_calls {
            join_all(
                requests
                    .iter()
                    .map(|request| self.run_tool(context.clone(), request.clone())),
            )
            .await
        } else {
            let mut responses = Vec::with_capacity(requests.len());
            for request in &requests {
                responses.push(self.run_tool(context.clone(), request.clone()).await);
            }
            responses
        };
        TurnResult {
            requests,
            responses,
        }
    }
}

/// Default [`ToolRunner`] backed by a [`ToolCatalogue`]
pub struct ToolInvoker {
    agent_name: String,
    catalogue: Arc<ToolCatalogue>,
    approval: Arc<dyn ApprovalSeeker>,
    events: EventBus,
    retry: RetryPolicy,
    executor: Option<Handle>,
}

impl ToolInvoker {
    pub fn new(agent_name: impl Into<String>, catalogue: Arc<ToolCatalogue>) -> Self {
        Self {
            agent_name: agent_name.into(),
            catalogue,
            approval: Arc::new(AutoApprove),
            events: EventBus::new(),
            retry: RetryPolicy::no_retry(),
            executor: None,
        }
    }

    pub fn with_approval(mut self, approval: Arc<dyn ApprovalSeeker>) -> Self {
        self.approval = approval;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Delay and retryable set for tool retries; attempts come from each tool
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runtime that tool bodies are spawned on; defaults to the caller's
    pub fn with_executor(mut self, executor: Handle) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn catalogue(&self) -> &Arc<ToolCatalogue> {
        &self.catalogue
    }

    async fn execute_with_retry(
        &self,
        context: &Arc<RunContext>,
        tool: &Arc<RegisteredTool>,
        request: &ToolCallRequest,
    ) -> ToolCallResponse {
        let policy = self
            .retry
            .clone()
            .with_max_attempts(tool.definition.retries.saturating_add(1));

        let result = policy
            .execute(&request.tool_name, |attempt| {
                self.attempt(context.clone(), tool.clone(), request.clone(), attempt)
            })
            .await;

        match result {
            Ok(payload) => ToolCallResponse::success(request, payload),
            Err(error) => ToolCallResponse::failure(request, error.kind(), error.to_string()),
        }
    }

    async fn attempt(
        &self,
        context: Arc<RunContext>,
        tool: Arc<RegisteredTool>,
        request: ToolCallRequest,
        attempt: u32,
    ) -> Result<String> {
        let timeout = tool.definition.timeout;
        debug!(
            tool = %request.tool_name,
            call_id = %request.call_id,
            attempt,
            timeout_ms = timeout.as_millis() as u64,
            "Dispatching tool"
        );

        let mut handle = self.spawn(dispatch(context, tool, request));
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_panic() => {
                Err(ToolError::Panicked(panic_message(join_error.into_panic())))
            }
            Ok(Err(join_error)) => Err(ToolError::Failed(join_error.to_string())),
            Err(_) => {
                handle.abort();
                Err(ToolError::Timeout(timeout))
            }
        }
    }

    fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match &self.executor {
            Some(handle) => handle.spawn(future),
            None => tokio::spawn(future),
        }
    }
}

#[async_trait]
impl ToolRunner for ToolInvoker {
    async fn run_tool(
        &self,
        context: Arc<RunContext>,
        request: ToolCallRequest,
    ) -> ToolCallResponse {
        if !self.approval.approve(&self.agent_name, &context, &request).await {
            info!(
                agent = %self.agent_name,
                tool = %request.tool_name,
                call_id = %request.call_id,
                "Tool call denied"
            );
            self.events
                .emit(AgentEvent::ToolCallApprovalDenied {
                    agent: self.agent_name.clone(),
                    run_id: context.run_id().to_string(),
                    call_id: request.call_id.clone(),
                    tool_name: request.tool_name.clone(),
                })
                .await;
            return ToolCallResponse::failure(
                &request,
                ErrorKind::ToolCallPermanentFailure,
                format!("Tool call '{}' was not approved", request.tool_name),
            );
        }

        let started = Instant::now();
        info!(
            agent = %self.agent_name,
            tool = %request.tool_name,
            call_id = %request.call_id,
            arguments = %preview(&request.arguments, 200),
            "Calling tool"
        );
        self.events
            .emit(AgentEvent::ToolCalled {
                agent: self.agent_name.clone(),
                run_id: context.run_id().to_string(),
                call_id: request.call_id.clone(),
                tool_name: request.tool_name.clone(),
                arguments: request.arguments.clone(),
            })
            .await;

        let response = match self.catalogue.get(&request.tool_name) {
            Some(tool) => {
                context.usage().add_tool_calls(1);
                self.execute_with_retry(&context, &tool, &request).await
            }
            None => ToolCallResponse::failure(
                &request,
                ErrorKind::ToolCallPermanentFailure,
                format!("Tool not found: {}", request.tool_name),
            ),
        };

        let elapsed = started.elapsed();
        if response.is_success() {
            info!(
                tool = %request.tool_name,
                call_id = %request.call_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "Tool call succeeded"
            );
        } else {
            warn!(
                tool = %request.tool_name,
                call_id = %request.call_id,
                kind = %response.kind,
                error = %preview(&response.response, 200),
                "Tool call failed"
            );
        }

        self.events
            .emit(AgentEvent::ToolCallCompleted {
                agent: self.agent_name.clone(),
                run_id: context.run_id().to_string(),
                call_id: request.call_id.clone(),
                tool_name: request.tool_name.clone(),
                success: response.is_success(),
                kind: response.kind,
                payload: response.response.clone(),
                elapsed,
            })
            .await;

        response
    }
}

async fn dispatch(
    context: Arc<RunContext>,
    tool: Arc<RegisteredTool>,
    request: ToolCallRequest,
) -> Result<String> {
    match &tool.kind {
        ToolKind::Internal { params, handler } => {
            let arguments = decode_arguments(params, &request.arguments, tool.definition.strict)?;
            let invocation = ToolInvocation {
                call_id: request.call_id,
                tool_name: request.tool_name,
                context: tool.definition.context_aware.then_some(context),
                arguments,
            };
            let value = handler.call(invocation).await?;
            render_payload(&value)
        }
        ToolKind::External(handler) => {
            let response = handler
                .call(context, &request.tool_name, &request.arguments)
                .await;
            if response.kind.is_success() {
                Ok(response.payload)
            } else {
                Err(ToolError::External {
                    kind: response.kind,
                    message: response.payload,
                })
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool body panicked".to_string()
    }
}
