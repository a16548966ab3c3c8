//! Runtime holding the resources shared by a family of agents
//!
//! The AgentRuntime owns the model, event bus, tool executor, approval
//! policy and retry defaults. Agents created through [`AgentRuntime::agent`]
//! start from these and may override any of them.

use agent_core::{EventBus, ModelSettings, Result, RetryPolicy};
use agent_tools::{ApprovalSeeker, RegisteredTool};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

use crate::config::AgentConfig;
use crate::executor::AgentExecutorBuilder;
use crate::model::Model;

/// Factory for agents sharing one model and one configuration
///
/// # Example
///
/// ```no_run
/// use agent_runtime::{AgentInput, AgentRuntime, Model};
/// use std::sync::Arc;
///
/// # async fn example(model: Arc<dyn Model>) -> agent_core::Result<()> {
/// let runtime = AgentRuntime::builder().model(model).build()?;
///
/// let greeter = runtime
///     .agent("greeter")
///     .role("You greet people by name.")
///     .build()?;
///
/// let output = greeter.execute(AgentInput::new("Say hello")).await?;
/// println!("{:?}", output.text());
/// # Ok(())
/// # }
/// ```
pub struct AgentRuntime {
    config: AgentConfig,
    approval: Option<Arc<dyn ApprovalSeeker>>,
    shared_tools: Vec<RegisteredTool>,
}

impl AgentRuntime {
    pub fn builder() -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::new()
    }

    /// Configuration handed to every agent
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Tools registered on every agent
    pub fn shared_tools(&self) -> &[RegisteredTool] {
        &self.shared_tools
    }

    /// Start building an agent wired to this runtime
    pub fn agent(&self, name: impl Into<String>) -> AgentExecutorBuilder {
        let builder = AgentExecutorBuilder::new(name)
            .config(self.config.clone())
            .tools(self.shared_tools.iter().cloned());
        match &self.approval {
            Some(approval) => builder.approval(approval.clone()),
            None => builder,
        }
    }
}

/// Builder for AgentRuntime
#[derive(Default)]
pub struct AgentRuntimeBuilder {
    config: AgentConfig,
    approval: Option<Arc<dyn ApprovalSeeker>>,
    shared_tools: Vec<RegisteredTool>,
}

impl AgentRuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: Arc<dyn Model>) -> Self {
        self.config.model = Some(model);
        self
    }

    pub fn settings(mut self, settings: ModelSettings) -> Self {
        self.config.settings = Some(settings);
        self
    }

    /// Run tool bodies on this runtime instead of the caller's
    pub fn executor(mut self, executor: Handle) -> Self {
        self.config.executor = Some(executor);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.config.events = Some(events);
        self
    }

    pub fn exchange_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.exchange_retry = Some(policy);
        self
    }

    pub fn tool_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.tool_retry = Some(policy);
        self
    }

    pub fn approval(mut self, approval: Arc<dyn ApprovalSeeker>) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn tool(mut self, tool: RegisteredTool) -> Self {
        self.shared_tools.push(tool);
        self
    }

    /// Build the runtime
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not set
    pub fn build(self) -> Result<AgentRuntime> {
        if self.config.model.is_none() {
            return Err(agent_core::Error::InitializationFailed(
                "Model not set".to_string(),
            ));
        }
        info!(
            shared_tools = self.shared_tools.len(),
            events = self.config.events.is_some(),
            "Agent runtime built"
        );

        Ok(AgentRuntime {
            config: self.config,
            approval: self.approval,
            shared_tools: self.shared_tools,
        })
    }
}
