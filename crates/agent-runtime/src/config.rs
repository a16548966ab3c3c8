//! Per-agent configuration and per-run overrides

use agent_core::{Error, EventBus, ModelSettings, Result, RetryPolicy};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::model::Model;

/// Optional configuration; unset fields fall back to the next layer
///
/// An agent carries one as its defaults and a caller may pass another as a
/// per-run override. Merging is field by field, the override winning.
#[derive(Clone, Default)]
pub struct AgentConfig {
    pub model: Option<Arc<dyn Model>>,
    pub settings: Option<ModelSettings>,
    /// Runtime that tool bodies are spawned on
    pub executor: Option<Handle>,
    pub events: Option<EventBus>,
    /// Outer retry around a whole model exchange
    pub exchange_retry: Option<RetryPolicy>,
    /// Delay and retryable set for tool calls
    pub tool_retry: Option<RetryPolicy>,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .field("settings", &self.settings)
            .field("executor", &self.executor.is_some())
            .field("events", &self.events)
            .field("exchange_retry", &self.exchange_retry)
            .field("tool_retry", &self.tool_retry)
            .finish()
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: Arc<dyn Model>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_executor(mut self, executor: Handle) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_exchange_retry(mut self, policy: RetryPolicy) -> Self {
        self.exchange_retry = Some(policy);
        self
    }

    pub fn with_tool_retry(mut self, policy: RetryPolicy) -> Self {
        self.tool_retry = Some(policy);
        self
    }

    /// `overrides` laid over `self`
    pub fn merge(&self, overrides: &AgentConfig) -> AgentConfig {
        AgentConfig {
            model: overrides.model.clone().or_else(|| self.model.clone()),
            settings: overrides.settings.clone().or_else(|| self.settings.clone()),
            executor: overrides.executor.clone().or_else(|| self.executor.clone()),
            events: overrides.events.clone().or_else(|| self.events.clone()),
            exchange_retry: overrides
                .exchange_retry
                .clone()
                .or_else(|| self.exchange_retry.clone()),
            tool_retry: overrides.tool_retry.clone().or_else(|| self.tool_retry.clone()),
        }
    }

    /// Fill the gaps with library defaults; a model is mandatory
    pub fn resolve(self) -> Result<ResolvedConfig> {
        let model = self
            .model
            .ok_or_else(|| Error::Configuration("no model configured".to_string()))?;
        let defaults = agent_utils::Defaults::default();

        Ok(ResolvedConfig {
            model,
            settings: self
                .settings
                .unwrap_or_else(|| ModelSettings::from_defaults(&defaults)),
            executor: self.executor,
            events: self.events.unwrap_or_default(),
            exchange_retry: self.exchange_retry.unwrap_or_else(|| {
                RetryPolicy::new(defaults.exchange_attempts, defaults.retry_delay())
            }),
            tool_retry: self
                .tool_retry
                .unwrap_or_else(|| RetryPolicy::new(1, defaults.retry_delay())),
        })
    }
}

/// Configuration in effect for one run
#[derive(Clone)]
pub struct ResolvedConfig {
    pub model: Arc<dyn Model>,
    pub settings: ModelSettings,
    pub executor: Option<Handle>,
    pub events: EventBus,
    pub exchange_retry: RetryPolicy,
    pub tool_retry: RetryPolicy,
}
