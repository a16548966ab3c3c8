//! Extension protocol
//!
//! Extensions are the pluggable behaviors an agent is composed with:
//! sub-agent registries, session memory, guardrails. The executor treats
//! them uniformly through the [`Extension`] trait and never needs to know
//! their concrete types.

use agent_core::{ProcessingMode, RunContext};
use agent_tools::RegisteredTool;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of the agent an extension is attached to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
    /// Tool names in catalogue order
    pub tools: Vec<String>,
}

/// A titled group of facts injected into the system prompt
///
/// Facts are knowledge the model may use but cannot call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactList {
    pub title: String,
    pub facts: Vec<Value>,
}

impl FactList {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            facts: Vec::new(),
        }
    }

    pub fn with_fact(mut self, fact: impl Into<Value>) -> Self {
        self.facts.push(fact.into());
        self
    }
}

/// Prompt content contributed by an extension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptFragment {
    pub objective: Option<String>,
    pub instructions: Vec<String>,
    pub hints: Vec<String>,
}

impl PromptFragment {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: Some(objective.into()),
            ..Self::default()
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.objective.is_none() && self.instructions.is_empty() && self.hints.is_empty()
    }
}

/// Pluggable capability attached to an agent
///
/// Every method has a no-op default, so an extension implements only the
/// hooks it needs.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Stable name, used in logs and as the prompt section heading
    fn name(&self) -> &str;

    /// Extra knowledge for the system prompt
    async fn facts(&self, _context: &RunContext, _agent: &AgentInfo) -> Vec<FactList> {
        Vec::new()
    }

    /// Objective, instructions and hints, composed after the agent's own role
    async fn additional_system_prompt(
        &self,
        _context: &RunContext,
        _agent: &AgentInfo,
        _mode: ProcessingMode,
    ) -> Option<PromptFragment> {
        None
    }

    /// Extra required field of the final structured output, as `(key, schema)`
    fn output_schema(&self, _mode: ProcessingMode) -> Option<(String, Value)> {
        None
    }

    /// Receives this extension's field of the final output, when present
    async fn consume(&self, _value: &Value, _context: &RunContext, _agent: &AgentInfo) {}

    /// Tools merged into the agent's catalogue when the agent is built
    fn tools(&self) -> Vec<RegisteredTool> {
        Vec::new()
    }

    /// Called once, after the agent owning this extension has been built
    fn on_registration_completed(&self, _agent: &AgentInfo) {}
}
