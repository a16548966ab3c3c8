//! Tool capability records

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// Everything the runtime and the model need to know about a tool
///
/// Created at registration and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique name within a catalogue
    pub name: String,

    /// Description shown to the model
    pub description: String,

    /// JSON schema of the arguments
    pub parameters: Value,

    /// Whether the tool body receives the run context
    pub context_aware: bool,

    /// Additional attempts allowed after a transient failure
    pub retries: u32,

    /// Per-attempt deadline
    pub timeout: Duration,

    /// Reject arguments not declared in the schema
    pub strict: bool,
}

impl ToolDefinition {
    /// Create a builder with library defaults for retries and timeout
    pub fn builder(name: impl Into<String>) -> ToolDefinitionBuilder {
        ToolDefinitionBuilder::new(name)
    }
}

/// Builder for [`ToolDefinition`]
#[derive(Debug, Clone)]
pub struct ToolDefinitionBuilder {
    definition: ToolDefinition,
}

impl ToolDefinitionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let defaults = agent_utils::Defaults::default();
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: String::new(),
                parameters: json!({ "type": "object", "properties": {} }),
                context_aware: false,
                retries: defaults.tool_retries,
                timeout: defaults.tool_timeout(),
                strict: false,
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = description.into();
        self
    }

    /// Explicit argument schema; internal tools derive it from their parameters
    pub fn parameters(mut self, parameters: Value) -> Self {
        self.definition.parameters = parameters;
        self
    }

    pub fn context_aware(mut self, context_aware: bool) -> Self {
        self.definition.context_aware = context_aware;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.definition.retries = retries;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.definition.timeout = timeout;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.definition.strict = strict;
        self
    }

    pub fn build(self) -> ToolDefinition {
        self.definition
    }
}
