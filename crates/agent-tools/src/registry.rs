//! Tool catalogue: the set of tools an agent may call

use std::collections::HashMap;
use std::sync::Arc;

use crate::{RegisteredTool, Result, ToolDefinition, ToolError};

/// Ordered, name-unique set of tools
///
/// Built once when an agent is assembled and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalogue {
    tools: HashMap<String, Arc<RegisteredTool>>,
    order: Vec<String>,
}

impl ToolCatalogue {
    /// Create an empty catalogue
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; names must be unique
    pub fn register(&mut self, tool: RegisteredTool) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }
        self.order.push(name.clone());
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    /// Register every tool, stopping at the first duplicate
    pub fn extend(&mut self, tools: impl IntoIterator<Item = RegisteredTool>) -> Result<()> {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<RegisteredTool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions in registration order, as advertised to the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
