//! Sub-agent registry extension

use agent_core::{Agent, ProcessingMode, RunContext};
use agent_tools::RegisteredTool;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::agents::tool::AgentTool;
use crate::extension::{AgentInfo, Extension, PromptFragment};

/// Gives an agent a team of sub-agents, each callable as a tool
///
/// # Example
///
/// ```no_run
/// use agent_runtime::{AgentExecutor, SubAgentRegistry};
/// use agent_core::Agent;
/// use std::sync::Arc;
///
/// # fn example(coder: Arc<dyn Agent>, reviewer: Arc<dyn Agent>) -> agent_core::Result<()> {
/// let team = SubAgentRegistry::new().with_agent(coder).with_agent(reviewer);
/// let lead = AgentExecutor::builder("lead").extension(Arc::new(team)).build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SubAgentRegistry {
    agents: Vec<Arc<dyn Agent>>,
}

impl SubAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }
}

#[async_trait]
impl Extension for SubAgentRegistry {
    fn name(&self) -> &str {
        "sub_agents"
    }

    async fn additional_system_prompt(
        &self,
        _context: &RunContext,
        _agent: &AgentInfo,
        _mode: ProcessingMode,
    ) -> Option<PromptFragment> {
        if self.agents.is_empty() {
            return None;
        }
        let fragment = self.agents.iter().fold(
            PromptFragment::new("Delegate sub-tasks to the agent best suited for them")
                .with_hint("Give each agent a complete, self-contained task"),
            |fragment, agent| match agent.description() {
                "" => fragment.with_instruction(agent.name()),
                description => {
                    fragment.with_instruction(format!("{}: {description}", agent.name()))
                }
            },
        );
        Some(fragment)
    }

    fn tools(&self) -> Vec<RegisteredTool> {
        self.agents
            .iter()
            .map(|agent| AgentTool::new(agent.clone()).into_tool())
            .collect()
    }

    fn on_registration_completed(&self, agent: &AgentInfo) {
        debug!(agent = %agent.name, sub_agents = ?self.agent_names(), "Sub-agents registered");
    }
}
