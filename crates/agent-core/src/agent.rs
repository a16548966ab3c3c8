//! Core Agent trait definition

use crate::{RequestMetadata, Result};
use async_trait::async_trait;

/// A unit that turns a text request into a text answer
///
/// This is the composition seam: anything implementing `Agent` can be
/// delegated to by another agent (see `AgentTool` in agent-runtime), whether
/// it is an LLM-backed executor, a deterministic function or a remote proxy.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Process input and return output
    ///
    /// Failures that the agent can describe are returned as `Err`; callers
    /// that need the full structured result use the concrete agent type.
    async fn process(&self, input: String, metadata: &RequestMetadata) -> Result<String>;

    /// Get the agent's name
    fn name(&self) -> &str;

    /// One-line summary used when the agent is offered as a sub-agent
    fn description(&self) -> &str {
        ""
    }
}
