//! Agents as tools
//!
//! - AgentTool: exposes any [`agent_core::Agent`] as a callable tool
//! - SubAgentRegistry: extension giving an agent a team of sub-agents

pub mod registry;
pub mod tool;

pub use registry::SubAgentRegistry;
pub use tool::AgentTool;
