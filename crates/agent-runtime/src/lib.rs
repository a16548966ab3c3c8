//! Agent runtime for agent-rs
//!
//! This crate provides the execution engine: the [`AgentExecutor`] run loop,
//! the [`Model`] boundary it drives, the [`Extension`] protocol agents are
//! composed with, output policies and the [`AgentRuntime`] factory.

pub mod agents;
pub mod config;
pub mod executor;
pub mod extension;
pub mod model;
pub mod policy;
pub mod prompt;
pub mod runtime;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agents::{AgentTool, SubAgentRegistry};
pub use config::{AgentConfig, ResolvedConfig};
pub use executor::{AgentExecutor, AgentExecutorBuilder, AgentInput, OUTPUT_KEY};
pub use extension::{AgentInfo, Extension, FactList, PromptFragment};
pub use model::{Model, ModelInput, ModelTurn, StreamSink};
pub use policy::{
    AcceptAll, EarlyTermination, MaxTurns, NeverTerminate, OutputValidator, RequiredFields,
    TokenBudget,
};
pub use prompt::{DEFAULT_TEMPLATE, PromptSection, SystemPrompt, ToolSummary};
pub use runtime::{AgentRuntime, AgentRuntimeBuilder};
