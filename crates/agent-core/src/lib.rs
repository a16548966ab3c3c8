//! Core abstractions for agent-rs
//!
//! This crate defines the error taxonomy, the message and output data model,
//! per-run context, usage accounting, lifecycle events and the retry policy
//! shared by the tool subsystem and the agent runtime.

pub mod agent;
pub mod context;
pub mod error;
pub mod events;
pub mod message;
pub mod output;
pub mod retry;
pub mod usage;

pub use agent::Agent;
pub use context::{ModelSettings, ProcessingMode, RequestMetadata, RunContext};
pub use error::{AgentError, Error, ErrorKind, Result};
pub use events::{AgentEvent, CapturingHandler, EventBus, EventHandler, NoOpEventHandler};
pub use message::{
    AgentMessage, MessagePayload, MessageStamper, ToolCallRequest, ToolCallResponse,
    pair_tool_calls,
};
pub use output::AgentOutput;
pub use retry::{RetryPolicy, Retryable};
pub use usage::{UsageSnapshot, UsageStats};
