//! LLM provider abstraction layer for agent-rs
//!
//! This crate provides provider-agnostic abstractions for interacting with
//! Large Language Models (LLMs). It includes:
//!
//! - Message types for LLM communication
//! - Completion request/response types
//! - Tool definitions for function calling
//! - Provider trait for LLM implementations
//! - [`ProviderModel`], which runs any provider behind the agent executor

pub mod completion;
pub mod error;
pub mod messages;
pub mod model;
pub mod provider;
pub mod tools;

pub use completion::{
    CompletionRequest, CompletionRequestBuilder, CompletionResponse, StopReason, TokenUsage,
};
pub use error::{LLMError, Result};
pub use messages::{ContentBlock, Message, MessageContent, Role};
pub use model::{FINAL_OUTPUT_TOOL, ProviderModel, convert_history};
pub use provider::LLMProvider;
pub use tools::ToolDefinition;
