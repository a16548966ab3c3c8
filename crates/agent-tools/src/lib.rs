//! Tool framework for agent-rs
//!
//! This crate provides the tool catalogue an agent advertises to its model
//! and the invocation subsystem that executes the model's tool calls with
//! approval, argument decoding, retries and timeouts.

pub mod approval;
pub mod definition;
pub mod error;
pub mod invoker;
pub mod params;
pub mod registry;
pub mod tool;

pub use approval::{ApprovalSeeker, AutoApprove, DenyList};
pub use definition::{ToolDefinition, ToolDefinitionBuilder};
pub use error::{Result, ToolError};
pub use invoker::{ToolInvoker, ToolRunner, TurnResult};
pub use params::{ParamSpec, ParamType, ToolArguments, schema};
pub use registry::ToolCatalogue;
pub use tool::{
    ExternalResponse, ExternalTool, RegisteredTool, SUCCESS_SENTINEL, ToolHandler, ToolInvocation,
    ToolKind, external_fn, handler_fn,
};
