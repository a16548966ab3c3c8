//! Human-in-the-loop approval of tool calls

use agent_core::{RunContext, ToolCallRequest};
use async_trait::async_trait;
use std::collections::HashSet;

/// Decides whether a requested tool call may run
///
/// Consulted before every call, before the tool is even looked up.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApprovalSeeker: Send + Sync {
    async fn approve(&self, agent: &str, context: &RunContext, request: &ToolCallRequest) -> bool;
}

/// Approves every call
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalSeeker for AutoApprove {
    async fn approve(
        &self,
        _agent: &str,
        _context: &RunContext,
        _request: &ToolCallRequest,
    ) -> bool {
        true
    }
}

/// Denies calls to the listed tools and approves the rest
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    denied: HashSet<String>,
}

impl DenyList {
    pub fn new(tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            denied: tools.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ApprovalSeeker for DenyList {
    async fn approve(
        &self,
        _agent: &str,
        _context: &RunContext,
        request: &ToolCallRequest,
    ) -> bool {
        !self.denied.contains(&request.tool_name)
    }
}
