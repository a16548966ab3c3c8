//! Tool traits and registered tool variants
//!
//! A tool is either *internal* (a Rust body with declared parameters that
//! the invoker decodes before calling) or *external* (a callable that takes
//! the run context, the tool name and the raw argument payload, and reports
//! its own outcome kind).

use agent_core::{ErrorKind, RunContext};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::params::{ParamSpec, ToolArguments, parameters_schema};
use crate::{Result, ToolDefinition, ToolError};

/// Payload returned by tools that complete without a value
pub const SUCCESS_SENTINEL: &str = "success";

/// One call of an internal tool body
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool_name: String,
    /// Present only when the tool is context-aware
    pub context: Option<Arc<RunContext>>,
    pub arguments: ToolArguments,
}

impl ToolInvocation {
    /// Run context of the call
    ///
    /// Fails with a permanent error for tools not registered as context-aware.
    pub fn context(&self) -> Result<&RunContext> {
        self.context
            .as_deref()
            .ok_or_else(|| ToolError::ContextUnavailable(self.tool_name.clone()))
    }
}

/// Body of an internal tool
///
/// Return `Value::Null` for "no value". Return [`ToolError::Permanent`] for
/// failures that retrying cannot fix; any other error is treated as
/// transient and may be retried.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, invocation: ToolInvocation) -> Result<Value>;
}

/// Adapter turning an async closure into a [`ToolHandler`]
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(ToolInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn call(&self, invocation: ToolInvocation) -> Result<Value> {
        (self.f)(invocation).await
    }
}

/// Wrap an async closure as a tool body
///
/// # Example
///
/// ```
/// use agent_tools::{handler_fn, ToolInvocation};
/// use serde_json::json;
///
/// let greet = handler_fn(|inv: ToolInvocation| async move {
///     let name: String = inv.arguments.get("name")?;
///     Ok(json!(format!("Hello {name}")))
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(ToolInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Outcome reported by an external tool
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalResponse {
    pub payload: String,
    pub kind: ErrorKind,
}

impl ExternalResponse {
    pub fn success(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            kind: ErrorKind::Success,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            payload: message.into(),
            kind,
        }
    }
}

/// Callable backing an external tool
#[async_trait]
pub trait ExternalTool: Send + Sync {
    async fn call(&self, context: Arc<RunContext>, tool_name: &str, arguments: &str)
    -> ExternalResponse;
}

/// Adapter turning an async closure into an [`ExternalTool`]
pub struct FnExternal<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ExternalTool for FnExternal<F>
where
    F: Fn(Arc<RunContext>, String, String) -> Fut + Send + Sync,
    Fut: Future<Output = ExternalResponse> + Send,
{
    async fn call(
        &self,
        context: Arc<RunContext>,
        tool_name: &str,
        arguments: &str,
    ) -> ExternalResponse {
        (self.f)(context, tool_name.to_string(), arguments.to_string()).await
    }
}

/// Wrap an async closure as an external tool callable
pub fn external_fn<F, Fut>(f: F) -> Arc<dyn ExternalTool>
where
    F: Fn(Arc<RunContext>, String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ExternalResponse> + Send + 'static,
{
    Arc::new(FnExternal { f })
}

/// How a registered tool is executed
#[derive(Clone)]
pub enum ToolKind {
    Internal {
        params: Vec<ParamSpec>,
        handler: Arc<dyn ToolHandler>,
    },
    External(Arc<dyn ExternalTool>),
}

/// A definition plus the means to run it
#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub kind: ToolKind,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ToolKind::Internal { .. } => "internal",
            ToolKind::External(_) => "external",
        };
        f.debug_struct("RegisteredTool")
            .field("definition", &self.definition)
            .field("kind", &kind)
            .finish()
    }
}

impl RegisteredTool {
    /// Internal tool; the argument schema is derived from `params`
    pub fn internal(
        mut definition: ToolDefinition,
        params: Vec<ParamSpec>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        definition.parameters = parameters_schema(&params);
        Self {
            definition,
            kind: ToolKind::Internal { params, handler },
        }
    }

    /// External tool; the definition's schema is used as given
    pub fn external(definition: ToolDefinition, handler: Arc<dyn ExternalTool>) -> Self {
        Self {
            definition,
            kind: ToolKind::External(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn is_external(&self) -> bool {
        matches!(self.kind, ToolKind::External(_))
    }
}

/// Render a tool's return value as the response payload
pub fn render_payload(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(SUCCESS_SENTINEL.to_string()),
        Value::String(text) => Ok(text.clone()),
        other => Ok(serde_json::to_string(other)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_payload() {
        assert_eq!(render_payload(&Value::Null).unwrap(), "success");
        assert_eq!(render_payload(&json!("plain")).unwrap(), "plain");
        assert_eq!(render_payload(&json!(42)).unwrap(), "42");
        assert_eq!(render_payload(&json!({"a": 1})).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_internal_tool_schema_from_params() {
        let tool = RegisteredTool::internal(
            ToolDefinition::builder("greet").build(),
            vec![ParamSpec::string("name", "Who to greet")],
            handler_fn(|_inv| async { Ok(Value::Null) }),
        );

        assert!(!tool.is_external());
        assert_eq!(tool.definition.parameters["required"], json!(["name"]));
    }

    #[test]
    fn test_context_requires_context_aware() {
        let invocation = ToolInvocation {
            call_id: "c1".into(),
            tool_name: "greet".into(),
            context: None,
            arguments: ToolArguments::default(),
        };
        let err = invocation.context().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolCallPermanentFailure);
    }

    #[tokio::test]
    async fn test_handler_fn_calls_closure() {
        let handler = handler_fn(|inv: ToolInvocation| async move {
            Ok(json!(format!("called {}", inv.call_id)))
        });
        let out = handler
            .call(ToolInvocation {
                call_id: "c9".into(),
                tool_name: "t".into(),
                context: None,
                arguments: ToolArguments::default(),
            })
            .await
            .unwrap();
        assert_eq!(out, json!("called c9"));
    }
}
