//! Agent tool implementation (wraps an Agent)

use agent_core::Agent;
use agent_tools::{
    ParamSpec, RegisteredTool, Result, ToolDefinition, ToolError, ToolHandler, ToolInvocation,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Name of the single parameter of an agent tool
pub const INPUT_PARAM: &str = "input";

/// A tool that forwards its input to another agent
///
/// The callee receives the caller's request metadata with the caller's usage
/// counters attached, so its requests and tool calls roll up into the
/// calling run.
///
/// # Example
///
/// ```no_run
/// use agent_runtime::AgentTool;
/// use agent_core::Agent;
/// use std::sync::Arc;
///
/// # fn example(researcher: Arc<dyn Agent>) {
/// let tool = AgentTool::new(researcher).into_tool();
/// assert!(!tool.is_external());
/// # }
/// ```
pub struct AgentTool {
    agent: Arc<dyn Agent>,
}

impl AgentTool {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    /// Register under the agent's name and description
    pub fn into_tool(self) -> RegisteredTool {
        let description = match self.agent.description() {
            "" => format!("Delegate a task to the {} agent", self.agent.name()),
            text => text.to_string(),
        };
        let definition = ToolDefinition::builder(self.agent.name())
            .description(description)
            .context_aware(true)
            .build();
        RegisteredTool::internal(
            definition,
            vec![ParamSpec::string(INPUT_PARAM, "Task for the agent, in plain language")],
            Arc::new(self),
        )
    }
}

#[async_trait]
impl ToolHandler for AgentTool {
    async fn call(&self, invocation: ToolInvocation) -> Result<Value> {
        let context = invocation.context()?;
        let input: String = invocation.arguments.get(INPUT_PARAM)?;
        let metadata = context.metadata().clone().with_usage(context.usage().clone());

        debug!(
            caller = context.agent_name(),
            callee = self.agent.name(),
            call_id = %invocation.call_id,
            "Delegating to sub-agent"
        );
        let reply = self
            .agent
            .process(input, &metadata)
            .await
            .map_err(|e| ToolError::Failed(format!("agent '{}' failed: {e}", self.agent.name())))?;
        Ok(Value::String(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{AgentExecutor, AgentInput};
    use crate::testing::{ScriptedModel, ScriptedTurn};
    use agent_core::{Error, ErrorKind, RequestMetadata, ToolCallRequest};
    use mockall::mock;
    use serde_json::json;

    mock! {
        Worker {}

        #[async_trait]
        impl Agent for Worker {
            async fn process(
                &self,
                input: String,
                metadata: &RequestMetadata,
            ) -> agent_core::Result<String>;
            fn name(&self) -> &str;
            fn description(&self) -> &str;
        }
    }

    fn worker(reply: agent_core::Result<String>) -> MockWorker {
        let mut worker = MockWorker::new();
        worker.expect_name().return_const("researcher".to_string());
        worker.expect_description().return_const(String::new());
        worker
            .expect_process()
            .withf(|input, _| input == "find rust crates")
            .return_once(move |_, _| reply);
        worker
    }

    #[test]
    fn test_definition() {
        let tool = AgentTool::new(Arc::new(worker(Ok(String::new())))).into_tool();
        assert_eq!(tool.name(), "researcher");
        assert!(tool.definition.context_aware);
        assert_eq!(tool.definition.description, "Delegate a task to the researcher agent");
        assert_eq!(tool.definition.parameters["required"], json!(["input"]));
    }

    #[tokio::test]
    async fn test_delegation_through_parent_run() {
        let tool = AgentTool::new(Arc::new(worker(Ok("serde, tokio".into())))).into_tool();
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::ToolCalls(vec![ToolCallRequest::new(
                "c1",
                "researcher",
                r#"{"input":"find rust crates"}"#,
            )]),
            ScriptedTurn::output("Found serde and tokio"),
        ]));
        let parent = AgentExecutor::builder("lead").model(model).tool(tool).build().unwrap();

        let output = parent.execute(AgentInput::new("research")).await.unwrap();

        assert!(output.is_success());
        let response = output
            .all_messages
            .iter()
            .find_map(|m| m.tool_call_response())
            .unwrap();
        assert_eq!(response.response, "serde, tokio");
    }

    #[tokio::test]
    async fn test_sub_agent_failure_is_tool_failure() {
        let tool = AgentTool::new(Arc::new(worker(Err(Error::ProcessingFailed("boom".into())))))
            .into_tool();
        let model = Arc::new(ScriptedModel::new(vec![ScriptedTurn::call(
            "c1",
            "researcher",
            r#"{"input":"find rust crates"}"#,
        )]));
        let parent = AgentExecutor::builder("lead").model(model).tool(tool).build().unwrap();

        let output = parent.execute(AgentInput::new("research")).await.unwrap();

        let response = output
            .all_messages
            .iter()
            .find_map(|m| m.tool_call_response())
            .unwrap();
        assert_eq!(response.kind, ErrorKind::ToolCallTemporaryFailure);
        assert!(response.response.contains("boom"));
        assert_eq!(output.error_kind(), ErrorKind::ToolCallPermanentFailure);
    }

    #[tokio::test]
    async fn test_sub_agent_usage_rolls_up() {
        let child_model = Arc::new(ScriptedModel::new(vec![ScriptedTurn::output("42")]));
        let child = AgentExecutor::builder("calculator")
            .description("Does arithmetic")
            .model(child_model)
            .build()
            .unwrap();
        let parent_model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::call("c1", "calculator", r#"{"input":"6 * 7"}"#),
            ScriptedTurn::output("The answer is 42"),
        ]));
        let parent = AgentExecutor::builder("lead")
            .model(parent_model)
            .tool(AgentTool::new(Arc::new(child)).into_tool())
            .build()
            .unwrap();

        let output = parent.execute(AgentInput::new("what is 6 * 7?")).await.unwrap();

        assert_eq!(output.data, Some(json!("The answer is 42")));
        assert_eq!(output.usage.requests, 3);
        assert_eq!(output.usage.tool_calls, 1);
    }
}
