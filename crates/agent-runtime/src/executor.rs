//! Agent executor: drives one run from request to [`AgentOutput`]
//!
//! A run is a loop:
//! 1. Check the early termination policy
//! 2. Hand the model a fresh history snapshot
//! 3. If the model ran tools, append the request/response pairs and loop
//! 4. If it finished, validate the output, let extensions consume their
//!    fields and return
//!
//! History is append-only. Every returned output, successful or not,
//! carries everything appended so far.

use agent_core::{
    Agent, AgentError, AgentEvent, AgentMessage, AgentOutput, Error, ErrorKind, MessagePayload,
    MessageStamper, ProcessingMode, RequestMetadata, Result, RunContext, UsageSnapshot,
};
use agent_tools::{
    ApprovalSeeker, AutoApprove, RegisteredTool, ToolCatalogue, ToolInvoker, ToolRunner,
};
use agent_utils::preview;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AgentConfig, ResolvedConfig};
use crate::extension::{AgentInfo, Extension};
use crate::model::{Model, ModelInput, ModelTurn, StreamSink};
use crate::policy::{AcceptAll, EarlyTermination, NeverTerminate, OutputValidator};
use crate::prompt::{PromptSection, SystemPrompt, ToolSummary};

/// Key of the agent's own value in the structured final output
pub const OUTPUT_KEY: &str = "output";

const DEFAULT_ROLE: &str = "You are a helpful assistant.";

/// One request to an agent
#[derive(Debug, Clone, Default)]
pub struct AgentInput {
    pub request: Value,
    pub metadata: RequestMetadata,
    /// History of earlier runs to continue from
    pub old_messages: Vec<AgentMessage>,
    /// Per-run configuration laid over the agent's own
    pub config: Option<AgentConfig>,
}

impl AgentInput {
    pub fn new(request: impl Into<Value>) -> Self {
        Self {
            request: request.into(),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_messages(mut self, old_messages: Vec<AgentMessage>) -> Self {
        self.old_messages = old_messages;
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// History bookkeeping for one run
struct RunState {
    stamper: MessageStamper,
    seeded: Vec<AgentMessage>,
    appended: Vec<AgentMessage>,
}

impl RunState {
    fn new(session_id: Option<String>, run_id: &str, seeded: Vec<AgentMessage>) -> Self {
        Self {
            stamper: MessageStamper::new(session_id, run_id, &seeded),
            seeded,
            appended: Vec::new(),
        }
    }

    fn append(&mut self, payloads: impl IntoIterator<Item = MessagePayload>) {
        for payload in payloads {
            let message = self.stamper.stamp(payload);
            self.appended.push(message);
        }
    }

    fn history(&self) -> Vec<AgentMessage> {
        self.seeded.iter().chain(&self.appended).cloned().collect()
    }

    fn into_output(
        self,
        outcome: std::result::Result<Value, AgentError>,
        usage: UsageSnapshot,
    ) -> AgentOutput {
        let all = self.history();
        match outcome {
            Ok(data) => AgentOutput::success(data, self.appended, all, usage),
            Err(error) => AgentOutput::error(error, self.appended, all, usage),
        }
    }
}

/// An agent: instructions, tools and extensions bound to a model
///
/// Build one with [`AgentExecutor::builder`] or through
/// [`crate::AgentRuntime::agent`].
pub struct AgentExecutor {
    info: AgentInfo,
    role: String,
    instructions: Vec<String>,
    prompt_template: Option<String>,
    output_schema: Value,
    catalogue: Arc<ToolCatalogue>,
    extensions: Vec<Arc<dyn Extension>>,
    config: AgentConfig,
    approval: Arc<dyn ApprovalSeeker>,
    validator: Arc<dyn OutputValidator>,
    termination: Arc<dyn EarlyTermination>,
    max_validation_attempts: u32,
}

impl AgentExecutor {
    pub fn builder(name: impl Into<String>) -> AgentExecutorBuilder {
        AgentExecutorBuilder::new(name)
    }

    pub fn info(&self) -> &AgentInfo {
        &self.info
    }

    pub fn catalogue(&self) -> &Arc<ToolCatalogue> {
        &self.catalogue
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run the agent and return its structured output
    ///
    /// # Errors
    ///
    /// Returns an error only when no model is configured or the model
    /// boundary fails unexpectedly. Every other failure is reported in the
    /// returned output's `error`.
    pub async fn execute(&self, input: AgentInput) -> Result<AgentOutput> {
        self.run(input, ProcessingMode::Direct, None).await
    }

    /// Run the agent, streaming text chunks to `sink` as they are produced
    ///
    /// The returned output's data is the text streamed by the successful
    /// attempt. Dynamic system prompts found in `old_messages` are dropped; a
    /// fresh one is added for the run.
    pub async fn execute_streaming(
        &self,
        input: AgentInput,
        sink: UnboundedSender<Vec<u8>>,
    ) -> Result<AgentOutput> {
        self.run(input, ProcessingMode::Streaming, Some(StreamSink::new(Some(sink))))
            .await
    }

    /// Blocking variant of [`execute`](Self::execute)
    ///
    /// Drives the run on a dedicated current-thread runtime, so it must not
    /// be called from within an async context.
    pub fn execute_blocking(&self, input: AgentInput) -> Result<AgentOutput> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::InitializationFailed(format!("failed to start runtime: {e}")))?;
        runtime.block_on(self.execute(input))
    }

    async fn run(
        &self,
        input: AgentInput,
        mode: ProcessingMode,
        sink: Option<StreamSink>,
    ) -> Result<AgentOutput> {
        let AgentInput {
            request,
            metadata,
            old_messages,
            config,
        } = input;
        let config = match &config {
            Some(overrides) => self.config.merge(overrides),
            None => self.config.clone(),
        }
        .resolve()?;

        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let seeded: Vec<AgentMessage> = match mode {
            ProcessingMode::Direct => old_messages,
            ProcessingMode::Streaming => old_messages
                .into_iter()
                .filter(|m| {
                    !matches!(m.payload, MessagePayload::SystemPrompt { dynamic: true, .. })
                })
                .collect(),
        };

        let base = RunContext::new(
            run_id.clone(),
            self.info.name.clone(),
            request.clone(),
            metadata.clone(),
            config.settings.clone(),
            mode,
        );
        let mut state = RunState::new(metadata.session_id().map(String::from), &run_id, seeded);

        info!(
            agent = %self.info.name,
            run_id = %run_id,
            mode = ?mode,
            seeded = state.seeded.len(),
            model = %config.settings.model,
            "Run started"
        );
        config
            .events
            .emit(AgentEvent::InputReceived {
                agent: self.info.name.clone(),
                run_id: run_id.clone(),
                session_id: metadata.session_id().map(String::from),
                request: request.clone(),
            })
            .await;

        let outcome = match self.initial_messages(&base, mode).await {
            Ok(payloads) => {
                state.append(payloads);
                match self.drive(&config, &base, &mut state, sink.as_ref()).await {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        let elapsed = started.elapsed();
                        warn!(
                            agent = %self.info.name,
                            run_id = %run_id,
                            error = %error,
                            duration_ms = elapsed.as_millis() as u64,
                            "Run failed"
                        );
                        config
                            .events
                            .emit(AgentEvent::OutputError {
                                agent: self.info.name.clone(),
                                run_id: run_id.clone(),
                                kind: ErrorKind::Unknown,
                                message: error.to_string(),
                                elapsed,
                            })
                            .await;
                        return Err(error);
                    }
                }
            }
            Err(error) => {
                warn!(
                    agent = %self.info.name,
                    run_id = %run_id,
                    error = %error,
                    "Run aborted before the first exchange"
                );
                Err(error)
            }
        };

        let usage = base.usage();
        let elapsed = started.elapsed();
        match &outcome {
            Ok(data) => {
                if let Some(shared) = metadata.usage() {
                    shared.merge(usage);
                }
                info!(
                    agent = %self.info.name,
                    run_id = %run_id,
                    requests = usage.requests(),
                    tool_calls = usage.tool_calls(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Run completed"
                );
                config
                    .events
                    .emit(AgentEvent::OutputGenerated {
                        agent: self.info.name.clone(),
                        run_id: run_id.clone(),
                        output: data.clone(),
                        elapsed,
                    })
                    .await;
            }
            Err(error) => {
                warn!(
                    agent = %self.info.name,
                    run_id = %run_id,
                    kind = %error.kind,
                    error = %preview(&error.message, 300),
                    duration_ms = elapsed.as_millis() as u64,
                    "Run failed"
                );
                config
                    .events
                    .emit(AgentEvent::OutputError {
                        agent: self.info.name.clone(),
                        run_id: run_id.clone(),
                        kind: error.kind,
                        message: error.message.clone(),
                        elapsed,
                    })
                    .await;
            }
        }

        Ok(state.into_output(outcome, usage.snapshot()))
    }

    /// System prompt and user prompt opening the run
    async fn initial_messages(
        &self,
        context: &RunContext,
        mode: ProcessingMode,
    ) -> std::result::Result<Vec<MessagePayload>, AgentError> {
        let mut prompt = SystemPrompt::new(self.role.clone());
        prompt.instructions = self.instructions.clone();
        prompt.language = context.metadata().language().map(String::from);
        prompt.tools = self
            .catalogue
            .definitions()
            .into_iter()
            .map(|definition| ToolSummary {
                name: definition.name,
                description: definition.description,
            })
            .collect();

        for extension in &self.extensions {
            if let Some(fragment) = extension
                .additional_system_prompt(context, &self.info, mode)
                .await
                .filter(|fragment| !fragment.is_empty())
            {
                prompt.sections.push(PromptSection {
                    source: extension.name().to_string(),
                    fragment,
                });
            }
            prompt.facts.extend(extension.facts(context, &self.info).await);
        }

        let system = prompt
            .render(self.prompt_template.as_deref())
            .map_err(|e| {
                AgentError::new(
                    ErrorKind::SerializationError,
                    format!("Failed to render system prompt: {e}"),
                )
            })?;

        let user = match context.request() {
            Value::String(text) => text.clone(),
            other => serde_json::to_string(other).map_err(|e| {
                AgentError::new(
                    ErrorKind::SerializationError,
                    format!("Failed to serialize request: {e}"),
                )
            })?,
        };

        Ok(vec![
            MessagePayload::system_prompt(system),
            MessagePayload::user_prompt(user),
        ])
    }

    /// The exchange loop, including the outer exchange retry
    async fn drive(
        &self,
        config: &ResolvedConfig,
        base: &RunContext,
        state: &mut RunState,
        sink: Option<&StreamSink>,
    ) -> Result<std::result::Result<Value, AgentError>> {
        let mode = base.mode();
        let runner: Arc<dyn ToolRunner> = Arc::new(self.tool_invoker(config));
        let output_schema = self.output_schema_for(mode);
        let mut turns = 0u32;
        let mut attempt = 1u32;
        let mut rejections = 0u32;
        let mut attempt_start = sink.map_or(0, StreamSink::len);

        loop {
            let snapshot = base.with_messages(state.history());
            if let Some(reason) = self.termination.should_terminate(&snapshot, turns) {
                warn!(
                    agent = %self.info.name,
                    run_id = %base.run_id(),
                    turns,
                    reason = %reason,
                    "Run terminated early"
                );
                config
                    .events
                    .emit(AgentEvent::RunTerminated {
                        agent: self.info.name.clone(),
                        run_id: base.run_id().to_string(),
                        reason: reason.clone(),
                    })
                    .await;
                return Ok(Err(AgentError::new(ErrorKind::ModelRunTerminated, reason)));
            }

            turns += 1;
            debug!(
                agent = %self.info.name,
                run_id = %base.run_id(),
                turn = turns,
                attempt,
                history = snapshot.messages().len(),
                "Exchanging messages"
            );
            let input = ModelInput {
                context: Arc::new(snapshot),
                output_schema: output_schema.clone(),
                tools: self.catalogue.definitions(),
                tool_runner: runner.clone(),
                extensions: self.extensions.clone(),
                agent: self.info.clone(),
            };
            let turn = match sink {
                Some(sink) => {
                    config
                        .model
                        .exchange_messages_streaming(input, sink.clone())
                        .await?
                }
                None => config.model.exchange_messages(input).await?,
            };

            let (messages, result) = match turn {
                ModelTurn::Continue(payloads) => {
                    debug!(
                        run_id = %base.run_id(),
                        appended = payloads.len(),
                        "Tool turn completed"
                    );
                    state.append(payloads);
                    continue;
                }
                ModelTurn::Complete { messages, result } => (messages, result),
            };
            state.append(messages);

            let streamed = sink.map(|sink| sink.text_since(attempt_start));
            let error = match result.and_then(|raw| extract_output(raw, mode, streamed)) {
                Ok((data, raw)) => {
                    state.append([match mode {
                        ProcessingMode::Direct => MessagePayload::StructuredOutput {
                            content: raw.clone(),
                        },
                        ProcessingMode::Streaming => MessagePayload::TextOutput {
                            content: data.as_str().unwrap_or_default().to_string(),
                        },
                    }]);
                    if mode == ProcessingMode::Streaming {
                        return Ok(Ok(data));
                    }

                    let context = base.with_messages(state.history());
                    match self.validator.validate(&data, &context) {
                        Ok(()) => {
                            self.consume_extensions(&raw, &context).await;
                            return Ok(Ok(data));
                        }
                        Err(reason) => {
                            rejections += 1;
                            warn!(
                                agent = %self.info.name,
                                run_id = %base.run_id(),
                                rejections,
                                reason = %reason,
                                "Output rejected by validator"
                            );
                            if rejections >= self.max_validation_attempts {
                                return Ok(Err(AgentError::new(
                                    ErrorKind::DataValidationFailure,
                                    format!("Output rejected {rejections} times: {reason}"),
                                )));
                            }
                            state.append([MessagePayload::user_prompt(format!(
                                "Your previous output was rejected: {reason}. Please correct it."
                            ))]);
                            continue;
                        }
                    }
                }
                Err(error) => error,
            };

            if !config.exchange_retry.should_retry(error.kind, attempt) {
                return Ok(Err(error));
            }
            let delay = config.exchange_retry.delay_after(attempt);
            warn!(
                agent = %self.info.name,
                run_id = %base.run_id(),
                attempt,
                max_attempts = config.exchange_retry.max_attempts,
                kind = %error.kind,
                delay_ms = delay.as_millis() as u64,
                "Exchange failed, retrying"
            );
            attempt += 1;
            attempt_start = sink.map_or(0, StreamSink::len);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    fn tool_invoker(&self, config: &ResolvedConfig) -> ToolInvoker {
        let invoker = ToolInvoker::new(self.info.name.clone(), self.catalogue.clone())
            .with_approval(self.approval.clone())
            .with_events(config.events.clone())
            .with_retry_policy(config.tool_retry.clone());
        match &config.executor {
            Some(handle) => invoker.with_executor(handle.clone()),
            None => invoker,
        }
    }

    /// Schema of the final output for `mode`
    ///
    /// Direct runs wrap the agent's schema under [`OUTPUT_KEY`] next to one
    /// required field per extension that asks for one. Streaming runs
    /// produce plain text.
    pub fn output_schema_for(&self, mode: ProcessingMode) -> Value {
        if mode == ProcessingMode::Streaming {
            return json!({ "type": "string" });
        }

        let mut properties = Map::new();
        properties.insert(OUTPUT_KEY.to_string(), self.output_schema.clone());
        let mut required = vec![OUTPUT_KEY.to_string()];
        for extension in &self.extensions {
            if let Some((key, schema)) = extension.output_schema(mode) {
                properties.insert(key.clone(), schema);
                required.push(key);
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    async fn consume_extensions(&self, raw: &Value, context: &RunContext) {
        for extension in &self.extensions {
            let Some((key, _)) = extension.output_schema(ProcessingMode::Direct) else {
                continue;
            };
            if let Some(value) = raw.get(&key) {
                debug!(
                    extension = extension.name(),
                    key = %key,
                    "Extension consuming output field"
                );
                extension.consume(value, context, &self.info).await;
            }
        }
    }
}

/// Split the model's raw final output into `(data, raw)`
///
/// `streamed` is the text the current attempt wrote to the sink.
fn extract_output(
    raw: Value,
    mode: ProcessingMode,
    streamed: Option<String>,
) -> std::result::Result<(Value, Value), AgentError> {
    match mode {
        ProcessingMode::Streaming => {
            let streamed = streamed.unwrap_or_default();
            let text = if streamed.is_empty() {
                match &raw {
                    Value::Null => {
                        return Err(AgentError::new(
                            ErrorKind::NoResponse,
                            "Model produced no output",
                        ));
                    }
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                }
            } else {
                streamed
            };
            Ok((Value::String(text), raw))
        }
        ProcessingMode::Direct => {
            let raw = match raw {
                Value::String(text) => serde_json::from_str(&text).map_err(|e| {
                    AgentError::new(
                        ErrorKind::JsonError,
                        format!("Final output is not valid JSON: {e}"),
                    )
                })?,
                other => other,
            };
            let data = raw.get(OUTPUT_KEY).cloned().ok_or_else(|| {
                AgentError::new(
                    ErrorKind::JsonError,
                    format!("Final output is missing the '{OUTPUT_KEY}' field"),
                )
            })?;
            Ok((data, raw))
        }
    }
}

#[async_trait]
impl Agent for AgentExecutor {
    async fn process(&self, input: String, metadata: &RequestMetadata) -> Result<String> {
        let output = self
            .execute(AgentInput::new(input).with_metadata(metadata.clone()))
            .await?;
        if output.is_success() {
            Ok(output.text().unwrap_or_default())
        } else {
            Err(Error::ProcessingFailed(output.error.to_string()))
        }
    }

    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        &self.info.description
    }
}

/// Builder for [`AgentExecutor`]
pub struct AgentExecutorBuilder {
    name: String,
    description: String,
    role: String,
    instructions: Vec<String>,
    prompt_template: Option<String>,
    output_schema: Value,
    tools: Vec<RegisteredTool>,
    extensions: Vec<Arc<dyn Extension>>,
    config: AgentConfig,
    approval: Arc<dyn ApprovalSeeker>,
    validator: Arc<dyn OutputValidator>,
    termination: Arc<dyn EarlyTermination>,
    max_validation_attempts: u32,
}

impl AgentExecutorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            role: DEFAULT_ROLE.to_string(),
            instructions: Vec::new(),
            prompt_template: None,
            output_schema: json!({ "type": "string" }),
            tools: Vec::new(),
            extensions: Vec::new(),
            config: AgentConfig::default(),
            approval: Arc::new(AutoApprove),
            validator: Arc::new(AcceptAll),
            termination: Arc::new(NeverTerminate),
            max_validation_attempts: agent_utils::Defaults::default().validation_attempts,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Role statement opening the system prompt
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// MiniJinja template replacing the default system prompt layout
    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    /// JSON schema of the agent's output value
    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = schema;
        self
    }

    pub fn tool(mut self, tool: RegisteredTool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = RegisteredTool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Replace the agent's default configuration
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn model(mut self, model: Arc<dyn Model>) -> Self {
        self.config.model = Some(model);
        self
    }

    pub fn settings(mut self, settings: agent_core::ModelSettings) -> Self {
        self.config.settings = Some(settings);
        self
    }

    pub fn executor(mut self, executor: Handle) -> Self {
        self.config.executor = Some(executor);
        self
    }

    pub fn events(mut self, events: agent_core::EventBus) -> Self {
        self.config.events = Some(events);
        self
    }

    pub fn exchange_retry(mut self, policy: agent_core::RetryPolicy) -> Self {
        self.config.exchange_retry = Some(policy);
        self
    }

    pub fn tool_retry(mut self, policy: agent_core::RetryPolicy) -> Self {
        self.config.tool_retry = Some(policy);
        self
    }

    pub fn approval(mut self, approval: Arc<dyn ApprovalSeeker>) -> Self {
        self.approval = approval;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn OutputValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn early_termination(mut self, termination: Arc<dyn EarlyTermination>) -> Self {
        self.termination = termination;
        self
    }

    /// Rejections tolerated before the run fails; at least 1
    pub fn max_validation_attempts(mut self, attempts: u32) -> Self {
        self.max_validation_attempts = attempts.max(1);
        self
    }

    /// Build the executor
    ///
    /// # Errors
    ///
    /// Returns an error if two tools, including extension tools, share a name
    pub fn build(self) -> Result<AgentExecutor> {
        let mut catalogue = ToolCatalogue::new();
        let extension_tools = self.extensions.iter().flat_map(|e| e.tools());
        for tool in self.tools.into_iter().chain(extension_tools) {
            catalogue
                .register(tool)
                .map_err(|e| Error::InitializationFailed(e.to_string()))?;
        }

        let info = AgentInfo {
            name: self.name,
            description: self.description,
            tools: catalogue.names().into_iter().map(String::from).collect(),
        };
        for extension in &self.extensions {
            extension.on_registration_completed(&info);
        }

        info!(
            agent = %info.name,
            tools = catalogue.len(),
            extensions = self.extensions.len(),
            "Agent built"
        );

        Ok(AgentExecutor {
            info,
            role: self.role,
            instructions: self.instructions,
            prompt_template: self.prompt_template,
            output_schema: self.output_schema,
            catalogue: Arc::new(catalogue),
            extensions: self.extensions,
            config: self.config,
            approval: self.approval,
            validator: self.validator,
            termination: self.termination,
            max_validation_attempts: self.max_validation_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{MaxTurns, RequiredFields};
    use crate::testing::{ScriptedModel, ScriptedTurn};
    use agent_core::{CapturingHandler, EventBus, RetryPolicy, ToolCallRequest, UsageStats};
    use agent_tools::{ParamSpec, ToolDefinition, ToolInvocation, handler_fn};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn get_name_tool() -> RegisteredTool {
        RegisteredTool::internal(
            ToolDefinition::builder("get_name")
                .description("Name of the user")
                .build(),
            vec![],
            handler_fn(|_inv| async { Ok(json!("Santanu")) }),
        )
    }

    fn agent(model: Arc<ScriptedModel>) -> AgentExecutorBuilder {
        AgentExecutor::builder("greeter")
            .role("You greet people by name.")
            .model(model)
            .tool(get_name_tool())
    }

    fn tool_pairs<'a>(
        messages: &'a [AgentMessage],
        tool: &str,
    ) -> Vec<(&'a ToolCallRequest, &'a agent_core::ToolCallResponse)> {
        messages
            .windows(2)
            .filter_map(|w| match (w[0].tool_call_request(), w[1].tool_call_response()) {
                (Some(req), Some(resp)) if req.tool_name == tool => Some((req, resp)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_hello_santanu() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::call("call-1", "get_name", "{}"),
            ScriptedTurn::output("Hello Santanu"),
        ]));
        let shared = Arc::new(UsageStats::new());
        let executor = agent(model.clone()).build().unwrap();

        let output = executor
            .execute(
                AgentInput::new("Greet the user")
                    .with_metadata(RequestMetadata::new().with_usage(shared.clone())),
            )
            .await
            .unwrap();

        assert!(output.is_success(), "{:?}", output.error);
        assert_eq!(output.error_kind(), ErrorKind::Success);
        assert_eq!(output.data, Some(json!("Hello Santanu")));

        let pairs = tool_pairs(&output.all_messages, "get_name");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.call_id, pairs[0].1.call_id);
        assert_eq!(pairs[0].1.response, "Santanu");

        assert_eq!(output.usage.requests, 2);
        assert_eq!(output.usage.tool_calls, 1);
        assert_eq!(shared.requests(), 2);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_history_layout_and_first_exchange() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptedTurn::output("hi")]));
        let executor = agent(model.clone()).instruction("Be brief.").build().unwrap();

        let output = executor.execute(AgentInput::new(json!({"who": "Ada"}))).await.unwrap();

        let kinds: Vec<&str> = output.new_messages.iter().map(|m| m.payload.kind_name()).collect();
        assert_eq!(kinds, vec!["system_prompt", "user_prompt", "structured_output"]);
        match &output.new_messages[0].payload {
            MessagePayload::SystemPrompt { content, dynamic } => {
                assert!(*dynamic);
                assert!(content.starts_with("You greet people by name."));
                assert!(content.contains("- Be brief."));
                assert!(content.contains("- get_name: Name of the user"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            output.new_messages[1].payload,
            MessagePayload::user_prompt(r#"{"who":"Ada"}"#)
        );

        let seen = model.histories();
        assert_eq!(seen[0].len(), 2);
    }

    #[tokio::test]
    async fn test_history_is_append_only_across_runs() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::output("first"),
            ScriptedTurn::call("c1", "get_name", "{}"),
            ScriptedTurn::output("second"),
        ]));
        let executor = agent(model).build().unwrap();

        let first = executor.execute(AgentInput::new("one")).await.unwrap();
        let second = executor
            .execute(AgentInput::new("two").with_messages(first.all_messages.clone()))
            .await
            .unwrap();

        assert!(second.is_success());
        assert_eq!(&second.all_messages[..first.all_messages.len()], &first.all_messages[..]);
        assert_eq!(
            second.all_messages.len(),
            first.all_messages.len() + second.new_messages.len()
        );

        let ids: Vec<u64> = second.all_messages.iter().map(|m| m.message_id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_ne!(first.new_messages[0].run_id, second.new_messages[0].run_id);
    }

    #[tokio::test]
    async fn test_parallel_calls_are_paired_in_request_order() {
        let sleepy = RegisteredTool::internal(
            ToolDefinition::builder("sleepy").build(),
            vec![ParamSpec::integer("ms", "Sleep")],
            handler_fn(|inv: ToolInvocation| async move {
                let ms: u64 = inv.arguments.get("ms")?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(json!(ms))
            }),
        );
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::ToolCalls(vec![
                ToolCallRequest::new("slow", "sleepy", r#"{"ms":30}"#),
                ToolCallRequest::new("fast", "sleepy", r#"{"ms":1}"#),
            ]),
            ScriptedTurn::output("done"),
        ]));
        let executor = AgentExecutor::builder("sleeper")
            .model(model)
            .tool(sleepy)
            .build()
            .unwrap();

        let output = executor.execute(AgentInput::new("go")).await.unwrap();
        let ids: Vec<&str> = tool_pairs(&output.all_messages, "sleepy")
            .into_iter()
            .map(|(req, resp)| {
                assert_eq!(req.call_id, resp.call_id);
                req.call_id.as_str()
            })
            .collect();
        assert_eq!(ids, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_permanent_tool_failure_ends_run() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::call("c1", "missing_tool", "{}"),
            ScriptedTurn::output("never"),
        ]));
        let executor = agent(model.clone()).build().unwrap();

        let output = executor.execute(AgentInput::new("go")).await.unwrap();

        assert_eq!(output.error_kind(), ErrorKind::ToolCallPermanentFailure);
        assert!(output.error.message.contains("missing_tool"));
        assert!(output.data.is_none());
        assert_eq!(tool_pairs(&output.all_messages, "missing_tool").len(), 1);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_stays_conversational() {
        let slow = RegisteredTool::internal(
            ToolDefinition::builder("slow")
                .timeout(Duration::from_millis(10))
                .build(),
            vec![],
            handler_fn(|_inv| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Value::Null)
            }),
        );
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::call("c1", "slow", "{}"),
            ScriptedTurn::output("gave up waiting"),
        ]));
        let executor = AgentExecutor::builder("patient")
            .model(model)
            .tool(slow)
            .build()
            .unwrap();

        let output = executor.execute(AgentInput::new("go")).await.unwrap();

        assert!(output.is_success());
        let pairs = tool_pairs(&output.all_messages, "slow");
        assert_eq!(pairs[0].1.kind, ErrorKind::ToolCallTimeout);
    }

    #[tokio::test]
    async fn test_validation_rejection_then_success() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::output(json!({"name": null})),
            ScriptedTurn::output(json!({"name": "Ada"})),
        ]));
        let executor = AgentExecutor::builder("strict")
            .model(model.clone())
            .output_schema(json!({"type": "object"}))
            .validator(Arc::new(RequiredFields::new(["name"])))
            .build()
            .unwrap();

        let output = executor.execute(AgentInput::new("who?")).await.unwrap();

        assert!(output.is_success());
        assert_eq!(output.data, Some(json!({"name": "Ada"})));
        assert!(output.new_messages.iter().any(|m| matches!(
            &m.payload,
            MessagePayload::UserPrompt { content }
                if content.contains("missing required fields: name")
        )));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_validation_attempts_exhausted() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::output(json!({})),
            ScriptedTurn::output(json!({})),
        ]));
        let executor = AgentExecutor::builder("strict")
            .model(model.clone())
            .validator(Arc::new(RequiredFields::new(["name"])))
            .max_validation_attempts(2)
            .build()
            .unwrap();

        let output = executor.execute(AgentInput::new("who?")).await.unwrap();

        assert_eq!(output.error_kind(), ErrorKind::DataValidationFailure);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_early_termination_keeps_history() {
        let capture = Arc::new(CapturingHandler::new());
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::call("c1", "get_name", "{}"),
            ScriptedTurn::output("never"),
        ]));
        let executor = agent(model.clone())
            .early_termination(Arc::new(MaxTurns(1)))
            .events(EventBus::new().with_handler(capture.clone()))
            .build()
            .unwrap();

        let output = executor.execute(AgentInput::new("go")).await.unwrap();

        assert_eq!(output.error_kind(), ErrorKind::ModelRunTerminated);
        assert_eq!(tool_pairs(&output.all_messages, "get_name").len(), 1);
        assert_eq!(model.calls(), 1);
        assert!(capture
            .events()
            .iter()
            .any(|e| matches!(e, AgentEvent::RunTerminated { .. })));
    }

    #[tokio::test]
    async fn test_prompt_failure_skips_model() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptedTurn::output("never")]));
        let executor = agent(model.clone())
            .prompt_template("{{ role ")
            .build()
            .unwrap();

        let output = executor.execute(AgentInput::new("go")).await.unwrap();

        assert_eq!(output.error_kind(), ErrorKind::SerializationError);
        assert!(output.new_messages.is_empty());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_exchange_retry_preserves_history() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::error(ErrorKind::JsonError, "garbled"),
            ScriptedTurn::output("recovered"),
        ]));
        let executor = agent(model.clone())
            .exchange_retry(RetryPolicy::new(2, Duration::ZERO))
            .build()
            .unwrap();

        let output = executor.execute(AgentInput::new("go")).await.unwrap();

        assert!(output.is_success());
        assert_eq!(output.data, Some(json!("recovered")));
        assert_eq!(model.calls(), 2);
        assert_eq!(model.histories()[1].len(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::error(ErrorKind::Refused, "no"),
            ScriptedTurn::output("unused"),
        ]));
        let executor = agent(model.clone())
            .exchange_retry(RetryPolicy::new(3, Duration::ZERO))
            .build()
            .unwrap();

        let output = executor.execute(AgentInput::new("go")).await.unwrap();
        assert_eq!(output.error_kind(), ErrorKind::Refused);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_output_field_is_json_error() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptedTurn::Output(json!({"answer": 1}))]));
        let executor = agent(model).build().unwrap();

        let output = executor.execute(AgentInput::new("go")).await.unwrap();
        assert_eq!(output.error_kind(), ErrorKind::JsonError);
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let capture = Arc::new(CapturingHandler::new());
        let model = Arc::new(ScriptedModel::new(vec![ScriptedTurn::Fail("socket closed".into())]));
        let executor = agent(model)
            .events(EventBus::new().with_handler(capture.clone()))
            .build()
            .unwrap();

        let err = executor.execute(AgentInput::new("go")).await.unwrap_err();
        assert!(matches!(err, Error::Model(ref m) if m.contains("socket closed")));

        let events = capture.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AgentEvent::InputReceived { .. }));
        assert!(matches!(
            &events[1],
            AgentEvent::OutputError { kind: ErrorKind::Unknown, message, .. }
                if message.contains("socket closed")
        ));
    }

    #[tokio::test]
    async fn test_missing_model_is_configuration_error() {
        let executor = AgentExecutor::builder("nobody").build().unwrap();
        let err = executor.execute(AgentInput::new("go")).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_run_override_replaces_model() {
        let unused = Arc::new(ScriptedModel::new(vec![]));
        let used = Arc::new(ScriptedModel::new(vec![ScriptedTurn::output("override")]));
        let executor = agent(unused.clone()).build().unwrap();

        let output = executor
            .execute(AgentInput::new("go").with_config(AgentConfig::new().with_model(used.clone())))
            .await
            .unwrap();

        assert_eq!(output.data, Some(json!("override")));
        assert_eq!(unused.calls(), 0);
        assert_eq!(used.calls(), 1);
    }

    #[tokio::test]
    async fn test_streaming_strips_seeded_system_prompts() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::output("first"),
            ScriptedTurn::Output(json!("streamed text")),
        ]));
        let executor = agent(model.clone()).build().unwrap();
        let first = executor.execute(AgentInput::new("one")).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let output = executor
            .execute_streaming(AgentInput::new("two").with_messages(first.all_messages.clone()), tx)
            .await
            .unwrap();

        assert!(output.is_success());
        assert_eq!(output.data, Some(json!("streamed text")));
        assert_eq!(rx.recv().await.unwrap(), b"streamed text".to_vec());

        let system_prompts = output.all_messages.iter().filter(|m| m.is_system_prompt()).count();
        assert_eq!(system_prompts, 1);
        assert!(matches!(
            output.new_messages.last().map(|m| &m.payload),
            Some(MessagePayload::TextOutput { content }) if content == "streamed text"
        ));
        assert_eq!(model.histories()[1].iter().filter(|m| m.is_system_prompt()).count(), 1);
    }

    #[tokio::test]
    async fn test_streaming_keeps_static_system_prompts() {
        let mut stamper = MessageStamper::new(None, "earlier", &[]);
        let seeded = vec![
            stamper.stamp(MessagePayload::SystemPrompt {
                content: "Always answer in French.".to_string(),
                dynamic: false,
            }),
            stamper.stamp(MessagePayload::system_prompt("old rendered prompt")),
            stamper.stamp(MessagePayload::user_prompt("bonjour")),
        ];
        let model = Arc::new(ScriptedModel::new(vec![ScriptedTurn::Output(json!("salut"))]));
        let executor = agent(model.clone()).build().unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let output = executor
            .execute_streaming(AgentInput::new("encore").with_messages(seeded.clone()), tx)
            .await
            .unwrap();

        assert!(output.is_success());
        assert_eq!(output.all_messages[0], seeded[0]);
        assert_eq!(output.all_messages[1], seeded[2]);
        let seen = &model.histories()[0];
        assert!(seen.iter().any(|m| matches!(
            &m.payload,
            MessagePayload::SystemPrompt { content, dynamic: false } if content.contains("French")
        )));
        assert!(!seen.iter().any(|m| matches!(
            &m.payload,
            MessagePayload::SystemPrompt { content, .. } if content == "old rendered prompt"
        )));
    }

    /// Streams a fragment, fails, then streams the real answer
    #[derive(Default)]
    struct StutteringModel {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl Model for StutteringModel {
        async fn exchange_messages(&self, _input: ModelInput) -> Result<ModelTurn> {
            Err(Error::Model("streaming only".to_string()))
        }

        async fn exchange_messages_streaming(
            &self,
            _input: ModelInput,
            sink: StreamSink,
        ) -> Result<ModelTurn> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                sink.write_str("partial garbage ");
                return Ok(ModelTurn::failed(AgentError::new(
                    ErrorKind::GenericModelCallFailure,
                    "stream dropped",
                )));
            }
            sink.write_str("Hello");
            Ok(ModelTurn::output(Value::Null))
        }
    }

    #[tokio::test]
    async fn test_streaming_retry_drops_failed_attempt_text() {
        let executor = AgentExecutor::builder("streamer")
            .model(Arc::new(StutteringModel::default()))
            .exchange_retry(RetryPolicy::new(2, Duration::ZERO))
            .build()
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let output = executor
            .execute_streaming(AgentInput::new("hi"), tx)
            .await
            .unwrap();

        assert!(output.is_success(), "{:?}", output.error);
        assert_eq!(output.data, Some(json!("Hello")));
        assert!(matches!(
            output.new_messages.last().map(|m| &m.payload),
            Some(MessagePayload::TextOutput { content }) if content == "Hello"
        ));
        assert_eq!(rx.recv().await.unwrap(), b"partial garbage ".to_vec());
        assert_eq!(rx.recv().await.unwrap(), b"Hello".to_vec());
    }

    #[test]
    fn test_tools_run_on_configured_executor() {
        let pool = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("agent-tools")
            .enable_all()
            .build()
            .unwrap();
        let where_am_i = RegisteredTool::internal(
            ToolDefinition::builder("where_am_i").build(),
            vec![],
            handler_fn(|_inv| async {
                Ok(json!(std::thread::current().name().unwrap_or_default()))
            }),
        );
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::call("c1", "where_am_i", "{}"),
            ScriptedTurn::output("done"),
        ]));
        let executor = AgentExecutor::builder("locator")
            .model(model)
            .tool(where_am_i)
            .executor(pool.handle().clone())
            .build()
            .unwrap();

        let output = executor.execute_blocking(AgentInput::new("go")).unwrap();

        assert!(output.is_success(), "{:?}", output.error);
        let pairs = tool_pairs(&output.all_messages, "where_am_i");
        assert_eq!(pairs[0].1.response, "agent-tools");
    }

    #[tokio::test]
    async fn test_events_bracket_the_run() {
        let capture = Arc::new(CapturingHandler::new());
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::call("c1", "get_name", "{}"),
            ScriptedTurn::output("Hello Santanu"),
        ]));
        let executor = agent(model)
            .events(EventBus::new().with_handler(capture.clone()))
            .build()
            .unwrap();

        executor.execute(AgentInput::new("go")).await.unwrap();

        let events = capture.events();
        assert!(matches!(events.first(), Some(AgentEvent::InputReceived { .. })));
        assert!(matches!(events.last(), Some(AgentEvent::OutputGenerated { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::ToolCallCompleted { success: true, .. })));
    }

    #[derive(Default)]
    struct MoodTracker {
        consumed: Mutex<Vec<Value>>,
        registered: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Extension for MoodTracker {
        fn name(&self) -> &str {
            "mood"
        }

        async fn additional_system_prompt(
            &self,
            _context: &RunContext,
            _agent: &AgentInfo,
            _mode: ProcessingMode,
        ) -> Option<crate::PromptFragment> {
            Some(crate::PromptFragment::new("Report the user's mood"))
        }

        fn output_schema(&self, _mode: ProcessingMode) -> Option<(String, Value)> {
            Some(("mood".to_string(), json!({"type": "string"})))
        }

        async fn consume(&self, value: &Value, _context: &RunContext, _agent: &AgentInfo) {
            self.consumed.lock().unwrap().push(value.clone());
        }

        fn tools(&self) -> Vec<RegisteredTool> {
            vec![RegisteredTool::internal(
                ToolDefinition::builder("log_mood").build(),
                vec![],
                handler_fn(|_inv| async { Ok(Value::Null) }),
            )]
        }

        fn on_registration_completed(&self, agent: &AgentInfo) {
            *self.registered.lock().unwrap() = Some(agent.name.clone());
        }
    }

    #[tokio::test]
    async fn test_extension_composition() {
        let tracker = Arc::new(MoodTracker::default());
        let model = Arc::new(ScriptedModel::new(vec![ScriptedTurn::Output(
            json!({"output": "Hi!", "mood": "cheerful"}),
        )]));
        let executor = agent(model.clone()).extension(tracker.clone()).build().unwrap();

        assert_eq!(executor.info().tools, vec!["get_name", "log_mood"]);
        assert_eq!(tracker.registered.lock().unwrap().as_deref(), Some("greeter"));
        let schema = executor.output_schema_for(ProcessingMode::Direct);
        assert_eq!(schema["required"], json!(["output", "mood"]));

        let output = executor.execute(AgentInput::new("hello")).await.unwrap();

        assert_eq!(output.data, Some(json!("Hi!")));
        assert_eq!(*tracker.consumed.lock().unwrap(), vec![json!("cheerful")]);
        let system = &model.histories()[0][0];
        assert!(matches!(
            &system.payload,
            MessagePayload::SystemPrompt { content, .. } if content.contains("## mood")
        ));
    }

    #[test]
    fn test_duplicate_extension_tool_rejected() {
        let result = AgentExecutor::builder("dup")
            .tool(get_name_tool())
            .tool(get_name_tool())
            .build();
        assert!(matches!(result, Err(Error::InitializationFailed(_))));
    }

    #[test]
    fn test_execute_blocking() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::call("c1", "get_name", "{}"),
            ScriptedTurn::output("Hello Santanu"),
        ]));
        let executor = agent(model).build().unwrap();

        let output = executor.execute_blocking(AgentInput::new("hi")).unwrap();
        assert_eq!(output.text().as_deref(), Some("Hello Santanu"));
    }

    #[tokio::test]
    async fn test_agent_trait_process() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedTurn::output("Hello Santanu"),
            ScriptedTurn::error(ErrorKind::Refused, "nope"),
        ]));
        let executor = agent(model).description("Greets").build().unwrap();
        let agent: &dyn Agent = &executor;

        assert_eq!(agent.name(), "greeter");
        assert_eq!(agent.description(), "Greets");
        assert_eq!(
            agent.process("hi".into(), &RequestMetadata::new()).await.unwrap(),
            "Hello Santanu"
        );
        let err = agent.process("hi".into(), &RequestMetadata::new()).await.unwrap_err();
        assert!(err.to_string().contains("REFUSED"));
    }
}
