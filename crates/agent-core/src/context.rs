//! Request metadata and per-run context
//!
//! [`RequestMetadata`] is supplied by the caller with every request.
//! [`RunContext`] is built by the runtime for one run and handed to tools,
//! extensions and the model boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{AgentMessage, UsageStats};

/// Well-known metadata keys
pub mod keys {
    /// Session ID for tracking
    pub const SESSION_ID: &str = "session_id";
    /// User ID for personalization
    pub const USER_ID: &str = "user_id";
    /// Language preference (e.g., "en", "zh")
    pub const LANGUAGE: &str = "language";
}

/// Caller-supplied metadata for a request
///
/// Besides the typed session and user ids it carries free-form key-value
/// data, and optionally a usage accumulator that outlives the run: when
/// present, the run's usage is merged into it on success.
///
/// # Example
///
/// ```
/// use agent_core::RequestMetadata;
///
/// let meta = RequestMetadata::new()
///     .with_session_id("session-123")
///     .with_user_id("user-1");
///
/// assert_eq!(meta.session_id(), Some("session-123"));
/// assert_eq!(meta.user_id(), Some("user-1"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    session_id: Option<String>,
    user_id: Option<String>,
    usage: Option<Arc<UsageStats>>,
    data: HashMap<String, Value>,
}

impl RequestMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    // =========== Builder Methods ===========

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach a long-lived usage accumulator
    pub fn with_usage(mut self, usage: Arc<UsageStats>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    // =========== Accessors ===========

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn usage(&self) -> Option<&Arc<UsageStats>> {
        self.usage.as_ref()
    }

    pub fn language(&self) -> Option<&str> {
        self.get(keys::LANGUAGE).and_then(Value::as_str)
    }

    // =========== Generic Key-Value Operations ===========

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Insert a typed value, serializing it to JSON
    pub fn insert_typed<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> crate::Result<()> {
        let json_value = serde_json::to_value(value)?;
        self.data.insert(key.into(), json_value);
        Ok(())
    }

    /// Read a typed value; `Ok(None)` when the key is absent
    pub fn get_typed<T: for<'de> Deserialize<'de>>(&self, key: &str) -> crate::Result<Option<T>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }
}

/// How a run delivers its output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Single structured result
    #[default]
    Direct,
    /// Incremental text delivered to a byte sink
    Streaming,
}

/// Provider-neutral model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub model: String,
    pub max_tokens: usize,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub parallel_tool_calls: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self::from_defaults(&agent_utils::Defaults::default())
    }
}

impl ModelSettings {
    pub fn from_defaults(defaults: &agent_utils::Defaults) -> Self {
        Self {
            model: defaults.model.clone(),
            max_tokens: defaults.max_tokens,
            temperature: Some(defaults.temperature),
            top_p: None,
            parallel_tool_calls: true,
        }
    }
}

/// Everything known about one run
///
/// Immutable once built, apart from the shared [`UsageStats`]. The runtime
/// produces a fresh snapshot (via [`RunContext::with_messages`]) before every
/// model exchange; tool tasks receive an `Arc` of the snapshot current at the
/// time of the call.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: String,
    agent_name: String,
    request: Value,
    metadata: RequestMetadata,
    settings: ModelSettings,
    mode: ProcessingMode,
    messages: Vec<AgentMessage>,
    usage: Arc<UsageStats>,
}

impl RunContext {
    pub fn new(
        run_id: impl Into<String>,
        agent_name: impl Into<String>,
        request: Value,
        metadata: RequestMetadata,
        settings: ModelSettings,
        mode: ProcessingMode,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            agent_name: agent_name.into(),
            request,
            metadata,
            settings,
            mode,
            messages: Vec::new(),
            usage: Arc::new(UsageStats::new()),
        }
    }

    /// Same run, with the given history snapshot
    pub fn with_messages(&self, messages: Vec<AgentMessage>) -> Self {
        Self {
            messages,
            ..self.clone()
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn session_id(&self) -> Option<&str> {
        self.metadata.session_id()
    }

    pub fn request(&self) -> &Value {
        &self.request
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    pub fn messages(&self) -> &[AgentMessage] {
        &self.messages
    }

    /// The run's usage accumulator; clones share the same counters
    pub fn usage(&self) -> &Arc<UsageStats> {
        &self.usage
    }
}
