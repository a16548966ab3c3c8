//! Library defaults
//!
//! Values used whenever neither the agent nor the per-request override sets
//! a field. Deserializable so applications can ship their own defaults file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Library-wide fallback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Model identifier passed to the model boundary when none is configured
    pub model: String,
    /// Max tokens per completion
    pub max_tokens: usize,
    /// Sampling temperature
    pub temperature: f32,
    /// Per-attempt timeout for a tool call, in milliseconds
    pub tool_timeout_ms: u64,
    /// Additional attempts allowed for a transient tool failure
    pub tool_retries: u32,
    /// Delay between attempts, in milliseconds
    pub retry_delay_ms: u64,
    /// Attempts for a whole model exchange (1 = no outer retry)
    pub exchange_attempts: u32,
    /// Corrective turns allowed after an output validation rejection
    pub validation_attempts: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            tool_timeout_ms: 30_000,
            tool_retries: 0,
            retry_delay_ms: 0,
            exchange_attempts: 1,
            validation_attempts: 3,
        }
    }
}

impl Defaults {
    /// Parse defaults from a JSON document; missing fields keep their default
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Tool timeout as a [`Duration`]
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    /// Retry delay as a [`Duration`]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
