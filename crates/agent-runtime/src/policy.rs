//! Output validation and early termination policies

use agent_core::RunContext;
use serde_json::Value;

/// Second opinion on a syntactically valid output
///
/// A rejection sends the reason back to the model as a corrective message
/// and the run continues.
pub trait OutputValidator: Send + Sync {
    fn validate(&self, output: &Value, context: &RunContext) -> Result<(), String>;
}

/// Approves every output
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl OutputValidator for AcceptAll {
    fn validate(&self, _output: &Value, _context: &RunContext) -> Result<(), String> {
        Ok(())
    }
}

/// Requires the output to be an object with non-null values for the keys
#[derive(Debug, Clone, Default)]
pub struct RequiredFields {
    keys: Vec<String>,
}

impl RequiredFields {
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl OutputValidator for RequiredFields {
    fn validate(&self, output: &Value, _context: &RunContext) -> Result<(), String> {
        let Some(object) = output.as_object() else {
            return Err("output must be a JSON object".to_string());
        };
        let missing: Vec<&str> = self
            .keys
            .iter()
            .filter(|key| object.get(key.as_str()).is_none_or(Value::is_null))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing required fields: {}", missing.join(", ")))
        }
    }
}

/// Consulted before every exchange; `Some(reason)` stops the run
pub trait EarlyTermination: Send + Sync {
    /// `turns` is the number of exchanges already completed in this run
    fn should_terminate(&self, context: &RunContext, turns: u32) -> Option<String>;
}

/// Never stops a run early
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverTerminate;

impl EarlyTermination for NeverTerminate {
    fn should_terminate(&self, _context: &RunContext, _turns: u32) -> Option<String> {
        None
    }
}

/// Stops a run after a fixed number of exchanges
#[derive(Debug, Clone, Copy)]
pub struct MaxTurns(pub u32);

impl EarlyTermination for MaxTurns {
    fn should_terminate(&self, _context: &RunContext, turns: u32) -> Option<String> {
        (turns >= self.0).then(|| format!("maximum of {} turns reached", self.0))
    }
}

/// Stops a run once its token usage reaches the budget
#[derive(Debug, Clone, Copy)]
pub struct TokenBudget(pub u64);

impl EarlyTermination for TokenBudget {
    fn should_terminate(&self, context: &RunContext, _turns: u32) -> Option<String> {
        let used = context.usage().total_tokens();
        (used >= self.0).then(|| format!("token budget of {} exhausted ({used} used)", self.0))
    }
}
