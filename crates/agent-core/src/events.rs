//! Lifecycle events emitted during a run
//!
//! Events go to an [`EventBus`] owned by the run's configuration; there is no
//! global bus. Handlers are notified in registration order and cannot fail
//! the run.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::ErrorKind;

/// An observable step of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    InputReceived {
        agent: String,
        run_id: String,
        session_id: Option<String>,
        request: Value,
    },
    ToolCalled {
        agent: String,
        run_id: String,
        call_id: String,
        tool_name: String,
        arguments: String,
    },
    ToolCallApprovalDenied {
        agent: String,
        run_id: String,
        call_id: String,
        tool_name: String,
    },
    ToolCallCompleted {
        agent: String,
        run_id: String,
        call_id: String,
        tool_name: String,
        success: bool,
        kind: ErrorKind,
        payload: String,
        elapsed: Duration,
    },
    OutputGenerated {
        agent: String,
        run_id: String,
        output: Value,
        elapsed: Duration,
    },
    OutputError {
        agent: String,
        run_id: String,
        kind: ErrorKind,
        message: String,
        elapsed: Duration,
    },
    RunTerminated {
        agent: String,
        run_id: String,
        reason: String,
    },
}

impl AgentEvent {
    pub fn run_id(&self) -> &str {
        match self {
            Self::InputReceived { run_id, .. }
            | Self::ToolCalled { run_id, .. }
            | Self::ToolCallApprovalDenied { run_id, .. }
            | Self::ToolCallCompleted { run_id, .. }
            | Self::OutputGenerated { run_id, .. }
            | Self::OutputError { run_id, .. }
            | Self::RunTerminated { run_id, .. } => run_id,
        }
    }
}

/// Receives run events
///
/// Implement this trait to stream run progress to clients, collect metrics
/// or write audit logs.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, event: &AgentEvent);
}

/// No-op event handler for when events are not needed
pub struct NoOpEventHandler;

#[async_trait]
impl EventHandler for NoOpEventHandler {
    async fn on_event(&self, _event: &AgentEvent) {}
}

/// Ordered list of handlers, cheap to clone into per-run configuration
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn subscribe(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn emit(&self, event: AgentEvent) {
        for handler in &self.handlers {
            handler.on_event(&event).await;
        }
    }
}

/// Handler that records every event, for tests and debugging
#[derive(Debug, Default)]
pub struct CapturingHandler {
    events: Mutex<Vec<AgentEvent>>,
}

impl CapturingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything captured so far
    pub fn events(&self) -> Vec<AgentEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventHandler for CapturingHandler {
    async fn on_event(&self, event: &AgentEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bus_fans_out_in_order() {
        let first = Arc::new(CapturingHandler::new());
        let second = Arc::new(CapturingHandler::new());
        let bus = EventBus::new()
            .with_handler(first.clone())
            .with_handler(Arc::new(NoOpEventHandler))
            .with_handler(second.clone());

        bus.emit(AgentEvent::RunTerminated {
            agent: "a".into(),
            run_id: "r1".into(),
            reason: "max turns".into(),
        })
        .await;

        assert_eq!(first.events().len(), 1);
        assert_eq!(second.events()[0].run_id(), "r1");
    }

    #[test]
    fn test_empty_bus() {
        let bus = EventBus::new();
        assert!(bus.is_empty());
        tokio_test::block_on(bus.emit(AgentEvent::RunTerminated {
            agent: "a".into(),
            run_id: "r1".into(),
            reason: String::new(),
        }));
    }
}
