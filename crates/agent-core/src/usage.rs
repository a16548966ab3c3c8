//! Usage accounting shared across a run

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters accumulated over a run
///
/// Shared by reference (`Arc<UsageStats>`) between the run loop, the model
/// boundary and concurrently completing tool calls, so every counter is
/// atomic. Merging is additive and never replaces the target.
#[derive(Debug, Default)]
pub struct UsageStats {
    requests: AtomicU64,
    tool_calls: AtomicU64,
    request_tokens: AtomicU64,
    response_tokens: AtomicU64,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record model requests
    pub fn add_requests(&self, count: u64) {
        self.requests.fetch_add(count, Ordering::Relaxed);
    }

    /// Record executed tool calls
    pub fn add_tool_calls(&self, count: u64) {
        self.tool_calls.fetch_add(count, Ordering::Relaxed);
    }

    /// Record token consumption of a single model call
    pub fn add_tokens(&self, request_tokens: u64, response_tokens: u64) {
        self.request_tokens.fetch_add(request_tokens, Ordering::Relaxed);
        self.response_tokens.fetch_add(response_tokens, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls.load(Ordering::Relaxed)
    }

    pub fn total_tokens(&self) -> u64 {
        self.request_tokens.load(Ordering::Relaxed) + self.response_tokens.load(Ordering::Relaxed)
    }

    /// Add every counter of `other` into `self`
    pub fn merge(&self, other: &UsageStats) {
        self.merge_snapshot(&other.snapshot());
    }

    /// Add a snapshot's counters into `self`
    pub fn merge_snapshot(&self, other: &UsageSnapshot) {
        self.add_requests(other.requests);
        self.add_tool_calls(other.tool_calls);
        self.add_tokens(other.request_tokens, other.response_tokens);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> UsageSnapshot {
        let request_tokens = self.request_tokens.load(Ordering::Relaxed);
        let response_tokens = self.response_tokens.load(Ordering::Relaxed);
        UsageSnapshot {
            requests: self.requests(),
            tool_calls: self.tool_calls(),
            request_tokens,
            response_tokens,
            total_tokens: request_tokens + response_tokens,
        }
    }
}

/// Plain, serializable copy of [`UsageStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub requests: u64,
    pub tool_calls: u64,
    pub request_tokens: u64,
    pub response_tokens: u64,
    pub total_tokens: u64,
}
