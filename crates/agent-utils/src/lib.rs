//! Shared utilities for agent-rs
//!
//! Logging setup, library-wide defaults and small helpers used across the
//! workspace.

pub mod config;
pub mod logging;

pub use config::Defaults;
pub use logging::{init_json_tracing, init_tracing, preview};
