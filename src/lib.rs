// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! agent-otel - OpenTelemetry instrumentation for LLM agent CLIs.
//!
//! Correlates the lifecycle events an agent runtime fires (prompt submitted,
//! tool about to run, tool finished, turn complete, context compaction) into
//! one span per session with a child span per tool call, and keeps token and
//! tool metrics alongside. Telemetry is best-effort: a missing collector or a
//! malformed payload never reaches the host.
//!
//! # Architecture
//!
//! - [`error`] - Error types and result aliases
//! - [`config`] - Configuration loading and merging (file, then `OTEL_*` environment)
//! - [`telemetry`] - Tracer and metrics backends, logging setup, correlation ids
//! - [`hooks`] - Session controller, per-process hooks, transcript and payload helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use agent_otel::hooks::{ControllerOptions, HookContext, HookEvent, SessionController};
//! use agent_otel::telemetry::{HookMetrics, LogTracer};
//!
//! let mut controller = SessionController::new(
//!     Arc::new(LogTracer::new()),
//!     Arc::new(HookMetrics::new()),
//!     ControllerOptions::default(),
//! );
//!
//! controller.on_prompt_submit(&HookEvent::prompt("List the files"), &HookContext::with_model("sonnet"));
//! controller.on_pre_tool_use(&HookEvent::tool("Bash", serde_json::json!({"command": "ls"})).with_id("t1"));
//! controller.on_post_tool_use(&HookEvent::tool("Bash", serde_json::json!({})).with_id("t1"));
//! let summary = controller.complete_session();
//! ```

pub mod config;
pub mod error;
pub mod hooks;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{load_config, load_config_or_default, OtelConfig};
pub use error::{ConfigError, HookError, Result, StoreError, TelemetryError};
pub use hooks::{
    AssistantMessage, ControllerOptions, HookContext, HookEvent, SessionController,
    SessionSummary, TokenUsage,
};
pub use telemetry::{MetricsRecorder, TelemetrySpan, TelemetryTracer, ToolCallLog};

/// agent-otel version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        let _event = HookEvent::prompt("test");
        let _options = ControllerOptions::default();
        let _usage = TokenUsage::default();
    }
}
