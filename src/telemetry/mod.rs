// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry backends, metrics and logging.
//!
//! - **Backends**: the [`TelemetryTracer`] / [`TelemetrySpan`] traits with a
//!   log backend, an in-memory recorder, and (feature `otlp`) an OTLP exporter
//! - **Metrics**: the [`MetricsRecorder`] contract and the in-process
//!   [`HookMetrics`] registry
//! - **Tool-call logs**: one [`ToolCallRecord`] per finished tool call
//! - **Correlation**: session ids and fallback tool-call ids
//! - **Logging**: stderr diagnostics via `tracing-subscriber`
//!
//! # Usage
//!
//! ```rust,ignore
//! use agent_otel::telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::for_debug_flag(config.debug))?;
//! ```

mod backend;
mod correlation;
mod init;
mod logs;
pub mod metrics;
#[cfg(feature = "otlp")]
pub mod otlp;
mod recording;

pub use backend::{
    flush_with_timeout, Attribute, AttributeValue, LogSpan, LogTracer, SpanRequest, SpanStatus,
    TelemetrySpan, TelemetryTracer,
};
pub use correlation::{
    fallback_prefix, fallback_tool_use_id, resolve_tool_use_id, system_time_from_nanos,
    unix_nanos, SessionId,
};
pub use init::{init_logging, LogConfig};
pub use logs::{
    NoopToolLog, RecordingToolLog, ToolCallLog, ToolCallRecord, TracingToolLog, TOOL_CALL_TARGET,
};
pub use metrics::{HookMetrics, MetricsRecorder, MetricsSnapshot, NoopMetrics, ToolMetrics};
pub use recording::{RecordedEvent, RecordedSpan, RecordingSpan, RecordingTracer};
