// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-tool-call log records.
//!
//! One record per finished tool call, emitted when the logs exporter is
//! enabled. [`TracingToolLog`] writes them as `tracing` events; the `otlp`
//! feature adds an exporter that ships them as OTLP log records.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::error::TelemetryError;

/// `tracing` target of tool-call records.
pub const TOOL_CALL_TARGET: &str = "agent_otel::tool_call";

/// A finished tool call, as logged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub duration_ms: f64,
    pub status: String,
    pub error: Option<String>,
}

impl ToolCallRecord {
    pub fn new(
        tool_name: impl Into<String>,
        duration_ms: f64,
        status: impl Into<String>,
        error: Option<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            duration_ms,
            status: status.into(),
            error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status == "error"
    }

    /// Record body: `Tool call completed` or `Tool call failed`.
    pub fn body(&self) -> &'static str {
        if self.is_error() {
            "Tool call failed"
        } else {
            "Tool call completed"
        }
    }
}

/// Sink for tool-call records. Must not fail or block.
pub trait ToolCallLog: Send + Sync {
    fn emit(&self, record: &ToolCallRecord);

    fn force_flush(&self, _timeout: Duration) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Drops every record (logs exporter set to `none`).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopToolLog;

impl ToolCallLog for NoopToolLog {
    fn emit(&self, _record: &ToolCallRecord) {}
}

/// Emits records as `tracing` events under [`TOOL_CALL_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingToolLog;

impl ToolCallLog for TracingToolLog {
    fn emit(&self, record: &ToolCallRecord) {
        tracing::event!(
            target: TOOL_CALL_TARGET,
            tracing::Level::INFO,
            tool.name = %record.tool_name,
            tool.duration_ms = record.duration_ms,
            tool.status = %record.status,
            tool.error = record.error.as_deref().unwrap_or_default(),
            "{}",
            record.body()
        );
    }
}

/// Keeps records in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingToolLog {
    records: Arc<Mutex<Vec<ToolCallRecord>>>,
}

impl RecordingToolLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ToolCallRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ToolCallLog for RecordingToolLog {
    fn emit(&self, record: &ToolCallRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
    }
}
