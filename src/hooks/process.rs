// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hooks that run as one short-lived process per event.
//!
//! `pre-tool` and `post-tool` are separate processes, so the start of a call
//! travels between them through a [`ContextStore`]. Each `post-tool` run
//! emits one standalone span and flushes before exiting.

use std::time::{Duration, SystemTime};

use serde_json::Value;
use tracing::debug;

use crate::telemetry::{
    system_time_from_nanos, unix_nanos, Attribute, MetricsRecorder, SpanRequest, SpanStatus,
    TelemetryTracer, ToolCallLog, ToolCallRecord,
};

use super::classify::{classify, error_message, ToolStatus};
use super::context_store::{ContextStore, ToolInvocationContext};
use super::event::{HookEvent, UNKNOWN_MODEL};
use super::summary::{input_summary, payload_size, truncate_attribute, truncate_chars, value_to_string};
use super::transcript::extract_usage;

/// What a `post-tool` run emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct PostToolReport {
    pub tool_name: String,
    pub status: ToolStatus,
    pub duration_ms: f64,
    /// Whether a stored pre-tool context was found.
    pub correlated: bool,
}

/// Store the start of a tool call for the matching `post-tool` run.
///
/// Returns whether anything was stored; events without a `tool_use_id` are
/// skipped and store failures are only logged.
pub fn run_pre_tool(event: &HookEvent, store: &dyn ContextStore) -> bool {
    let Some(id) = event.tool_use_id() else {
        debug!("pre-tool event without tool_use_id, nothing stored");
        return false;
    };

    let context = ToolInvocationContext::starting_now(
        event.tool_name_or_default(),
        event.tool_input_or_null().clone(),
        event.session_id.clone().unwrap_or_default(),
        event.cwd.clone().unwrap_or_default(),
    );

    match store.put(id, &context) {
        Ok(()) => true,
        Err(e) => {
            debug!(id, error = %e, "Failed to store tool context");
            false
        }
    }
}

fn first_non_empty(primary: Option<&str>, fallback: Option<&str>) -> String {
    primary
        .filter(|s| !s.is_empty())
        .or(fallback.filter(|s| !s.is_empty()))
        .unwrap_or_default()
        .to_string()
}

/// One attribute per top-level key, or a single attribute for scalars.
fn payload_attributes(prefix: &str, payload: &Value) -> Vec<Attribute> {
    match payload {
        Value::Null => Vec::new(),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                Attribute::new(
                    format!("{}.{}", prefix, key),
                    truncate_attribute(&value_to_string(value)),
                )
            })
            .collect(),
        other => vec![Attribute::new(
            prefix,
            truncate_attribute(&value_to_string(other)),
        )],
    }
}

fn flush(tracer: &dyn TelemetryTracer, metrics: &dyn MetricsRecorder, timeout: Duration) {
    if let Err(e) = tracer.force_flush(timeout) {
        debug!(error = %e, "Span flush failed");
    }
    if let Err(e) = metrics.force_flush(timeout) {
        debug!(error = %e, "Metrics flush failed");
    }
}

/// Emit the span, metric and log record for a finished tool call.
pub fn run_post_tool(
    event: &HookEvent,
    store: &dyn ContextStore,
    tracer: &dyn TelemetryTracer,
    metrics: &dyn MetricsRecorder,
    tool_log: &dyn ToolCallLog,
    flush_timeout: Duration,
) -> PostToolReport {
    let tool_use_id = event.tool_use_id().unwrap_or_default();
    let stored = store.take(tool_use_id);
    if stored.is_none() {
        debug!(id = tool_use_id, "No stored context for tool call");
    }

    let mut tool_name = first_non_empty(
        event.tool_name.as_deref(),
        stored.as_ref().map(|c| c.tool_name.as_str()),
    );
    if tool_name.is_empty() {
        tool_name = event.tool_name_or_default().to_string();
    }
    let session_id = first_non_empty(
        event.session_id.as_deref(),
        stored.as_ref().map(|c| c.session_id.as_str()),
    );
    let cwd = first_non_empty(event.cwd.as_deref(), stored.as_ref().map(|c| c.cwd.as_str()));

    let input = match (&event.tool_input, &stored) {
        (Some(input), _) if !input.is_null() => input.clone(),
        (_, Some(ctx)) => ctx.tool_input.clone(),
        _ => Value::Null,
    };
    let response = event.tool_response.clone().unwrap_or(Value::Null);

    let (start_time, duration_ms) = match &stored {
        Some(ctx) => {
            let elapsed_ns = unix_nanos().saturating_sub(ctx.start_time_ns);
            (
                system_time_from_nanos(ctx.start_time_ns),
                elapsed_ns as f64 / 1_000_000.0,
            )
        }
        None => (SystemTime::now(), 0.0),
    };

    let status = classify(&response);
    let error = error_message(&response);

    let mut attributes = vec![
        Attribute::new("tool.name", tool_name.as_str()),
        Attribute::new("tool.use_id", tool_use_id),
        Attribute::new("session.id", session_id.as_str()),
        Attribute::new("tool.cwd", cwd.as_str()),
        Attribute::new("tool.input.summary", input_summary(&input, &tool_name)),
        Attribute::new("tool.input_size_bytes", payload_size(&input)),
        Attribute::new("tool.response_size_bytes", payload_size(&response)),
    ];
    attributes.extend(payload_attributes("tool.input", &input));
    attributes.extend(payload_attributes("tool.response", &response));

    let mut span = tracer.start_span(
        SpanRequest::new(format!("tool.{}", tool_name))
            .with_attributes(attributes)
            .with_start_time(start_time),
    );

    if let Some(usage) = event
        .transcript_path
        .as_deref()
        .and_then(|path| extract_usage(path, tool_use_id))
    {
        span.set_attribute(Attribute::new("gen_ai.usage.input_tokens", usage.input_tokens));
        span.set_attribute(Attribute::new("gen_ai.usage.output_tokens", usage.output_tokens));
        span.set_attribute(Attribute::new("tokens.cache_read", usage.cache_read_input_tokens));
        span.set_attribute(Attribute::new(
            "tokens.cache_creation",
            usage.cache_creation_input_tokens,
        ));
    }

    span.set_attribute(Attribute::new("tool.status", status.as_str()));
    span.set_attribute(Attribute::new("tool.duration_ms", duration_ms));
    match &error {
        Some(message) => {
            span.set_attribute(Attribute::new("tool.error", message.as_str()));
            span.set_status(SpanStatus::Error(truncate_chars(message, 100).to_string()));
        }
        None => span.set_status(SpanStatus::Ok),
    }
    span.end();

    metrics.record_tool_call(&tool_name, duration_ms, status.is_error());
    tool_log.emit(&ToolCallRecord::new(
        tool_name.as_str(),
        duration_ms,
        status.as_str(),
        error,
    ));

    flush(tracer, metrics, flush_timeout);
    if let Err(e) = tool_log.force_flush(flush_timeout) {
        debug!(error = %e, "Log flush failed");
    }

    PostToolReport {
        tool_name,
        status,
        duration_ms,
        correlated: stored.is_some(),
    }
}

/// Emit a standalone span and metric for a context compaction.
pub fn run_pre_compact(
    event: &HookEvent,
    tracer: &dyn TelemetryTracer,
    metrics: &dyn MetricsRecorder,
    flush_timeout: Duration,
) {
    let trigger = event.trigger_or_default();
    let has_custom_instructions = event.custom_instructions.is_some();
    let session_id = event.session_id.as_deref().unwrap_or_default();

    let mut span = tracer.start_span(SpanRequest::new("context.compaction").with_attributes(vec![
        Attribute::new("compaction.trigger", trigger),
        Attribute::new("compaction.has_custom_instructions", has_custom_instructions),
        Attribute::new("session.id", session_id),
    ]));
    span.add_event(
        "context.compaction",
        vec![
            Attribute::new("trigger", trigger),
            Attribute::new("has_custom_instructions", has_custom_instructions),
        ],
    );
    span.set_status(SpanStatus::Ok);
    span.end();

    metrics.record_compaction(trigger, UNKNOWN_MODEL);
    flush(tracer, metrics, flush_timeout);
}
