// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session/span correlation for in-process hooks.
//!
//! A [`SessionController`] turns the host's lifecycle events into one
//! session span with tool spans (or tool events) underneath, and keeps
//! running token and tool counters for the session.
//!
//! ```text
//! Idle --prompt_submit--> SessionOpen --complete_session--> Idle
//!                           |  pre_tool(id)  -> pending[id]
//!                           |  post_tool(id) -> pending[id] removed
//! ```
//!
//! Pending tools are keyed by id rather than stacked, so `pre(B)` may arrive
//! before `post(A)`. Handlers never return errors or panic into the caller;
//! anything unexpected is logged at debug level and dropped.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{OtelConfig, DEFAULT_FLUSH_TIMEOUT_MS};
use crate::error::HookError;
use crate::telemetry::{
    fallback_prefix, resolve_tool_use_id, Attribute, MetricsRecorder, NoopToolLog, SessionId,
    SpanRequest, SpanStatus, TelemetrySpan, TelemetryTracer, ToolCallLog, ToolCallRecord,
};

use super::classify::{classify, error_message};
use super::event::{AssistantMessage, HookContext, HookEvent, TokenUsage, UNKNOWN_MODEL};
use super::summary::{preview, prompt_preview, tool_title, truncate_chars};
use super::transcript::scan_turns_since;

/// Status message on tool spans still open when their session ends.
pub const UNFINISHED_TOOL_MESSAGE: &str = "session ended before tool completed";

/// Controller behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    /// One child span per tool call; otherwise tool events on the session span.
    pub create_tool_spans: bool,
    /// Upper bound on the flush in [`SessionController::complete_session`].
    pub flush_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            create_tool_spans: true,
            flush_timeout: Duration::from_millis(DEFAULT_FLUSH_TIMEOUT_MS),
        }
    }
}

impl From<&OtelConfig> for ControllerOptions {
    fn from(config: &OtelConfig) -> Self {
        Self {
            create_tool_spans: config.create_tool_spans,
            flush_timeout: config.flush_timeout(),
        }
    }
}

/// Running totals for the open session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMetrics {
    /// Full prompt text (span attributes carry a truncated copy).
    pub prompt: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub tools_used_count: u64,
    pub turns: u64,
    pub start_time: DateTime<Utc>,
}

impl SessionMetrics {
    fn new(prompt: String, model: String) -> Self {
        Self {
            prompt,
            model,
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
            cache_creation_tokens: 0,
            tools_used_count: 0,
            turns: 0,
            start_time: Utc::now(),
        }
    }
}

/// Who said something in the session log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the session's message log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: Value,
}

/// What a finished session looked like.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub metrics: SessionMetrics,
    pub duration_ms: f64,
    /// Distinct tool names, sorted.
    pub tool_names: Vec<String>,
    /// Tool calls that never saw a post-tool event.
    pub unfinished_tools: usize,
}

struct PendingTool {
    span: Option<Box<dyn TelemetrySpan>>,
    tool_name: String,
    started_at: Instant,
    seq: u64,
}

impl PendingTool {
    fn close_unfinished(mut self, event: &str, reason: &str) {
        if let Some(span) = self.span.as_mut() {
            span.add_event(event, Vec::new());
            span.set_attribute(Attribute::new("tool.status", "error"));
            span.set_status(SpanStatus::Error(reason.to_string()));
            span.end();
        }
    }
}

struct ActiveSession {
    span: Box<dyn TelemetrySpan>,
    session_id: SessionId,
    metrics: SessionMetrics,
    started_at: Instant,
    messages: Vec<Message>,
    tools_used: Vec<String>,
    pending: HashMap<String, PendingTool>,
    next_seq: u64,
    /// Transcript entries already counted by `on_stop`.
    transcript_cursor: usize,
}

impl ActiveSession {
    /// Pending entries, oldest first.
    fn drain_pending(&mut self) -> Vec<(String, PendingTool)> {
        let mut pending: Vec<_> = self.pending.drain().collect();
        pending.sort_by_key(|(_, p)| p.seq);
        pending
    }

    /// Key of the pending entry a post-tool event refers to: the exact id,
    /// else the most recent fallback id for the same tool name.
    fn resolve_pending(&self, tool_use_id: Option<&str>, tool_name: &str) -> Option<String> {
        if let Some(id) = tool_use_id.filter(|id| self.pending.contains_key(*id)) {
            return Some(id.to_string());
        }

        let prefix = fallback_prefix(tool_name);
        self.pending
            .iter()
            .filter(|(id, _)| id.starts_with(&prefix))
            .max_by_key(|(_, p)| p.seq)
            .map(|(id, _)| id.clone())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Correlates hook events into spans and metrics.
pub struct SessionController {
    tracer: Arc<dyn TelemetryTracer>,
    metrics: Arc<dyn MetricsRecorder>,
    tool_log: Arc<dyn ToolCallLog>,
    options: ControllerOptions,
    session: Option<ActiveSession>,
    last_completed_at: Option<Instant>,
}

impl SessionController {
    pub fn new(
        tracer: Arc<dyn TelemetryTracer>,
        metrics: Arc<dyn MetricsRecorder>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            tracer,
            metrics,
            tool_log: Arc::new(NoopToolLog),
            options,
            session: None,
            last_completed_at: None,
        }
    }

    /// Emit one [`ToolCallRecord`] per completed tool call to `tool_log`.
    pub fn with_tool_log(mut self, tool_log: Arc<dyn ToolCallLog>) -> Self {
        self.tool_log = tool_log;
        self
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Whether a session span is open.
    pub fn is_session_open(&self) -> bool {
        self.session.is_some()
    }

    /// Id of the open session.
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    /// Running totals of the open session.
    pub fn session_metrics(&self) -> Option<&SessionMetrics> {
        self.session.as_ref().map(|s| &s.metrics)
    }

    /// Message log of the open session.
    pub fn messages(&self) -> &[Message] {
        self.session
            .as_ref()
            .map(|s| s.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Tool names used so far, with repeats, in call order.
    pub fn tools_used(&self) -> &[String] {
        self.session
            .as_ref()
            .map(|s| s.tools_used.as_slice())
            .unwrap_or(&[])
    }

    /// Number of tool calls started but not yet completed.
    pub fn pending_tool_count(&self) -> usize {
        self.session.as_ref().map(|s| s.pending.len()).unwrap_or(0)
    }

    /// Run a handler body, turning errors and panics into debug logs.
    fn guarded<T>(
        &mut self,
        handler: &'static str,
        body: impl FnOnce(&mut Self) -> Result<T, HookError>,
    ) -> Option<T> {
        match panic::catch_unwind(AssertUnwindSafe(|| body(self))) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                debug!(handler, error = %e, "Hook event ignored");
                None
            }
            Err(payload) => {
                let e = HookError::Panicked(panic_message(payload.as_ref()));
                debug!(handler, error = %e, "Hook handler failed");
                None
            }
        }
    }

    /// Open a session span for a submitted prompt.
    ///
    /// A session that is still open is closed first as superseded.
    pub fn on_prompt_submit(&mut self, event: &HookEvent, ctx: &HookContext) {
        self.guarded("prompt_submit", |this| this.open_session(event, ctx));
    }

    fn open_session(&mut self, event: &HookEvent, ctx: &HookContext) -> Result<(), HookError> {
        if let Some(stale) = self.session.take() {
            Self::supersede(stale);
        }

        let prompt = event.prompt.clone().unwrap_or_default();
        let session_id = SessionId::resolve(event.session_id.as_deref());
        let model = ctx.model.clone();

        let mut span = self.tracer.start_span(
            SpanRequest::new(format!("claude.session: {}", prompt_preview(&prompt)))
                .with_attributes(vec![
                    Attribute::new("prompt", truncate_chars(&prompt, 1000)),
                    Attribute::new("model", model.as_str()),
                    Attribute::new("session.id", session_id.as_str()),
                    Attribute::new("gen_ai.system", "anthropic"),
                    Attribute::new("gen_ai.request.model", model.as_str()),
                ]),
        );
        span.add_event(
            "user.prompt.submitted",
            vec![Attribute::new("prompt", truncate_chars(&prompt, 500))],
        );

        self.metrics.record_model_request(&model);
        if let Some(completed) = self.last_completed_at {
            self.metrics.record_prompt_latency(elapsed_ms(completed), &model);
        }

        debug!(session = session_id.short(), model = %model, "Session opened");

        self.session = Some(ActiveSession {
            span,
            session_id,
            messages: vec![Message {
                role: Role::User,
                content: Value::String(prompt.clone()),
            }],
            metrics: SessionMetrics::new(prompt, model),
            started_at: Instant::now(),
            tools_used: Vec::new(),
            pending: HashMap::new(),
            next_seq: 0,
            transcript_cursor: 0,
        });

        Ok(())
    }

    fn supersede(mut stale: ActiveSession) {
        debug!(session = stale.session_id.short(), "Closing superseded session");

        for (_, pending) in stale.drain_pending() {
            pending.close_unfinished("session.superseded", "session superseded by a new prompt");
        }

        stale
            .span
            .set_attribute(Attribute::new("session.status", "superseded"));
        stale.span.set_attribute(Attribute::new(
            "session.duration_ms",
            elapsed_ms(stale.started_at),
        ));
        stale.span.add_event("session.superseded", Vec::new());
        stale
            .span
            .set_status(SpanStatus::Error("superseded by a new prompt".to_string()));
        stale.span.end();
    }

    /// Record the start of a tool call.
    pub fn on_pre_tool_use(&mut self, event: &HookEvent) {
        self.guarded("pre_tool_use", |this| this.start_tool(event));
    }

    fn start_tool(&mut self, event: &HookEvent) -> Result<(), HookError> {
        let create_tool_spans = self.options.create_tool_spans;
        let session = self.session.as_mut().ok_or(HookError::NoActiveSession)?;

        let tool_name = event.tool_name_or_default().to_string();
        let input = event.tool_input_or_null();
        let id = resolve_tool_use_id(event.tool_use_id(), &tool_name);
        let input_preview = preview(input, 500);

        let span = if create_tool_spans {
            let mut span = self.tracer.start_span(
                SpanRequest::new(format!("tool.{}", tool_name))
                    .with_attributes(vec![
                        Attribute::new("tool.name", tool_name.as_str()),
                        Attribute::new("gen_ai.operation.name", "execute_tool"),
                    ])
                    .with_parent(session.span.as_ref()),
            );
            if !input.is_null() {
                span.set_attribute(Attribute::new("tool.input", input_preview.as_str()));
            }
            span.add_event(
                "tool.started",
                vec![Attribute::new("input", input_preview.as_str())],
            );
            Some(span)
        } else {
            session.span.add_event(
                &format!("tool.started: {}", tool_name),
                vec![
                    Attribute::new("tool.name", tool_name.as_str()),
                    Attribute::new("tool.input", input_preview.as_str()),
                ],
            );
            None
        };

        debug!(tool = %tool_title(&tool_name, input), id = %id, "Tool started");

        let seq = session.next_seq;
        session.next_seq += 1;
        let replaced = session.pending.insert(
            id,
            PendingTool {
                span,
                tool_name: tool_name.clone(),
                started_at: Instant::now(),
                seq,
            },
        );
        if let Some(previous) = replaced {
            previous.close_unfinished("tool.replaced", "duplicate tool_use_id");
        }

        session.metrics.tools_used_count += 1;
        session.tools_used.push(tool_name);

        Ok(())
    }

    /// Record the completion of a tool call.
    pub fn on_post_tool_use(&mut self, event: &HookEvent) {
        self.guarded("post_tool_use", |this| this.finish_tool(event));
    }

    fn finish_tool(&mut self, event: &HookEvent) -> Result<(), HookError> {
        let create_tool_spans = self.options.create_tool_spans;
        let session = self.session.as_mut().ok_or(HookError::NoActiveSession)?;

        let tool_name = event.tool_name_or_default().to_string();
        let response = event.tool_response.clone().unwrap_or(Value::Null);

        let pending = session
            .resolve_pending(event.tool_use_id(), &tool_name)
            .and_then(|key| session.pending.remove(&key));

        let duration_ms = pending.as_ref().map(|p| elapsed_ms(p.started_at)).unwrap_or(0.0);
        let status = classify(&response);
        let error = error_message(&response);

        // The span is ended before the recorders run.
        let matched = match pending {
            Some(PendingTool {
                span: Some(mut span),
                ..
            }) => {
                if !response.is_null() {
                    span.set_attribute(Attribute::new("tool.response", preview(&response, 1000)));
                }
                span.set_attribute(Attribute::new("tool.status", status.as_str()));
                span.set_attribute(Attribute::new("tool.duration_ms", duration_ms));
                span.set_attribute(Attribute::new("duration_ms", duration_ms));
                match &error {
                    Some(message) => {
                        span.set_attribute(Attribute::new("tool.error", message.as_str()));
                        span.set_status(SpanStatus::Error(
                            truncate_chars(message, 100).to_string(),
                        ));
                    }
                    None => span.set_status(SpanStatus::Ok),
                }
                span.add_event(
                    "tool.completed",
                    vec![Attribute::new("response", preview(&response, 500))],
                );
                span.end();
                true
            }
            Some(PendingTool {
                span: None,
                tool_name: pending_name,
                ..
            }) => {
                Self::tool_completed_event(
                    session,
                    &pending_name,
                    &response,
                    status.as_str(),
                    duration_ms,
                );
                true
            }
            None => {
                if !create_tool_spans {
                    Self::tool_completed_event(session, &tool_name, &response, status.as_str(), 0.0);
                }
                false
            }
        };

        self.metrics
            .record_tool_call(&tool_name, duration_ms, status.is_error());
        self.tool_log.emit(&ToolCallRecord::new(
            tool_name.as_str(),
            duration_ms,
            status.as_str(),
            error,
        ));

        if !matched {
            return Err(HookError::NoPendingTool {
                tool_name,
                tool_use_id: event.tool_use_id().map(str::to_string),
            });
        }

        debug!(
            tool = %tool_name,
            status = status.as_str(),
            duration_ms,
            "Tool completed"
        );

        Ok(())
    }

    fn tool_completed_event(
        session: &mut ActiveSession,
        tool_name: &str,
        response: &Value,
        status: &str,
        duration_ms: f64,
    ) {
        session.span.add_event(
            &format!("tool.completed: {}", tool_name),
            vec![
                Attribute::new("tool.name", tool_name),
                Attribute::new("tool.response", preview(response, 500)),
                Attribute::new("tool.status", status),
                Attribute::new("duration_ms", duration_ms),
            ],
        );
    }

    /// Count one turn from a completed assistant message.
    ///
    /// Messages without usage are logged but do not count as a turn.
    pub fn on_message_complete(&mut self, message: &AssistantMessage) {
        self.guarded("message_complete", |this| this.complete_message(message));
    }

    fn complete_message(&mut self, message: &AssistantMessage) -> Result<(), HookError> {
        let session = self.session.as_mut().ok_or(HookError::NoActiveSession)?;

        if let Some(content) = &message.content {
            session.messages.push(Message {
                role: Role::Assistant,
                content: content.clone(),
            });
        }

        if let Some(usage) = &message.usage {
            Self::accumulate_turns(session, self.metrics.as_ref(), usage, 1);
        }

        Ok(())
    }

    /// Count the turns the stop event's transcript gained since the last stop.
    pub fn on_stop(&mut self, event: &HookEvent) {
        self.guarded("stop", |this| this.stop(event));
    }

    fn stop(&mut self, event: &HookEvent) -> Result<(), HookError> {
        let session = self.session.as_mut().ok_or(HookError::NoActiveSession)?;
        let path = event.transcript_path.as_deref().unwrap_or("");

        let Some(scan) = scan_turns_since(path, session.transcript_cursor) else {
            debug!(path, "Transcript not readable");
            return Ok(());
        };
        session.transcript_cursor = scan.entries;

        if scan.turns > 0 {
            Self::accumulate_turns(session, self.metrics.as_ref(), &scan.usage, scan.turns);
        } else {
            debug!(path, "No new turns in transcript");
        }

        Ok(())
    }

    /// Add `turns` turns worth of `usage` to the session totals.
    fn accumulate_turns(
        session: &mut ActiveSession,
        recorder: &dyn MetricsRecorder,
        usage: &TokenUsage,
        turns: u64,
    ) {
        let totals = &mut session.metrics;
        totals.input_tokens = totals.input_tokens.saturating_add(usage.input_tokens);
        totals.output_tokens = totals.output_tokens.saturating_add(usage.output_tokens);
        totals.cache_read_tokens = totals
            .cache_read_tokens
            .saturating_add(usage.cache_read_input_tokens);
        totals.cache_creation_tokens = totals
            .cache_creation_tokens
            .saturating_add(usage.cache_creation_input_tokens);
        totals.turns = totals.turns.saturating_add(turns);

        recorder.record_turn(&totals.model, turns);
        recorder.record_cache_usage(
            usage.cache_read_input_tokens,
            usage.cache_creation_input_tokens,
            &totals.model,
        );

        let span = &mut session.span;
        span.set_attribute(Attribute::new("gen_ai.usage.input_tokens", totals.input_tokens));
        span.set_attribute(Attribute::new("gen_ai.usage.output_tokens", totals.output_tokens));
        span.set_attribute(Attribute::new("tokens.cache_read", totals.cache_read_tokens));
        span.set_attribute(Attribute::new("tokens.cache_creation", totals.cache_creation_tokens));
        span.set_attribute(Attribute::new("turns", totals.turns));
        span.add_event(
            "turn.completed",
            vec![
                Attribute::new("turn", totals.turns),
                Attribute::new("input_tokens", usage.input_tokens),
                Attribute::new("output_tokens", usage.output_tokens),
                Attribute::new("cache_read_tokens", usage.cache_read_input_tokens),
                Attribute::new("cache_creation_tokens", usage.cache_creation_input_tokens),
            ],
        );
    }

    /// Note a context compaction.
    ///
    /// The metric is recorded even without an open session.
    pub fn on_pre_compact(&mut self, event: &HookEvent) {
        self.guarded("pre_compact", |this| this.compact(event));
    }

    fn compact(&mut self, event: &HookEvent) -> Result<(), HookError> {
        let trigger = event.trigger_or_default();
        let has_custom_instructions = event.custom_instructions.is_some();

        let model = self
            .session
            .as_ref()
            .map(|s| s.metrics.model.as_str())
            .unwrap_or(UNKNOWN_MODEL);
        self.metrics.record_compaction(trigger, model);

        let session = self.session.as_mut().ok_or(HookError::NoActiveSession)?;
        session.span.add_event(
            "context.compaction",
            vec![
                Attribute::new("trigger", trigger),
                Attribute::new("has_custom_instructions", has_custom_instructions),
            ],
        );

        Ok(())
    }

    /// Finalize and flush the open session.
    ///
    /// The controller is `Idle` afterwards no matter what happens while
    /// finalizing. Returns `None` when no session was open or finalizing
    /// failed.
    pub fn complete_session(&mut self) -> Option<SessionSummary> {
        let session = self.session.take();
        if session.is_some() {
            self.last_completed_at = Some(Instant::now());
        }

        self.guarded("complete_session", move |this| {
            let session = session.ok_or(HookError::NoActiveSession)?;
            Ok(this.finalize(session))
        })
    }

    fn finalize(&self, mut session: ActiveSession) -> SessionSummary {
        let duration_ms = elapsed_ms(session.started_at);

        let mut tool_names = session.tools_used.clone();
        tool_names.sort();
        tool_names.dedup();

        let unfinished = session.drain_pending();
        let unfinished_tools = unfinished.len();
        for (id, pending) in unfinished {
            debug!(id = %id, tool = %pending.tool_name, "Closing unfinished tool");
            pending.close_unfinished("tool.unfinished", UNFINISHED_TOOL_MESSAGE);
        }

        let span = &mut session.span;
        span.set_attribute(Attribute::new("session.duration_ms", duration_ms));
        span.set_attribute(Attribute::new(
            "gen_ai.response.model",
            session.metrics.model.as_str(),
        ));
        span.set_attribute(Attribute::new("tools_used", session.metrics.tools_used_count));
        if !tool_names.is_empty() {
            span.set_attribute(Attribute::new("tool_names", tool_names.join(",")));
        }
        span.add_event(
            "session.completed",
            vec![
                Attribute::new("turns", session.metrics.turns),
                Attribute::new("tools_used", session.metrics.tools_used_count),
            ],
        );
        span.end();

        let timeout = self.options.flush_timeout;
        if let Err(e) = self.tracer.force_flush(timeout) {
            debug!(error = %e, "Span flush failed");
        }
        if let Err(e) = self.metrics.force_flush(timeout) {
            debug!(error = %e, "Metrics flush failed");
        }
        if let Err(e) = self.tool_log.force_flush(timeout) {
            debug!(error = %e, "Log flush failed");
        }

        debug!(
            session = session.session_id.short(),
            input_tokens = session.metrics.input_tokens,
            output_tokens = session.metrics.output_tokens,
            tools = session.metrics.tools_used_count,
            duration_ms,
            "Session completed"
        );

        SessionSummary {
            session_id: session.session_id.as_str().to_string(),
            metrics: session.metrics,
            duration_ms,
            tool_names,
            unfinished_tools,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{AttributeValue, HookMetrics, RecordingToolLog, RecordingTracer};
    use serde_json::json;

    fn controller(create_tool_spans: bool) -> (SessionController, RecordingTracer, Arc<HookMetrics>) {
        let tracer = RecordingTracer::new();
        let metrics = Arc::new(HookMetrics::new());
        let controller = SessionController::new(
            Arc::new(tracer.clone()),
            metrics.clone(),
            ControllerOptions {
                create_tool_spans,
                flush_timeout: Duration::from_millis(100),
            },
        );
        (controller, tracer, metrics)
    }

    #[test]
    fn test_prompt_opens_session_span() {
        let (mut c, tracer, metrics) = controller(true);
        c.on_prompt_submit(
            &HookEvent::prompt("Hello").with_session_id("s1"),
            &HookContext::with_model("sonnet"),
        );

        assert!(c.is_session_open());
        assert_eq!(c.session_id(), Some("s1"));
        let span = &tracer.spans()[0];
        assert_eq!(span.name, "claude.session: Hello");
        assert_eq!(span.attribute("gen_ai.system").and_then(|v| v.as_str()), Some("anthropic"));
        assert_eq!(span.attribute("gen_ai.request.model").and_then(|v| v.as_str()), Some("sonnet"));
        assert_eq!(span.events_named("user.prompt.submitted").len(), 1);
        assert_eq!(metrics.counter(crate::telemetry::metrics::names::MODEL_REQUESTS_TOTAL), 1);
        assert_eq!(c.messages().len(), 1);
    }

    #[test]
    fn test_long_prompt_truncated_on_span_only() {
        let (mut c, tracer, _) = controller(true);
        let prompt = "a".repeat(1500);
        c.on_prompt_submit(&HookEvent::prompt(prompt.clone()), &HookContext::default());

        let span = &tracer.spans()[0];
        assert_eq!(span.name, format!("claude.session: {}...", "a".repeat(60)));
        assert_eq!(span.attribute("prompt").and_then(|v| v.as_str()).map(str::len), Some(1000));
        assert_eq!(c.session_metrics().unwrap().prompt, prompt);
        assert_eq!(c.session_id().map(str::len), Some(32));
    }

    #[test]
    fn test_tool_without_session_is_noop() {
        let (mut c, tracer, metrics) = controller(true);
        c.on_pre_tool_use(&HookEvent::tool("Bash", json!({})).with_id("t1"));
        c.on_post_tool_use(&HookEvent::tool("Bash", json!({})).with_id("t1"));
        c.on_message_complete(&AssistantMessage::with_usage(TokenUsage::new(1, 1, 0, 0)));

        assert!(tracer.spans().is_empty());
        assert_eq!(metrics.counter(crate::telemetry::metrics::names::TOOL_CALLS_TOTAL), 0);
        assert!(c.complete_session().is_none());
    }

    #[test]
    fn test_tool_span_lifecycle() {
        let (mut c, tracer, _) = controller(true);
        c.on_prompt_submit(&HookEvent::prompt("go"), &HookContext::default());
        c.on_pre_tool_use(&HookEvent::tool("Bash", json!({"command": "false"})).with_id("t1"));
        assert_eq!(c.pending_tool_count(), 1);

        c.on_post_tool_use(
            &HookEvent::tool("Bash", json!({}))
                .with_id("t1")
                .with_response(json!({"stderr": "", "exit_code": 1})),
        );
        assert_eq!(c.pending_tool_count(), 0);

        let tool = &tracer.spans_named("tool.Bash")[0];
        assert!(tool.ended);
        assert_eq!(tool.parent_id, Some(tracer.spans()[0].id));
        assert_eq!(tool.attribute("tool.status").and_then(|v| v.as_str()), Some("error"));
        assert_eq!(
            tool.attribute("tool.error").and_then(|v| v.as_str()),
            Some("Tool exited with code 1")
        );
        assert!(matches!(tool.status, SpanStatus::Error(_)));
        assert!(tool.attribute("tool.duration_ms").is_some());
        assert_eq!(tool.events_named("tool.started").len(), 1);
        assert_eq!(tool.events_named("tool.completed").len(), 1);
    }

    #[test]
    fn test_fallback_id_matches_most_recent() {
        let (mut c, tracer, metrics) = controller(true);
        c.on_prompt_submit(&HookEvent::prompt("go"), &HookContext::default());
        c.on_pre_tool_use(&HookEvent::tool("Read", json!({"file_path": "a"})));
        std::thread::sleep(Duration::from_millis(1));
        c.on_pre_tool_use(&HookEvent::tool("Read", json!({"file_path": "b"})));
        assert_eq!(c.pending_tool_count(), 2);

        c.on_post_tool_use(&HookEvent::tool("Read", json!({})).with_response(json!("ok")));
        assert_eq!(c.pending_tool_count(), 1);

        let reads = tracer.spans_named("tool.Read");
        assert!(!reads[0].ended);
        assert!(reads[1].ended);
        assert_eq!(metrics.counter(crate::telemetry::metrics::names::TOOL_CALLS_TOTAL), 1);
    }

    #[test]
    fn test_unmatched_post_still_records_metric() {
        let (mut c, _, metrics) = controller(true);
        c.on_prompt_submit(&HookEvent::prompt("go"), &HookContext::default());
        c.on_post_tool_use(
            &HookEvent::tool("Grep", json!({}))
                .with_id("never-started")
                .with_response(json!({"error": "boom"})),
        );

        let grep = metrics.tool_metrics("Grep").unwrap();
        assert_eq!(grep.invocations, 1);
        assert_eq!(grep.failures, 1);
        assert_eq!(grep.total_ms, 0.0);
    }

    #[test]
    fn test_event_mode_uses_session_events() {
        let (mut c, tracer, metrics) = controller(false);
        c.on_prompt_submit(&HookEvent::prompt("go"), &HookContext::default());
        c.on_pre_tool_use(&HookEvent::tool("Bash", json!({"command": "ls"})).with_id("t1"));
        assert_eq!(c.pending_tool_count(), 1);
        c.on_post_tool_use(
            &HookEvent::tool("Bash", json!({}))
                .with_id("t1")
                .with_response(json!({"stdout": "ok"})),
        );

        assert_eq!(tracer.spans().len(), 1);
        let session = &tracer.spans()[0];
        assert_eq!(session.events_named("tool.started: Bash").len(), 1);
        let completed = session.events_named("tool.completed: Bash");
        assert_eq!(completed.len(), 1);
        assert_eq!(
            completed[0].attribute("tool.status"),
            Some(&AttributeValue::Str("success".to_string()))
        );
        assert_eq!(c.pending_tool_count(), 0);
        assert_eq!(metrics.counter(crate::telemetry::metrics::names::TOOL_CALLS_TOTAL), 1);
    }

    #[test]
    fn test_message_complete_accumulates() {
        let (mut c, tracer, metrics) = controller(true);
        c.on_prompt_submit(&HookEvent::prompt("go"), &HookContext::with_model("opus"));
        c.on_message_complete(&AssistantMessage {
            content: Some(json!("hi")),
            usage: Some(TokenUsage::new(10, 5, 3, 0)),
        });
        c.on_message_complete(&AssistantMessage::with_usage(TokenUsage::new(20, 10, 0, 7)));
        c.on_message_complete(&AssistantMessage {
            content: Some(json!("no usage")),
            usage: None,
        });

        let totals = c.session_metrics().unwrap();
        assert_eq!(totals.turns, 2);
        assert_eq!(totals.input_tokens, 30);
        assert_eq!(totals.output_tokens, 15);
        assert_eq!(totals.cache_read_tokens, 3);
        assert_eq!(totals.cache_creation_tokens, 7);
        assert_eq!(c.messages().len(), 3);

        let session = &tracer.spans()[0];
        assert_eq!(session.attribute("turns"), Some(&AttributeValue::Int(2)));
        let turns = session.events_named("turn.completed");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].attribute("input_tokens"), Some(&AttributeValue::Int(20)));
        assert_eq!(turns[1].attribute("turn"), Some(&AttributeValue::Int(2)));

        use crate::telemetry::metrics::names;
        assert_eq!(metrics.counter_with(names::TURNS_TOTAL, &[("model", "opus")]), 2);
        assert_eq!(metrics.counter(names::CACHE_HITS_TOTAL), 1);
        assert_eq!(metrics.counter(names::CACHE_MISSES_TOTAL), 1);
        assert_eq!(metrics.counter(names::CACHE_CREATIONS_TOTAL), 1);
    }

    #[test]
    fn test_pre_compact() {
        let (mut c, tracer, metrics) = controller(true);
        c.on_pre_compact(&HookEvent::compaction("auto"));
        use crate::telemetry::metrics::names;
        assert_eq!(
            metrics.counter_with(
                names::CONTEXT_COMPACTIONS_TOTAL,
                &[("trigger", "auto"), ("model", "unknown")]
            ),
            1
        );

        c.on_prompt_submit(&HookEvent::prompt("go"), &HookContext::with_model("opus"));
        c.on_pre_compact(&HookEvent::compaction("manual").with_custom_instructions("keep it"));

        let events = tracer.spans()[0].events_named("context.compaction").len();
        assert_eq!(events, 1);
        let event = tracer.spans()[0].events_named("context.compaction")[0].clone();
        assert_eq!(event.attribute("has_custom_instructions"), Some(&AttributeValue::Bool(true)));
        assert_eq!(
            metrics.counter_with(
                names::CONTEXT_COMPACTIONS_TOTAL,
                &[("trigger", "manual"), ("model", "opus")]
            ),
            1
        );
    }

    #[test]
    fn test_complete_session_closes_unfinished_tools() {
        let (mut c, tracer, _) = controller(true);
        c.on_prompt_submit(&HookEvent::prompt("go"), &HookContext::default());
        c.on_pre_tool_use(&HookEvent::tool("Bash", json!({})).with_id("t1"));
        c.on_pre_tool_use(&HookEvent::tool("Read", json!({})).with_id("t2"));
        c.on_pre_tool_use(&HookEvent::tool("Bash", json!({})).with_id("t3"));

        let summary = c.complete_session().unwrap();
        assert_eq!(summary.unfinished_tools, 3);
        assert_eq!(summary.tool_names, vec!["Bash".to_string(), "Read".to_string()]);
        assert_eq!(summary.metrics.tools_used_count, 3);
        assert!(!c.is_session_open());
        assert_eq!(tracer.open_span_count(), 0);
        assert_eq!(tracer.flush_count(), 1);

        let session = &tracer.spans()[0];
        assert_eq!(
            session.attribute("tool_names").and_then(|v| v.as_str()),
            Some("Bash,Read")
        );
        assert_eq!(session.events_named("session.completed").len(), 1);
        for tool in tracer.spans_named("tool.") {
            assert_eq!(tool.status, SpanStatus::Error(UNFINISHED_TOOL_MESSAGE.to_string()));
        }
    }

    #[test]
    fn test_reentrant_prompt_supersedes() {
        let (mut c, tracer, _) = controller(true);
        c.on_prompt_submit(&HookEvent::prompt("first"), &HookContext::default());
        c.on_pre_tool_use(&HookEvent::tool("Bash", json!({})).with_id("t1"));
        c.on_prompt_submit(&HookEvent::prompt("second"), &HookContext::default());

        let spans = tracer.spans();
        let first = &spans[0];
        assert!(first.ended);
        assert_eq!(
            first.attribute("session.status").and_then(|v| v.as_str()),
            Some("superseded")
        );
        assert_eq!(first.events_named("session.superseded").len(), 1);
        assert!(matches!(first.status, SpanStatus::Error(_)));
        assert!(spans[1].ended);
        assert_eq!(c.pending_tool_count(), 0);
        assert_eq!(c.session_metrics().unwrap().prompt, "second");
        assert_eq!(tracer.open_span_count(), 1);
    }

    #[test]
    fn test_prompt_latency_recorded_after_first_session() {
        let (mut c, _, metrics) = controller(true);
        use crate::telemetry::metrics::names;
        c.on_prompt_submit(&HookEvent::prompt("one"), &HookContext::default());
        c.complete_session();
        assert!(metrics.histogram(names::PROMPT_LATENCY_MS).is_none());

        c.on_prompt_submit(&HookEvent::prompt("two"), &HookContext::default());
        assert_eq!(metrics.histogram(names::PROMPT_LATENCY_MS).unwrap().count(), 1);
    }

    #[test]
    fn test_complete_without_session_keeps_latency_clock() {
        let (mut c, _, metrics) = controller(true);
        use crate::telemetry::metrics::names;
        assert!(c.complete_session().is_none());

        c.on_prompt_submit(&HookEvent::prompt("first"), &HookContext::default());
        assert!(metrics.histogram(names::PROMPT_LATENCY_MS).is_none());
    }

    #[test]
    fn test_tool_log_records_each_completion() {
        let (c, _, _) = controller(true);
        let log = RecordingToolLog::new();
        let mut c = c.with_tool_log(Arc::new(log.clone()));

        c.on_prompt_submit(&HookEvent::prompt("go"), &HookContext::default());
        c.on_pre_tool_use(&HookEvent::tool("Bash", json!({})).with_id("t1"));
        c.on_post_tool_use(
            &HookEvent::tool("Bash", json!({}))
                .with_id("t1")
                .with_response(json!({"exit_code": 2})),
        );
        c.on_post_tool_use(&HookEvent::tool("Read", json!({})).with_id("stray"));

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tool_name, "Bash");
        assert_eq!(records[0].status, "error");
        assert_eq!(records[0].error.as_deref(), Some("Tool exited with code 2"));
        assert_eq!(records[0].body(), "Tool call failed");
        assert_eq!(records[1].body(), "Tool call completed");
        assert_eq!(records[1].duration_ms, 0.0);
    }

    struct PanickingMetrics;

    impl MetricsRecorder for PanickingMetrics {
        fn record_tool_call(&self, _: &str, _: f64, _: bool) {
            panic!("metrics backend exploded");
        }
        fn record_turn(&self, _: &str, _: u64) {}
        fn record_cache_usage(&self, _: u64, _: u64, _: &str) {}
        fn record_model_request(&self, _: &str) {}
        fn record_compaction(&self, _: &str, _: &str) {}
        fn record_prompt_latency(&self, _: f64, _: &str) {}
        fn force_flush(&self, _: Duration) -> Result<(), crate::error::TelemetryError> {
            panic!("flush exploded");
        }
    }

    #[test]
    fn test_panics_do_not_escape_and_state_resets() {
        let tracer = RecordingTracer::new();
        let mut c = SessionController::new(
            Arc::new(tracer.clone()),
            Arc::new(PanickingMetrics),
            ControllerOptions::default(),
        );

        c.on_prompt_submit(&HookEvent::prompt("go"), &HookContext::default());
        c.on_pre_tool_use(&HookEvent::tool("Bash", json!({})).with_id("t1"));
        c.on_post_tool_use(&HookEvent::tool("Bash", json!({})).with_id("t1"));
        assert_eq!(c.pending_tool_count(), 0);
        assert!(tracer.spans_named("tool.Bash")[0].ended);

        assert!(c.complete_session().is_none());
        assert!(!c.is_session_open());
        assert_eq!(tracer.open_span_count(), 0);

        c.on_prompt_submit(&HookEvent::prompt("again"), &HookContext::default());
        assert!(c.is_session_open());
    }
}
