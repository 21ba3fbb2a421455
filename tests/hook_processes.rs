// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tests for the per-process hooks with a file-backed context store.

use std::io::Write;
use std::time::Duration;

use serde_json::json;
use tempfile::{NamedTempFile, TempDir};

use agent_otel::hooks::{
    run_post_tool, run_pre_compact, run_pre_tool, ContextStore, FileContextStore, HookEvent,
    ToolStatus,
};
use agent_otel::telemetry::metrics::names;
use agent_otel::telemetry::{
    AttributeValue, HookMetrics, NoopToolLog, RecordingToolLog, RecordingTracer, SpanStatus,
};

const TIMEOUT: Duration = Duration::from_millis(200);

fn store_in(temp: &TempDir) -> FileContextStore {
    FileContextStore::new(temp.path().join("claude-otel-spans"))
}

// ============================================================================
// Pre/Post Tool Correlation
// ============================================================================

#[test]
fn test_pre_then_post_across_store_instances() {
    let temp = TempDir::new().unwrap();
    let tracer = RecordingTracer::new();
    let metrics = HookMetrics::new();

    let pre = HookEvent::tool("Bash", json!({"command": "sleep 0.01"}))
        .with_id("toolu_01")
        .with_session_id("sess-9");
    assert!(run_pre_tool(&pre, &store_in(&temp)));
    assert!(store_in(&temp).path_for("toolu_01").exists());

    std::thread::sleep(Duration::from_millis(5));

    let post = HookEvent::tool("Bash", json!({"command": "sleep 0.01"}))
        .with_id("toolu_01")
        .with_response(json!({"stdout": "", "exit_code": 0}));
    let report = run_post_tool(&post, &store_in(&temp), &tracer, &metrics, &NoopToolLog, TIMEOUT);

    assert!(report.correlated);
    assert_eq!(report.status, ToolStatus::Success);
    assert!(report.duration_ms >= 5.0);
    assert!(!store_in(&temp).path_for("toolu_01").exists());

    let span = &tracer.spans()[0];
    assert_eq!(span.name, "tool.Bash");
    assert_eq!(span.attribute("tool.use_id").and_then(|v| v.as_str()), Some("toolu_01"));
    assert_eq!(span.attribute("session.id").and_then(|v| v.as_str()), Some("sess-9"));
    assert!(span.start_time < std::time::SystemTime::now());
    assert_eq!(metrics.tool_metrics("Bash").unwrap().successes, 1);
}

#[test]
fn test_post_uses_stored_input_when_payload_lacks_it() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let tracer = RecordingTracer::new();
    let metrics = HookMetrics::new();

    run_pre_tool(
        &HookEvent::tool("Grep", json!({"pattern": "fn main"})).with_id("g1"),
        &store,
    );

    let post = HookEvent {
        tool_use_id: Some("g1".to_string()),
        tool_response: Some(json!("src/main.rs:1:fn main()")),
        ..HookEvent::default()
    };
    let report = run_post_tool(&post, &store, &tracer, &metrics, &NoopToolLog, TIMEOUT);

    assert_eq!(report.tool_name, "Grep");
    let span = &tracer.spans()[0];
    assert_eq!(span.name, "tool.Grep");
    assert_eq!(span.attribute("tool.input.summary").and_then(|v| v.as_str()), Some("fn main"));
    assert_eq!(span.attribute("tool.input.pattern").and_then(|v| v.as_str()), Some("fn main"));
}

#[test]
fn test_pre_without_id_stores_nothing() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);

    assert!(!run_pre_tool(&HookEvent::tool("Read", json!({"file_path": "x"})), &store));
    assert!(!store.dir().exists());
}

#[test]
fn test_post_error_response() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let tracer = RecordingTracer::new();
    let metrics = HookMetrics::new();

    let post = HookEvent::tool("Write", json!({"file_path": "/ro/file"}))
        .with_id("w1")
        .with_response(json!({"error": "Permission denied"}));
    let log = RecordingToolLog::new();
    let report = run_post_tool(&post, &store, &tracer, &metrics, &log, TIMEOUT);

    assert_eq!(report.status, ToolStatus::Error);
    let records = log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].body(), "Tool call failed");
    assert_eq!(records[0].error.as_deref(), Some("Permission denied"));
    let span = &tracer.spans()[0];
    assert_eq!(span.attribute("tool.error").and_then(|v| v.as_str()), Some("Permission denied"));
    assert_eq!(span.status, SpanStatus::Error("Permission denied".to_string()));
    assert_eq!(metrics.counter_with(names::TOOL_CALLS_ERRORS_TOTAL, &[("tool.name", "Write")]), 1);
}

#[test]
fn test_corrupt_context_file_is_ignored() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    std::fs::create_dir_all(store.dir()).unwrap();
    std::fs::write(store.path_for("c1"), "not json at all").unwrap();

    let tracer = RecordingTracer::new();
    let metrics = HookMetrics::new();
    let report = run_post_tool(
        &HookEvent::tool("Bash", json!({})).with_id("c1"),
        &store,
        &tracer,
        &metrics,
        &NoopToolLog,
        TIMEOUT,
    );

    assert!(!report.correlated);
    assert_eq!(report.duration_ms, 0.0);
    assert!(!store.path_for("c1").exists());
    assert!(store.take("c1").is_none());
}

// ============================================================================
// Transcript Token Attributes
// ============================================================================

#[test]
fn test_post_tool_reads_tokens_from_transcript() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let tracer = RecordingTracer::new();
    let metrics = HookMetrics::new();

    let mut transcript = NamedTempFile::new().unwrap();
    let entry = json!({
        "type": "assistant",
        "message": {
            "role": "assistant",
            "content": [{"type": "tool_use", "id": "toolu_T", "name": "Read", "input": {}}],
            "usage": {
                "input_tokens": 1200,
                "output_tokens": 80,
                "cache_read_input_tokens": 900,
                "cache_creation_input_tokens": 40
            }
        }
    });
    writeln!(transcript, "{}", json!({"type": "user", "message": {"role": "user", "content": "go"}})).unwrap();
    writeln!(transcript, "{}", entry).unwrap();
    transcript.flush().unwrap();

    let post = HookEvent::tool("Read", json!({"file_path": "a.rs"}))
        .with_id("toolu_T")
        .with_transcript(transcript.path().to_string_lossy())
        .with_response(json!("contents"));
    run_post_tool(&post, &store, &tracer, &metrics, &NoopToolLog, TIMEOUT);

    let span = &tracer.spans()[0];
    assert_eq!(span.attribute("gen_ai.usage.input_tokens"), Some(&AttributeValue::Int(1200)));
    assert_eq!(span.attribute("gen_ai.usage.output_tokens"), Some(&AttributeValue::Int(80)));
    assert_eq!(span.attribute("tokens.cache_read"), Some(&AttributeValue::Int(900)));
    assert_eq!(span.attribute("tokens.cache_creation"), Some(&AttributeValue::Int(40)));
}

#[test]
fn test_post_tool_without_transcript_match() {
    let temp = TempDir::new().unwrap();
    let tracer = RecordingTracer::new();
    let metrics = HookMetrics::new();

    let post = HookEvent::tool("Read", json!({}))
        .with_id("toolu_missing")
        .with_transcript("/nonexistent/transcript.jsonl");
    run_post_tool(&post, &store_in(&temp), &tracer, &metrics, &NoopToolLog, TIMEOUT);

    assert!(tracer.spans()[0].attribute("gen_ai.usage.input_tokens").is_none());
}

// ============================================================================
// Compaction
// ============================================================================

#[test]
fn test_pre_compact_emits_span_and_metric() {
    let tracer = RecordingTracer::new();
    let metrics = HookMetrics::new();

    run_pre_compact(&HookEvent::compaction("auto"), &tracer, &metrics, TIMEOUT);

    let span = &tracer.spans()[0];
    assert_eq!(span.name, "context.compaction");
    assert!(span.ended);
    assert_eq!(
        span.attribute("compaction.has_custom_instructions"),
        Some(&AttributeValue::Bool(false))
    );
    assert_eq!(metrics.counter(names::CONTEXT_COMPACTIONS_TOTAL), 1);
    assert_eq!(tracer.flush_count(), 1);
}
