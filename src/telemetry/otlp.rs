// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OpenTelemetry OTLP backend.
//!
//! Compiled with the `otlp` feature. Providers are built from [`OtelConfig`]
//! and owned by the returned tracer/meter/logger; nothing is registered
//! globally.
//! Batch processors run on the Tokio runtime, so construction must happen
//! inside one.

use std::any::Any;
use std::time::{Duration, SystemTime};

use opentelemetry::logs::{AnyValue, LogRecord, Logger as _, LoggerProvider as _, Severity};
use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
use opentelemetry::trace::{
    Span as _, Status, TraceContextExt, Tracer as _, TracerProvider as _,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::logs::{Logger, LoggerProvider};
use opentelemetry_sdk::metrics::MeterProvider as SdkMeterProvider;
use opentelemetry_sdk::trace::{Sampler, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use tracing::{debug, info};

use crate::config::OtelConfig;
use crate::error::TelemetryError;

use super::backend::{
    flush_with_timeout, Attribute, AttributeValue, SpanRequest, SpanStatus, TelemetrySpan,
    TelemetryTracer,
};
use super::logs::{ToolCallLog, ToolCallRecord};
use super::metrics::{names, MetricsRecorder};

const INSTRUMENTATION_NAME: &str = "agent-otel";

fn to_key_value(attribute: Attribute) -> KeyValue {
    match attribute.value {
        AttributeValue::Str(s) => KeyValue::new(attribute.key, s),
        AttributeValue::Int(i) => KeyValue::new(attribute.key, i),
        AttributeValue::Float(f) => KeyValue::new(attribute.key, f),
        AttributeValue::Bool(b) => KeyValue::new(attribute.key, b),
    }
}

/// Resource describing this service.
pub fn build_resource(config: &OtelConfig) -> Resource {
    let mut attrs = vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.namespace", config.service_namespace.clone()),
    ];
    for (key, value) in &config.resource_attributes {
        attrs.push(KeyValue::new(key.clone(), value.clone()));
    }
    Resource::new(attrs)
}

/// Map `OTEL_TRACES_SAMPLER` / `OTEL_TRACES_SAMPLER_ARG` onto an SDK sampler.
///
/// Unknown names fall back to always-on.
pub fn build_sampler(name: &str, arg: Option<&str>) -> Sampler {
    let ratio = arg
        .and_then(|a| a.trim().parse::<f64>().ok())
        .unwrap_or(1.0)
        .clamp(0.0, 1.0);

    match name.to_lowercase().as_str() {
        "always_off" => Sampler::AlwaysOff,
        "traceidratio" => Sampler::TraceIdRatioBased(ratio),
        "parentbased_always_on" => Sampler::ParentBased(Box::new(Sampler::AlwaysOn)),
        "parentbased_always_off" => Sampler::ParentBased(Box::new(Sampler::AlwaysOff)),
        "parentbased_traceidratio" => {
            Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(ratio)))
        }
        _ => Sampler::AlwaysOn,
    }
}

fn signal_endpoint(config: &OtelConfig, signal: &str) -> String {
    if config.is_grpc() {
        return config.endpoint.clone();
    }
    let base = config.http_endpoint();
    let suffix = format!("/v1/{}", signal);
    if base.ends_with(&suffix) {
        base
    } else {
        format!("{}{}", base.trim_end_matches('/'), suffix)
    }
}

/// Tracer exporting over OTLP.
#[derive(Clone)]
pub struct OtelTracer {
    provider: TracerProvider,
    tracer: opentelemetry_sdk::trace::Tracer,
}

impl OtelTracer {
    /// Build a batch-exporting tracer from config.
    pub fn new(config: &OtelConfig) -> Result<Self, TelemetryError> {
        let endpoint = signal_endpoint(config, "traces");

        let exporter = if config.is_grpc() {
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint.clone())
                .build_span_exporter()
        } else {
            opentelemetry_otlp::new_exporter()
                .http()
                .with_endpoint(endpoint.clone())
                .build_span_exporter()
        }
        .map_err(|e| TelemetryError::Setup(e.to_string()))?;

        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(
                opentelemetry_sdk::trace::config()
                    .with_resource(build_resource(config))
                    .with_sampler(build_sampler(
                        &config.traces_sampler,
                        config.traces_sampler_arg.as_deref(),
                    )),
            )
            .build();

        let tracer = provider.tracer(INSTRUMENTATION_NAME);

        info!(endpoint = %endpoint, protocol = %config.protocol, "OTLP tracer configured");

        Ok(Self { provider, tracer })
    }
}

impl TelemetryTracer for OtelTracer {
    fn start_span(&self, request: SpanRequest<'_>) -> Box<dyn TelemetrySpan> {
        let parent_cx = match request
            .parent
            .and_then(|p| p.as_any().downcast_ref::<OtelSpan>())
        {
            Some(parent) => {
                Context::new().with_remote_span_context(parent.span.span_context().clone())
            }
            None => Context::new(),
        };

        let mut builder = self
            .tracer
            .span_builder(request.name)
            .with_attributes(request.attributes.into_iter().map(to_key_value).collect::<Vec<_>>());
        if let Some(start) = request.start_time {
            builder = builder.with_start_time(start);
        }

        Box::new(OtelSpan {
            span: builder.start_with_context(&self.tracer, &parent_cx),
            ended: false,
        })
    }

    fn force_flush(&self, timeout: Duration) -> Result<(), TelemetryError> {
        let provider = self.provider.clone();
        flush_with_timeout(timeout, move || {
            let errors: Vec<String> = provider
                .force_flush()
                .into_iter()
                .filter_map(|r| r.err().map(|e| e.to_string()))
                .collect();
            if errors.is_empty() {
                Ok(())
            } else {
                Err(TelemetryError::FlushFailed(errors.join("; ")))
            }
        })
    }
}

/// Span backed by the OpenTelemetry SDK.
pub struct OtelSpan {
    span: opentelemetry_sdk::trace::Span,
    ended: bool,
}

impl TelemetrySpan for OtelSpan {
    fn set_attribute(&mut self, attribute: Attribute) {
        self.span.set_attribute(to_key_value(attribute));
    }

    fn add_event(&mut self, name: &str, attributes: Vec<Attribute>) {
        self.span.add_event(
            name.to_string(),
            attributes.into_iter().map(to_key_value).collect(),
        );
    }

    fn set_status(&mut self, status: SpanStatus) {
        let status = match status {
            SpanStatus::Unset => Status::Unset,
            SpanStatus::Ok => Status::Ok,
            SpanStatus::Error(message) => Status::error(message),
        };
        self.span.set_status(status);
    }

    fn end(&mut self) {
        if !self.ended {
            self.ended = true;
            self.span.end();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Metrics exporting over OTLP.
pub struct OtelMetrics {
    provider: SdkMeterProvider,
    tool_calls: Counter<u64>,
    tool_errors: Counter<u64>,
    tool_duration: Histogram<f64>,
    turns: Counter<u64>,
    cache_hits: Counter<u64>,
    cache_misses: Counter<u64>,
    cache_creations: Counter<u64>,
    model_requests: Counter<u64>,
    compactions: Counter<u64>,
    prompt_latency: Histogram<f64>,
}

impl OtelMetrics {
    /// Build a periodic-exporting meter from config.
    pub fn new(config: &OtelConfig) -> Result<Self, TelemetryError> {
        let endpoint = signal_endpoint(config, "metrics");

        let pipeline = opentelemetry_otlp::new_pipeline()
            .metrics(runtime::Tokio)
            .with_resource(build_resource(config));

        let provider = if config.is_grpc() {
            pipeline
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint.clone()),
                )
                .build()
        } else {
            pipeline
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .http()
                        .with_endpoint(endpoint.clone()),
                )
                .build()
        }
        .map_err(|e| TelemetryError::Setup(e.to_string()))?;

        let meter = provider.meter(INSTRUMENTATION_NAME);

        let counter = |name: &'static str, description: &'static str| {
            meter.u64_counter(name).with_description(description).init()
        };
        let histogram = |name: &'static str, description: &'static str| {
            meter.f64_histogram(name).with_description(description).init()
        };

        let metrics = Self {
            tool_calls: counter(names::TOOL_CALLS_TOTAL, "Total number of tool calls"),
            tool_errors: counter(names::TOOL_CALLS_ERRORS_TOTAL, "Total number of tool call errors"),
            tool_duration: histogram(
                names::TOOL_CALL_DURATION_MS,
                "Duration of tool calls in milliseconds",
            ),
            turns: counter(names::TURNS_TOTAL, "Total number of conversation turns"),
            cache_hits: counter(names::CACHE_HITS_TOTAL, "Turns that read from the prompt cache"),
            cache_misses: counter(
                names::CACHE_MISSES_TOTAL,
                "Turns that did not read from the prompt cache",
            ),
            cache_creations: counter(
                names::CACHE_CREATIONS_TOTAL,
                "Turns that wrote to the prompt cache",
            ),
            model_requests: counter(names::MODEL_REQUESTS_TOTAL, "Total requests by model"),
            compactions: counter(
                names::CONTEXT_COMPACTIONS_TOTAL,
                "Total number of context compactions",
            ),
            prompt_latency: histogram(
                names::PROMPT_LATENCY_MS,
                "Time between a completed session and the next prompt",
            ),
            provider,
        };

        debug!(endpoint = %endpoint, "OTLP meter configured");
        Ok(metrics)
    }
}

impl MetricsRecorder for OtelMetrics {
    fn record_tool_call(&self, tool_name: &str, duration_ms: f64, error: bool) {
        let attrs = [KeyValue::new("tool.name", tool_name.to_string())];
        self.tool_calls.add(1, &attrs);
        self.tool_duration.record(duration_ms, &attrs);
        if error {
            self.tool_errors.add(1, &attrs);
        }
    }

    fn record_turn(&self, model: &str, count: u64) {
        self.turns.add(count, &[KeyValue::new("model", model.to_string())]);
    }

    fn record_cache_usage(&self, cache_read_tokens: u64, cache_creation_tokens: u64, model: &str) {
        let attrs = [KeyValue::new("model", model.to_string())];
        if cache_read_tokens > 0 {
            self.cache_hits.add(1, &attrs);
        } else {
            self.cache_misses.add(1, &attrs);
        }
        if cache_creation_tokens > 0 {
            self.cache_creations.add(1, &attrs);
        }
    }

    fn record_model_request(&self, model: &str) {
        self.model_requests
            .add(1, &[KeyValue::new("model", model.to_string())]);
    }

    fn record_compaction(&self, trigger: &str, model: &str) {
        self.compactions.add(
            1,
            &[
                KeyValue::new("trigger", trigger.to_string()),
                KeyValue::new("model", model.to_string()),
            ],
        );
    }

    fn record_prompt_latency(&self, latency_ms: f64, model: &str) {
        self.prompt_latency
            .record(latency_ms, &[KeyValue::new("model", model.to_string())]);
    }

    fn force_flush(&self, timeout: Duration) -> Result<(), TelemetryError> {
        let provider = self.provider.clone();
        flush_with_timeout(timeout, move || {
            provider
                .force_flush()
                .map_err(|e| TelemetryError::FlushFailed(e.to_string()))
        })
    }
}

/// Tool-call log records exporting over OTLP.
pub struct OtelToolLog {
    provider: LoggerProvider,
    logger: Logger,
}

impl OtelToolLog {
    /// Build a batch-exporting logger from config.
    pub fn new(config: &OtelConfig) -> Result<Self, TelemetryError> {
        let endpoint = signal_endpoint(config, "logs");

        let exporter = if config.is_grpc() {
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint.clone())
                .build_log_exporter()
        } else {
            opentelemetry_otlp::new_exporter()
                .http()
                .with_endpoint(endpoint.clone())
                .build_log_exporter()
        }
        .map_err(|e| TelemetryError::Setup(e.to_string()))?;

        let provider = LoggerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(opentelemetry_sdk::logs::config().with_resource(build_resource(config)))
            .build();
        let logger = provider.logger(INSTRUMENTATION_NAME);

        debug!(endpoint = %endpoint, "OTLP logger configured");
        Ok(Self { provider, logger })
    }
}

fn to_log_record(record: &ToolCallRecord) -> LogRecord {
    let severity = if record.is_error() {
        Severity::Error
    } else {
        Severity::Info
    };
    let now = SystemTime::now();

    let mut builder = LogRecord::builder()
        .with_timestamp(now)
        .with_observed_timestamp(now)
        .with_severity_number(severity)
        .with_severity_text(if record.is_error() { "ERROR" } else { "INFO" })
        .with_body(AnyValue::String(record.body().into()))
        .with_attribute("tool.name", AnyValue::String(record.tool_name.clone().into()))
        .with_attribute("tool.duration_ms", AnyValue::Double(record.duration_ms))
        .with_attribute("tool.status", AnyValue::String(record.status.clone().into()));
    if let Some(error) = &record.error {
        builder = builder.with_attribute("tool.error", AnyValue::String(error.clone().into()));
    }
    builder.build()
}

impl ToolCallLog for OtelToolLog {
    fn emit(&self, record: &ToolCallRecord) {
        self.logger.emit(to_log_record(record));
    }

    fn force_flush(&self, timeout: Duration) -> Result<(), TelemetryError> {
        let provider = self.provider.clone();
        flush_with_timeout(timeout, move || {
            let errors: Vec<String> = provider
                .force_flush()
                .into_iter()
                .filter_map(|r| r.err().map(|e| e.to_string()))
                .collect();
            if errors.is_empty() {
                Ok(())
            } else {
                Err(TelemetryError::FlushFailed(errors.join("; ")))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sampler() {
        assert!(matches!(build_sampler("always_off", None), Sampler::AlwaysOff));
        assert!(matches!(
            build_sampler("traceidratio", Some("0.25")),
            Sampler::TraceIdRatioBased(r) if (r - 0.25).abs() < f64::EPSILON
        ));
        assert!(matches!(
            build_sampler("traceidratio", Some("7")),
            Sampler::TraceIdRatioBased(r) if (r - 1.0).abs() < f64::EPSILON
        ));
        assert!(matches!(build_sampler("bogus", None), Sampler::AlwaysOn));
    }

    #[test]
    fn test_signal_endpoint() {
        let mut config = OtelConfig::default();
        assert_eq!(signal_endpoint(&config, "traces"), "http://localhost:4317");

        config.protocol = "http".to_string();
        config.endpoint = "localhost:4318/".to_string();
        assert_eq!(
            signal_endpoint(&config, "traces"),
            "http://localhost:4318/v1/traces"
        );

        config.endpoint = "http://c:4318/v1/metrics".to_string();
        assert_eq!(signal_endpoint(&config, "metrics"), "http://c:4318/v1/metrics");
    }

    #[test]
    fn test_to_key_value() {
        let kv = to_key_value(Attribute::new("turns", 3u64));
        assert_eq!(kv.key.as_str(), "turns");
        assert_eq!(kv.value, opentelemetry::Value::I64(3));
    }

    #[test]
    fn test_to_log_record() {
        let record = to_log_record(&ToolCallRecord::new(
            "Bash",
            12.5,
            "error",
            Some("Tool exited with code 1".to_string()),
        ));
        assert_eq!(record.severity_number, Some(Severity::Error));
        assert!(matches!(&record.body, Some(AnyValue::String(s)) if s.as_str() == "Tool call failed"));

        let attributes = record.attributes.unwrap_or_default();
        let keys: Vec<&str> = attributes.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["tool.name", "tool.duration_ms", "tool.status", "tool.error"]);
    }

    #[test]
    fn test_signal_endpoint_logs() {
        let mut config = OtelConfig::default();
        config.protocol = "http".to_string();
        config.endpoint = "http://collector:4318".to_string();
        assert_eq!(signal_endpoint(&config, "logs"), "http://collector:4318/v1/logs");
    }
}
