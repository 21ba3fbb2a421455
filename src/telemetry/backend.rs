// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracer abstraction the hooks emit spans through.
//!
//! The session controller never talks to an exporter directly. It is handed
//! an `Arc<dyn TelemetryTracer>` and works with boxed [`TelemetrySpan`]s, so
//! the same correlation logic drives the log backend, the in-memory
//! recorder and the OTLP exporter.

use std::any::Any;
use std::fmt;
use std::sync::mpsc;
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::TelemetryError;

/// A span attribute or event attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl AttributeValue {
    /// String content, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float content (integers widen).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Bool content, if this is a bool value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{}", s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for AttributeValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<usize> for AttributeValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A key/value pair attached to a span or event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub key: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Final status of a span.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error(String),
}

/// Parameters for starting a span.
pub struct SpanRequest<'a> {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub parent: Option<&'a dyn TelemetrySpan>,
    /// Explicit start time, used when the span began in another process.
    pub start_time: Option<SystemTime>,
}

impl<'a> SpanRequest<'a> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            parent: None,
            start_time: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<Attribute>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_parent(mut self, parent: &'a dyn TelemetrySpan) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }
}

/// A live span owned by the caller until [`TelemetrySpan::end`].
pub trait TelemetrySpan: Send {
    /// Set (or overwrite) an attribute.
    fn set_attribute(&mut self, attribute: Attribute);

    /// Append a timestamped event.
    fn add_event(&mut self, name: &str, attributes: Vec<Attribute>);

    /// Set the span status.
    fn set_status(&mut self, status: SpanStatus);

    /// End the span. Further calls are ignored.
    fn end(&mut self);

    /// Backend-specific access, used to resolve parents.
    fn as_any(&self) -> &dyn Any;
}

/// Creates spans and flushes them to wherever they go.
pub trait TelemetryTracer: Send + Sync {
    /// Start a span.
    fn start_span(&self, request: SpanRequest<'_>) -> Box<dyn TelemetrySpan>;

    /// Push buffered spans to the backend, blocking at most `timeout`.
    fn force_flush(&self, timeout: Duration) -> Result<(), TelemetryError>;
}

/// Run a blocking flush on a helper thread and wait at most `timeout`.
///
/// The helper thread is detached on timeout; a stuck exporter costs a thread,
/// never the host's latency.
pub fn flush_with_timeout<F>(timeout: Duration, flush: F) -> Result<(), TelemetryError>
where
    F: FnOnce() -> Result<(), TelemetryError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = std::thread::Builder::new()
        .name("agent-otel-flush".to_string())
        .spawn(move || {
            let _ = tx.send(flush());
        });

    if let Err(e) = spawned {
        return Err(TelemetryError::FlushFailed(e.to_string()));
    }

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            Err(TelemetryError::FlushTimeout(timeout.as_millis() as u64))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(TelemetryError::FlushFailed(
            "flush thread exited without reporting".to_string(),
        )),
    }
}

/// Tracer that writes each finished span as one structured log line.
///
/// This is the default backend when no exporter is compiled in or traces are
/// disabled: nothing leaves the process, but with `AGENT_OTEL_DEBUG` the
/// span tree is visible on stderr.
#[derive(Debug, Default, Clone)]
pub struct LogTracer;

impl LogTracer {
    pub fn new() -> Self {
        Self
    }
}

impl TelemetryTracer for LogTracer {
    fn start_span(&self, request: SpanRequest<'_>) -> Box<dyn TelemetrySpan> {
        let parent = request
            .parent
            .and_then(|p| p.as_any().downcast_ref::<LogSpan>())
            .map(|p| p.name.clone());

        debug!(span = %request.name, parent = ?parent, "Span started");

        Box::new(LogSpan {
            name: request.name,
            parent,
            attributes: request.attributes,
            events: Vec::new(),
            status: SpanStatus::Unset,
            started: Instant::now(),
            ended: false,
        })
    }

    fn force_flush(&self, _timeout: Duration) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Span produced by [`LogTracer`].
#[derive(Debug)]
pub struct LogSpan {
    name: String,
    parent: Option<String>,
    attributes: Vec<Attribute>,
    events: Vec<String>,
    status: SpanStatus,
    started: Instant,
    ended: bool,
}

impl TelemetrySpan for LogSpan {
    fn set_attribute(&mut self, attribute: Attribute) {
        match self.attributes.iter_mut().find(|a| a.key == attribute.key) {
            Some(existing) => existing.value = attribute.value,
            None => self.attributes.push(attribute),
        }
    }

    fn add_event(&mut self, name: &str, _attributes: Vec<Attribute>) {
        self.events.push(name.to_string());
    }

    fn set_status(&mut self, status: SpanStatus) {
        self.status = status;
    }

    fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;

        let attributes = self
            .attributes
            .iter()
            .map(|a| format!("{}={}", a.key, a.value))
            .collect::<Vec<_>>()
            .join(" ");

        info!(
            span = %self.name,
            parent = ?self.parent,
            duration_ms = self.started.elapsed().as_secs_f64() * 1000.0,
            status = ?self.status,
            events = ?self.events,
            %attributes,
            "Span ended"
        );
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_conversions() {
        assert_eq!(Attribute::new("a", "x").value, AttributeValue::Str("x".to_string()));
        assert_eq!(Attribute::new("a", 5u64).value, AttributeValue::Int(5));
        assert_eq!(Attribute::new("a", u64::MAX).value, AttributeValue::Int(i64::MAX));
        assert_eq!(Attribute::new("a", 1.5).value, AttributeValue::Float(1.5));
        assert_eq!(Attribute::new("a", true).value, AttributeValue::Bool(true));
    }

    #[test]
    fn test_attribute_value_accessors() {
        assert_eq!(AttributeValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(AttributeValue::Str("x".into()).as_i64(), None);
        assert_eq!(AttributeValue::Bool(false).as_bool(), Some(false));
        assert_eq!(AttributeValue::Float(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_flush_with_timeout_ok() {
        let result = flush_with_timeout(Duration::from_secs(1), || Ok(()));
        assert!(result.is_ok());
    }

    #[test]
    fn test_flush_with_timeout_expires() {
        let result = flush_with_timeout(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        assert!(matches!(result, Err(TelemetryError::FlushTimeout(20))));
    }

    #[test]
    fn test_flush_with_timeout_propagates_error() {
        let result = flush_with_timeout(Duration::from_secs(1), || {
            Err(TelemetryError::FlushFailed("collector down".to_string()))
        });
        assert!(matches!(result, Err(TelemetryError::FlushFailed(_))));
    }

    #[test]
    fn test_log_span_overwrites_attributes_and_ends_once() {
        let tracer = LogTracer::new();
        let mut span = tracer.start_span(
            SpanRequest::new("session").with_attributes(vec![Attribute::new("turns", 0u64)]),
        );
        span.set_attribute(Attribute::new("turns", 2u64));
        span.end();
        span.end();

        let log_span = span.as_any().downcast_ref::<LogSpan>().unwrap();
        assert_eq!(log_span.attributes.len(), 1);
        assert_eq!(log_span.attributes[0].value, AttributeValue::Int(2));
        assert!(log_span.ended);
    }
}
