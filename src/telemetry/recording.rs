// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory tracer that keeps every span it creates.
//!
//! Used to inspect what the hooks emit (tests, `--dry-run` style tooling)
//! without a collector. Cloning a [`RecordingTracer`] shares the same store.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use crate::error::TelemetryError;

use super::backend::{
    Attribute, AttributeValue, SpanRequest, SpanStatus, TelemetrySpan, TelemetryTracer,
};

/// A recorded span event.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

impl RecordedEvent {
    /// Look up an event attribute.
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.iter().find(|a| a.key == key).map(|a| &a.value)
    }
}

/// Snapshot of a span as the recorder saw it.
#[derive(Debug, Clone)]
pub struct RecordedSpan {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub events: Vec<RecordedEvent>,
    pub status: SpanStatus,
    pub start_time: SystemTime,
    pub ended: bool,
}

impl RecordedSpan {
    /// Latest value of an attribute.
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.iter().find(|a| a.key == key).map(|a| &a.value)
    }

    /// Events with the given name, in emission order.
    pub fn events_named(&self, name: &str) -> Vec<&RecordedEvent> {
        self.events.iter().filter(|e| e.name == name).collect()
    }
}

#[derive(Debug, Default)]
struct RecorderState {
    spans: Vec<RecordedSpan>,
    flushes: usize,
}

/// Tracer that records spans in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    state: Arc<Mutex<RecorderState>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        // A panicking test thread must not hide what was recorded.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All spans, in creation order.
    pub fn spans(&self) -> Vec<RecordedSpan> {
        self.lock().spans.clone()
    }

    /// Spans whose name equals `name` or starts with `name`.
    pub fn spans_named(&self, name: &str) -> Vec<RecordedSpan> {
        self.lock()
            .spans
            .iter()
            .filter(|s| s.name.starts_with(name))
            .cloned()
            .collect()
    }

    /// Number of spans not yet ended.
    pub fn open_span_count(&self) -> usize {
        self.lock().spans.iter().filter(|s| !s.ended).count()
    }

    /// Number of `force_flush` calls.
    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    fn update<F: FnOnce(&mut RecordedSpan)>(&self, id: u64, f: F) {
        let mut state = self.lock();
        if let Some(span) = state.spans.iter_mut().find(|s| s.id == id) {
            f(span);
        }
    }
}

impl TelemetryTracer for RecordingTracer {
    fn start_span(&self, request: SpanRequest<'_>) -> Box<dyn TelemetrySpan> {
        let parent_id = request
            .parent
            .and_then(|p| p.as_any().downcast_ref::<RecordingSpan>())
            .map(|p| p.id);

        let mut state = self.lock();
        let id = state.spans.len() as u64 + 1;
        state.spans.push(RecordedSpan {
            id,
            parent_id,
            name: request.name,
            attributes: request.attributes,
            events: Vec::new(),
            status: SpanStatus::Unset,
            start_time: request.start_time.unwrap_or_else(SystemTime::now),
            ended: false,
        });

        Box::new(RecordingSpan {
            id,
            tracer: self.clone(),
        })
    }

    fn force_flush(&self, _timeout: Duration) -> Result<(), TelemetryError> {
        self.lock().flushes += 1;
        Ok(())
    }
}

/// Handle to a span held by a [`RecordingTracer`].
#[derive(Debug)]
pub struct RecordingSpan {
    id: u64,
    tracer: RecordingTracer,
}

impl TelemetrySpan for RecordingSpan {
    fn set_attribute(&mut self, attribute: Attribute) {
        self.tracer.update(self.id, |span| {
            if span.ended {
                return;
            }
            match span.attributes.iter_mut().find(|a| a.key == attribute.key) {
                Some(existing) => existing.value = attribute.value,
                None => span.attributes.push(attribute),
            }
        });
    }

    fn add_event(&mut self, name: &str, attributes: Vec<Attribute>) {
        self.tracer.update(self.id, |span| {
            if !span.ended {
                span.events.push(RecordedEvent {
                    name: name.to_string(),
                    attributes,
                });
            }
        });
    }

    fn set_status(&mut self, status: SpanStatus) {
        self.tracer.update(self.id, |span| {
            if !span.ended {
                span.status = status;
            }
        });
    }

    fn end(&mut self) {
        self.tracer.update(self.id, |span| span.ended = true);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
