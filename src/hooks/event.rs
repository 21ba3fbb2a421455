// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Payload types delivered by the host runtime.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model name used when the host does not report one.
pub const UNKNOWN_MODEL: &str = "unknown";

/// A lifecycle event from the host runtime.
///
/// Every field is optional; the same shape serves prompt, tool, stop and
/// compaction events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_response: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl HookEvent {
    /// A prompt submission.
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    /// A tool event for `tool_name` with the given input.
    pub fn tool(tool_name: impl Into<String>, tool_input: Value) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            tool_input: Some(tool_input),
            ..Default::default()
        }
    }

    /// A compaction event.
    pub fn compaction(trigger: impl Into<String>) -> Self {
        Self {
            trigger: Some(trigger.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, tool_use_id: impl Into<String>) -> Self {
        self.tool_use_id = Some(tool_use_id.into());
        self
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.tool_response = Some(response);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_transcript(mut self, path: impl Into<String>) -> Self {
        self.transcript_path = Some(path.into());
        self
    }

    pub fn with_custom_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.custom_instructions = Some(instructions.into());
        self
    }

    /// Tool name, defaulting to `"unknown"`.
    pub fn tool_name_or_default(&self) -> &str {
        self.tool_name.as_deref().unwrap_or("unknown")
    }

    /// Compaction trigger, defaulting to `"unknown"`.
    pub fn trigger_or_default(&self) -> &str {
        self.trigger.as_deref().unwrap_or("unknown")
    }

    /// Tool input, `null` when absent.
    pub fn tool_input_or_null(&self) -> &Value {
        self.tool_input.as_ref().unwrap_or(&Value::Null)
    }

    /// `tool_use_id` if present and non-empty.
    pub fn tool_use_id(&self) -> Option<&str> {
        self.tool_use_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Caller-supplied context, resolved to plain values once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookContext {
    pub model: String,
}

impl HookContext {
    /// Resolve from either `{"options": {"model": ..}}` or `{"model": ..}`.
    pub fn from_value(value: &Value) -> Self {
        let model = value
            .pointer("/options/model")
            .and_then(Value::as_str)
            .or_else(|| value.get("model").and_then(Value::as_str))
            .filter(|m| !m.is_empty())
            .unwrap_or(UNKNOWN_MODEL);

        Self::with_model(model)
    }

    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl Default for HookContext {
    fn default() -> Self {
        Self::with_model(UNKNOWN_MODEL)
    }
}

/// Token counts reported for one model call. Missing fields are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64, cache_read: u64, cache_creation: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            cache_read_input_tokens: cache_read,
            cache_creation_input_tokens: cache_creation,
        }
    }

    /// Read a `usage` object leniently: non-numeric or negative fields count as zero.
    pub fn from_value(value: &Value) -> Self {
        let field = |name: &str| value.get(name).and_then(Value::as_u64).unwrap_or(0);
        Self {
            input_tokens: field("input_tokens"),
            output_tokens: field("output_tokens"),
            cache_read_input_tokens: field("cache_read_input_tokens"),
            cache_creation_input_tokens: field("cache_creation_input_tokens"),
        }
    }

    /// Component-wise saturating sum.
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_read_input_tokens = self
            .cache_read_input_tokens
            .saturating_add(other.cache_read_input_tokens);
        self.cache_creation_input_tokens = self
            .cache_creation_input_tokens
            .saturating_add(other.cache_creation_input_tokens);
    }
}

/// A completed assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantMessage {
    pub content: Option<Value>,
    pub usage: Option<TokenUsage>,
}

impl AssistantMessage {
    pub fn with_usage(usage: TokenUsage) -> Self {
        Self {
            content: None,
            usage: Some(usage),
        }
    }
}
