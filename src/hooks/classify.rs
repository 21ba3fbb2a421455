// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Success/error classification of tool responses.

use serde_json::Value;

use super::summary::truncate_chars;

/// Outcome of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Success,
    Error,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

const ERROR_MARKERS: &[&str] = &["error:", "exception:", "failed:", "fatal:"];

/// JSON truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Numeric `exit_code`/`exitCode`; strings and other shapes are ignored.
fn exit_code(response: &Value) -> Option<&serde_json::Number> {
    ["exit_code", "exitCode"]
        .iter()
        .find_map(|key| response.get(*key)?.as_number())
}

fn is_nonzero(code: &serde_json::Number) -> bool {
    code.as_f64().map(|f| f != 0.0).unwrap_or(true)
}

fn text_looks_like_error(text: &str) -> bool {
    let head = text.get(..6).unwrap_or("");
    if head.eq_ignore_ascii_case("error:") {
        return true;
    }
    let lower = truncate_chars(text, 200).to_lowercase();
    ERROR_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Classify a tool response.
///
/// Checked in order: a truthy `error` field, a truthy `isError` field, a
/// non-zero `exit_code`/`exitCode`, then error markers at the start of a
/// plain-string response. Anything else is a success.
pub fn classify(response: &Value) -> ToolStatus {
    match response {
        Value::Object(map) => {
            if map.get("error").map(is_truthy).unwrap_or(false) {
                return ToolStatus::Error;
            }
            if map.get("isError").map(is_truthy).unwrap_or(false) {
                return ToolStatus::Error;
            }
            match exit_code(response) {
                Some(code) if is_nonzero(code) => ToolStatus::Error,
                _ => ToolStatus::Success,
            }
        }
        Value::String(text) if text_looks_like_error(text) => ToolStatus::Error,
        _ => ToolStatus::Success,
    }
}

/// Human-readable error description for the `tool.error` attribute.
///
/// `None` when the response classifies as a success.
pub fn error_message(response: &Value) -> Option<String> {
    if !classify(response).is_error() {
        return None;
    }

    if let Some(error) = response.get("error").filter(|e| is_truthy(e)) {
        let text = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Some(truncate_chars(&text, 500).to_string());
    }

    if response.get("isError").map(is_truthy).unwrap_or(false) {
        return Some("Tool execution failed (isError=true)".to_string());
    }

    if let Some(code) = exit_code(response).filter(|code| is_nonzero(code)) {
        return Some(format!("Tool exited with code {}", code));
    }

    response
        .as_str()
        .map(|text| truncate_chars(text, 500).to_string())
}
