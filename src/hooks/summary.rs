// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Helpers for turning tool payloads into span attributes.
//!
//! All lengths are counted in characters, never bytes, so truncation never
//! splits a UTF-8 sequence.

use serde_json::Value;

/// Marker appended by [`truncate`].
pub const TRUNCATION_MARKER: &str = "...[TRUNC]";

/// Maximum length of an input summary.
pub const SUMMARY_MAX_CHARS: usize = 200;

/// Values at or above this many characters are cut by [`truncate_attribute`].
pub const LARGE_VALUE_CHARS: usize = 2000;

/// Length kept from a large value.
pub const LARGE_VALUE_KEEP_CHARS: usize = 1900;

/// Prefix of `text` holding at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Truncate to at most `max` characters, marking the cut.
///
/// Returns the (possibly) shortened text and whether it was cut. Text of
/// exactly `max` characters is left alone.
pub fn truncate(text: &str, max: usize) -> (String, bool) {
    if text.chars().count() <= max {
        return (text.to_string(), false);
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    if max < marker_len {
        return (truncate_chars(text, max).to_string(), true);
    }

    let keep = max.saturating_sub(marker_len + 2);
    (
        format!("{}{}", truncate_chars(text, keep), TRUNCATION_MARKER),
        true,
    )
}

/// Cut very large attribute values, noting the original size.
pub fn truncate_attribute(value: &str) -> String {
    let len = value.chars().count();
    if len < LARGE_VALUE_CHARS {
        return value.to_string();
    }
    format!(
        "{}... (truncated, full size: {} chars)",
        truncate_chars(value, LARGE_VALUE_KEEP_CHARS),
        len
    )
}

/// Render a JSON value for an attribute: strings as-is, everything else as
/// compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// First `max` characters of a value's rendering.
pub fn preview(value: &Value, max: usize) -> String {
    truncate_chars(&value_to_string(value), max).to_string()
}

/// Span-name preview of a prompt: 60 characters, then `...`.
pub fn prompt_preview(prompt: &str) -> String {
    if prompt.chars().count() > 60 {
        format!("{}...", truncate_chars(prompt, 60))
    } else {
        prompt.to_string()
    }
}

/// One-line description of what a tool was asked to do.
///
/// Uses the tool's key field where known, otherwise the compact JSON input.
pub fn input_summary(input: &Value, tool_name: &str) -> String {
    let key = match tool_name {
        "Bash" => Some("command"),
        "Read" | "Write" | "Edit" => Some("file_path"),
        "Glob" | "Grep" => Some("pattern"),
        "Task" => Some("description"),
        _ => None,
    };

    let summary = match key.and_then(|k| input.get(k)) {
        Some(value) => value_to_string(value),
        None if key.is_some() => String::new(),
        None => value_to_string(input),
    };

    truncate_chars(&summary, SUMMARY_MAX_CHARS).to_string()
}

/// Size of a payload in UTF-8 bytes. Strings count raw, `null` is zero,
/// anything else counts as compact JSON.
pub fn payload_size(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::String(s) => s.len(),
        other => other.to_string().len(),
    }
}

/// Short title such as `Bash - "ls -la"` or `Read - file_path=main.rs`.
pub fn tool_title(tool_name: &str, input: &Value) -> String {
    let Some(map) = input.as_object() else {
        return tool_name.to_string();
    };

    let parts: Vec<String> = map
        .iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) if s.chars().count() >= 30 => {
                Some(format!("{}=\"{}...\"", key, truncate_chars(s, 30)))
            }
            Value::String(s) if s.contains('/') || s.contains(' ') || s.starts_with('-') => {
                Some(format!("\"{}\"", s))
            }
            Value::String(s) => Some(format!("{}={}", key, s)),
            Value::Number(_) | Value::Bool(_) | Value::Null => Some(format!("{}={}", key, value)),
            Value::Object(o) => Some(format!("{}={{...{}}}", key, o.len())),
            Value::Array(a) => Some(format!("{}=[...{}]", key, a.len())),
        })
        .take(3)
        .collect();

    if parts.is_empty() {
        return tool_name.to_string();
    }

    let title = format!("{} - {}", tool_name, parts.join(", "));
    if title.chars().count() > 100 {
        format!("{}...", truncate_chars(&title, 97))
    } else {
        title
    }
}
