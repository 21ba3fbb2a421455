// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Token usage lookups in the host's conversation transcript.
//!
//! Transcripts are JSON-lines, one entry per message:
//!
//! ```json
//! {"type": "assistant", "message": {"role": "assistant", "content": [{"type": "tool_use", "id": "toolu_1"}], "usage": {...}}}
//! ```
//!
//! Both lookups are read-only and never fail: anything unreadable simply
//! yields `None`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::event::TokenUsage;

/// How much of the end of a transcript [`extract_usage`] reads.
pub const TAIL_WINDOW_BYTES: u64 = 50 * 1024;

/// Result of [`scan_turns`] and [`scan_turns_since`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnScan {
    /// Sum over all qualifying assistant messages.
    pub usage: TokenUsage,
    /// Number of qualifying assistant messages.
    pub turns: u64,
    /// Number of entries in the whole transcript.
    pub entries: usize,
}

/// The API message inside a transcript entry (`entry.message`, or the entry
/// itself for flat transcripts).
fn message_of(entry: &Value) -> &Value {
    match entry.get("message") {
        Some(message) if message.is_object() => message,
        _ => entry,
    }
}

fn is_assistant(entry: &Value) -> bool {
    let message = message_of(entry);
    message.get("role").and_then(Value::as_str) == Some("assistant")
        || entry.get("type").and_then(Value::as_str) == Some("assistant")
}

fn usage_of(entry: &Value) -> Option<TokenUsage> {
    message_of(entry)
        .get("usage")
        .or_else(|| entry.get("usage"))
        .filter(|u| u.is_object())
        .map(TokenUsage::from_value)
}

fn mentions_tool_use(entry: &Value, tool_use_id: &str) -> bool {
    message_of(entry)
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items.iter().any(|item| {
                item.get("type").and_then(Value::as_str) == Some("tool_use")
                    && item.get("id").and_then(Value::as_str) == Some(tool_use_id)
            })
        })
        .unwrap_or(false)
}

fn read_tail(path: &Path, window: u64) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let offset = len.saturating_sub(window);
    file.seek(SeekFrom::Start(offset))?;

    let mut buf = Vec::with_capacity((len - offset) as usize);
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Token usage of the assistant message that issued `tool_use_id`.
///
/// Only the last [`TAIL_WINDOW_BYTES`] of the file are read; the most recent
/// matching entry wins. `None` when the path is empty, the file is missing,
/// nothing matches, or the match carries no usage block.
pub fn extract_usage(path: impl AsRef<Path>, tool_use_id: &str) -> Option<TokenUsage> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() || tool_use_id.is_empty() {
        return None;
    }

    let tail = match read_tail(path, TAIL_WINDOW_BYTES) {
        Ok(tail) => tail,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Transcript not readable");
            return None;
        }
    };

    tail.lines()
        .rev()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .find(|entry| is_assistant(entry) && mentions_tool_use(entry, tool_use_id))
        .and_then(|entry| usage_of(&entry))
}

/// Parse a whole transcript into its entries.
///
/// Accepts `{"messages": [...]}`, a bare `[...]`, or JSON-lines.
fn transcript_entries(content: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(entries)) => entries,
        Ok(Value::Object(mut doc)) => match doc.remove("messages") {
            Some(Value::Array(entries)) => entries,
            // a one-line JSON-lines file parses as a single object
            _ => vec![Value::Object(doc)],
        },
        _ => content
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
            .collect(),
    }
}

/// Count assistant turns with usage and sum their tokens.
///
/// `None` when the path is empty or unreadable, or no assistant message
/// carries usage.
pub fn scan_turns(path: impl AsRef<Path>) -> Option<TurnScan> {
    scan_turns_since(path, 0).filter(|scan| scan.turns > 0)
}

/// Like [`scan_turns`], but only entries at index `start` or later count.
///
/// Returns a scan with zero turns rather than `None` when nothing new
/// qualifies, so callers can still advance their cursor to `entries`.
/// A transcript shorter than `start` was rewritten and yields zero turns.
pub fn scan_turns_since(path: impl AsRef<Path>, start: usize) -> Option<TurnScan> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return None;
    }

    let content = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Transcript not readable");
            return None;
        }
    };

    let entries = transcript_entries(&content);
    let mut scan = TurnScan {
        entries: entries.len(),
        ..TurnScan::default()
    };
    for entry in entries.iter().skip(start) {
        if !is_assistant(entry) {
            continue;
        }
        if let Some(usage) = usage_of(entry) {
            scan.usage.add(&usage);
            scan.turns += 1;
        }
    }

    Some(scan)
}
