// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Identifiers that tie spans together across events and processes.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Identifier for one agent session.
///
/// Taken from the host's `session_id` when present, otherwise generated as a
/// 32-character hex UUID.
#[derive(Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Use the host-supplied id, or generate one when it is absent or empty.
    pub fn resolve(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(id) if !id.is_empty() => Self(id.to_string()),
            _ => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short representation (first 8 characters) for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.short())
    }
}

/// Nanoseconds since the Unix epoch.
pub fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Convert stored epoch nanoseconds back into a `SystemTime`.
pub fn system_time_from_nanos(nanos: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(nanos)
}

/// Prefix shared by every fallback id generated for `tool_name`.
pub fn fallback_prefix(tool_name: &str) -> String {
    format!("{}_", tool_name)
}

/// Correlation id for a tool call the host did not give an id to:
/// `<tool_name>_<unix-nanos>`.
pub fn fallback_tool_use_id(tool_name: &str) -> String {
    format!("{}{}", fallback_prefix(tool_name), unix_nanos())
}

/// The host's `tool_use_id`, or a fallback id when it is absent or empty.
pub fn resolve_tool_use_id(tool_use_id: Option<&str>, tool_name: &str) -> String {
    match tool_use_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => fallback_tool_use_id(tool_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_generate_unique() {
        let id1 = SessionId::generate();
        let id2 = SessionId::generate();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 32);
        assert!(!id1.as_str().contains('-'));
    }

    #[test]
    fn test_session_id_resolve() {
        assert_eq!(SessionId::resolve(Some("abc")).as_str(), "abc");
        assert_eq!(SessionId::resolve(Some("")).as_str().len(), 32);
        assert_eq!(SessionId::resolve(None).as_str().len(), 32);
    }

    #[test]
    fn test_session_id_short_and_debug() {
        let id = SessionId::resolve(Some("0123456789abcdef"));
        assert_eq!(id.short(), "01234567");
        assert_eq!(format!("{:?}", id), "SessionId(01234567)");
        assert_eq!(SessionId::resolve(Some("abc")).short(), "abc");
    }

    #[test]
    fn test_session_id_serde_transparent() {
        let id = SessionId::resolve(Some("s-1"));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"s-1\"");
    }

    #[test]
    fn test_fallback_tool_use_id() {
        let id = fallback_tool_use_id("Bash");
        assert!(id.starts_with("Bash_"));
        assert!(id["Bash_".len()..].parse::<u64>().is_ok());
    }

    #[test]
    fn test_resolve_tool_use_id() {
        assert_eq!(resolve_tool_use_id(Some("toolu_1"), "Bash"), "toolu_1");
        assert!(resolve_tool_use_id(Some(""), "Read").starts_with("Read_"));
        assert!(resolve_tool_use_id(None, "Read").starts_with("Read_"));
    }

    #[test]
    fn test_nanos_round_trip() {
        let nanos = 1_700_000_000_123_456_789u64;
        let time = system_time_from_nanos(nanos);
        assert_eq!(time.duration_since(UNIX_EPOCH).unwrap().as_nanos(), nanos as u128);
    }
}
