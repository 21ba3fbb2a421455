// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for agent-otel.
//!
//! This module provides strongly-typed errors for the different parts of the crate,
//! using `thiserror` for ergonomic error definitions and `anyhow` for error propagation
//! at the binary edge. None of these ever reach the host runtime: hook handlers log
//! them at debug level and carry on.

use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors that can occur while persisting tool invocation contexts.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Empty correlation id")]
    EmptyId,

    #[error("Failed to serialize context: {0}")]
    Serialize(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}

/// Errors raised by telemetry backends.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Exporter setup failed: {0}")]
    Setup(String),

    #[error("Flush timed out after {0}ms")]
    FlushTimeout(u64),

    #[error("Flush failed: {0}")]
    FlushFailed(String),
}

/// Reasons a session controller handler had nothing to do.
///
/// These are expected conditions (events arriving out of order, a hook that
/// crashed in another process) and are only ever logged at debug level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("No active session span")]
    NoActiveSession,

    #[error("No pending span for tool {tool_name} (id: {tool_use_id:?})")]
    NoPendingTool {
        tool_name: String,
        tool_use_id: Option<String>,
    },

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let config_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_store_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let store_err: StoreError = io_err.into();
        assert!(matches!(store_err, StoreError::IoError(_)));
    }

    #[test]
    fn test_hook_error_display() {
        let err = HookError::NoPendingTool {
            tool_name: "Bash".to_string(),
            tool_use_id: Some("toolu_1".to_string()),
        };
        let display = err.to_string();
        assert!(display.contains("Bash"));
        assert!(display.contains("toolu_1"));
    }
}
