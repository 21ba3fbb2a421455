// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Diagnostic logging initialization.
//!
//! Hooks run inside the host agent's process tree, and the host owns stdout,
//! so every log line goes to stderr.

use std::io;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Configuration for diagnostic logging.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level if RUST_LOG is not set.
    pub default_level: Level,

    /// Whether to include file/line information.
    pub include_file_line: bool,

    /// Whether to include target module path.
    pub include_target: bool,

    /// Whether to use ANSI colors in output.
    pub ansi_colors: bool,

    /// Custom filter directive (overrides default_level).
    pub filter_directive: Option<String>,
}

impl Default for LogConfig {
    /// Quiet: only warnings, no colors.
    fn default() -> Self {
        Self {
            default_level: Level::WARN,
            include_file_line: false,
            include_target: false,
            ansi_colors: false,
            filter_directive: None,
        }
    }
}

impl LogConfig {
    /// Verbose output for `AGENT_OTEL_DEBUG`.
    pub fn debug() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_file_line: true,
            include_target: true,
            ansi_colors: false,
            filter_directive: None,
        }
    }

    /// Trace-level output scoped to this crate.
    pub fn testing() -> Self {
        Self {
            default_level: Level::TRACE,
            include_file_line: true,
            include_target: true,
            ansi_colors: false,
            filter_directive: Some("agent_otel=trace".to_string()),
        }
    }

    /// Pick the preset for the `debug` config flag.
    pub fn for_debug_flag(debug: bool) -> Self {
        if debug {
            Self::debug()
        } else {
            Self::default()
        }
    }

    /// Set the default log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Set a custom filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.default_level.to_string());
        match &self.filter_directive {
            Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Install the global subscriber.
///
/// Call once at startup. A second call returns an error and leaves the first
/// subscriber in place.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_file(config.include_file_line)
        .with_line_number(config.include_file_line)
        .compact();

    tracing_subscriber::registry()
        .with(config.build_filter())
        .with(fmt_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default_is_quiet() {
        let config = LogConfig::default();
        assert_eq!(config.default_level, Level::WARN);
        assert!(!config.ansi_colors);
    }

    #[test]
    fn test_for_debug_flag() {
        assert_eq!(LogConfig::for_debug_flag(true).default_level, Level::DEBUG);
        assert_eq!(LogConfig::for_debug_flag(false).default_level, Level::WARN);
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::default()
            .with_level(Level::INFO)
            .with_filter("agent_otel=debug");

        assert_eq!(config.default_level, Level::INFO);
        assert_eq!(config.filter_directive, Some("agent_otel=debug".to_string()));
    }

    #[test]
    fn test_testing_preset_filter() {
        let config = LogConfig::testing();
        assert_eq!(config.filter_directive.as_deref(), Some("agent_otel=trace"));
    }
}
