// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! [`FileConfig`] is the partial shape read from disk (JSON or YAML), every
//! field optional. [`OtelConfig`] is the fully resolved configuration handed
//! to the hooks and exporters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default collector endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4317";

/// Default OTLP protocol.
pub const DEFAULT_PROTOCOL: &str = "grpc";

/// Default `service.name` resource attribute.
pub const DEFAULT_SERVICE_NAME: &str = "claude-cli";

/// Default `service.namespace` resource attribute.
pub const DEFAULT_SERVICE_NAMESPACE: &str = "claude-otel";

/// Default upper bound on a synchronous flush.
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 5_000;

/// Name of the directory (under the system temp dir) holding pre-tool contexts.
pub const DEFAULT_CONTEXT_DIR_NAME: &str = "claude-otel-spans";

/// Partial configuration as stored in ~/.agent-otel/config.json.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    /// Collector endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// OTLP protocol (grpc or http)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// service.name resource attribute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// service.namespace resource attribute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_namespace: Option<String>,

    /// Extra resource attributes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_attributes: Option<BTreeMap<String, String>>,

    /// Trace exporter (otlp or none)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces_exporter: Option<String>,

    /// Log exporter (otlp or none)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs_exporter: Option<String>,

    /// Metrics exporter (otlp or none)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_exporter: Option<String>,

    /// Trace sampler name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces_sampler: Option<String>,

    /// Trace sampler argument
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces_sampler_arg: Option<String>,

    /// Enable debug diagnostics on stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,

    /// Directory for pre-tool context files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_dir: Option<PathBuf>,

    /// One child span per tool call (false: events on the session span)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_tool_spans: Option<bool>,

    /// Flush timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_timeout_ms: Option<u64>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtelConfig {
    pub endpoint: String,
    pub protocol: String,
    pub service_name: String,
    pub service_namespace: String,
    pub resource_attributes: BTreeMap<String, String>,
    pub traces_exporter: String,
    pub logs_exporter: String,
    pub metrics_exporter: String,
    pub traces_sampler: String,
    pub traces_sampler_arg: Option<String>,
    pub debug: bool,
    pub context_dir: PathBuf,
    pub create_tool_spans: bool,
    pub flush_timeout_ms: u64,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_namespace: DEFAULT_SERVICE_NAMESPACE.to_string(),
            resource_attributes: BTreeMap::new(),
            traces_exporter: "otlp".to_string(),
            logs_exporter: "otlp".to_string(),
            metrics_exporter: "none".to_string(),
            traces_sampler: "always_on".to_string(),
            traces_sampler_arg: None,
            debug: false,
            context_dir: std::env::temp_dir().join(DEFAULT_CONTEXT_DIR_NAME),
            create_tool_spans: true,
            flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT_MS,
        }
    }
}

impl OtelConfig {
    /// Check if trace export is enabled.
    pub fn traces_enabled(&self) -> bool {
        !self.traces_exporter.eq_ignore_ascii_case("none")
    }

    /// Check if log export is enabled.
    pub fn logs_enabled(&self) -> bool {
        !self.logs_exporter.eq_ignore_ascii_case("none")
    }

    /// Check if metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        !self.metrics_exporter.eq_ignore_ascii_case("none")
    }

    /// Check if using the gRPC protocol.
    pub fn is_grpc(&self) -> bool {
        self.protocol.eq_ignore_ascii_case("grpc")
    }

    /// Endpoint without a scheme, as expected by plain gRPC clients.
    pub fn grpc_endpoint(&self) -> &str {
        self.endpoint
            .strip_prefix("http://")
            .or_else(|| self.endpoint.strip_prefix("https://"))
            .unwrap_or(&self.endpoint)
    }

    /// Endpoint with a scheme, as expected by HTTP exporters.
    pub fn http_endpoint(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.clone()
        } else {
            format!("http://{}", self.endpoint)
        }
    }

    /// Flush timeout as a [`Duration`].
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OtelConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert!(config.traces_enabled());
        assert!(config.logs_enabled());
        assert!(!config.metrics_enabled());
        assert!(config.is_grpc());
        assert!(config.create_tool_spans);
        assert!(config.context_dir.ends_with(DEFAULT_CONTEXT_DIR_NAME));
    }

    #[test]
    fn test_endpoint_formats() {
        let mut config = OtelConfig::default();
        config.endpoint = "https://collector:4317".to_string();
        assert_eq!(config.grpc_endpoint(), "collector:4317");
        assert_eq!(config.http_endpoint(), "https://collector:4317");

        config.endpoint = "collector:4318".to_string();
        assert_eq!(config.grpc_endpoint(), "collector:4318");
        assert_eq!(config.http_endpoint(), "http://collector:4318");
    }

    #[test]
    fn test_exporter_toggles_case_insensitive() {
        let config = OtelConfig {
            traces_exporter: "NONE".to_string(),
            metrics_exporter: "otlp".to_string(),
            protocol: "HTTP".to_string(),
            ..Default::default()
        };
        assert!(!config.traces_enabled());
        assert!(config.metrics_enabled());
        assert!(!config.is_grpc());
    }

    #[test]
    fn test_file_config_camel_case() {
        let config: FileConfig = serde_json::from_str(
            r#"{"serviceName": "svc", "createToolSpans": false, "flushTimeoutMs": 250}"#,
        )
        .unwrap();
        assert_eq!(config.service_name, Some("svc".to_string()));
        assert_eq!(config.create_tool_spans, Some(false));
        assert_eq!(config.flush_timeout_ms, Some(250));
    }
}
