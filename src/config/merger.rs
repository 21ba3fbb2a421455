// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.
//! Environment lookups go through a caller-supplied function so the merge is
//! testable without touching the process environment.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::types::{FileConfig, OtelConfig};

/// Environment variable names understood by [`env_overrides`].
pub mod env {
    pub const ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
    pub const PROTOCOL: &str = "OTEL_EXPORTER_OTLP_PROTOCOL";
    pub const SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
    pub const SERVICE_NAMESPACE: &str = "OTEL_SERVICE_NAMESPACE";
    pub const RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";
    pub const TRACES_EXPORTER: &str = "OTEL_TRACES_EXPORTER";
    pub const LOGS_EXPORTER: &str = "OTEL_LOGS_EXPORTER";
    pub const METRICS_EXPORTER: &str = "OTEL_METRICS_EXPORTER";
    pub const TRACES_SAMPLER: &str = "OTEL_TRACES_SAMPLER";
    pub const TRACES_SAMPLER_ARG: &str = "OTEL_TRACES_SAMPLER_ARG";
    pub const DEBUG: &str = "AGENT_OTEL_DEBUG";
    pub const CONTEXT_DIR: &str = "AGENT_OTEL_CONTEXT_DIR";
    pub const TOOL_SPANS: &str = "AGENT_OTEL_TOOL_SPANS";
    pub const FLUSH_TIMEOUT_MS: &str = "AGENT_OTEL_FLUSH_TIMEOUT_MS";
}

/// Default configuration values.
pub fn default_config() -> OtelConfig {
    OtelConfig::default()
}

/// Parse `OTEL_RESOURCE_ATTRIBUTES` format: `key1=val1,key2=val2`.
///
/// Pairs without `=` are ignored; keys and values are trimmed.
pub fn parse_resource_attributes(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Parse a boolean flag the way the hooks read them (`1`, `true`, `yes`).
pub fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Build a partial config from environment variables.
///
/// `lookup` is usually `|key| std::env::var(key).ok()`.
pub fn env_overrides<F>(lookup: F) -> FileConfig
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    FileConfig {
        endpoint: non_empty(env::ENDPOINT),
        protocol: non_empty(env::PROTOCOL),
        service_name: non_empty(env::SERVICE_NAME),
        service_namespace: non_empty(env::SERVICE_NAMESPACE),
        resource_attributes: non_empty(env::RESOURCE_ATTRIBUTES)
            .map(|raw| parse_resource_attributes(&raw)),
        traces_exporter: non_empty(env::TRACES_EXPORTER),
        logs_exporter: non_empty(env::LOGS_EXPORTER),
        metrics_exporter: non_empty(env::METRICS_EXPORTER),
        traces_sampler: non_empty(env::TRACES_SAMPLER),
        traces_sampler_arg: non_empty(env::TRACES_SAMPLER_ARG),
        debug: non_empty(env::DEBUG).map(|v| parse_flag(&v)),
        context_dir: non_empty(env::CONTEXT_DIR).map(PathBuf::from),
        create_tool_spans: non_empty(env::TOOL_SPANS).map(|v| {
            !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off")
        }),
        flush_timeout_ms: non_empty(env::FLUSH_TIMEOUT_MS).and_then(|v| v.trim().parse().ok()),
    }
}

/// Merge configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables
/// 2. Global config (~/.agent-otel/config.json)
/// 3. Default values
pub fn merge_config(file: Option<FileConfig>, env: FileConfig) -> OtelConfig {
    let mut result = default_config();

    if let Some(config) = file {
        apply_file_config(&mut result, config);
    }

    apply_file_config(&mut result, env);

    result
}

fn apply_file_config(result: &mut OtelConfig, config: FileConfig) {
    if let Some(endpoint) = config.endpoint {
        result.endpoint = endpoint;
    }

    if let Some(protocol) = config.protocol {
        result.protocol = protocol;
    }

    if let Some(name) = config.service_name {
        result.service_name = name;
    }

    if let Some(namespace) = config.service_namespace {
        result.service_namespace = namespace;
    }

    if let Some(attributes) = config.resource_attributes {
        result.resource_attributes.extend(attributes);
    }

    if let Some(exporter) = config.traces_exporter {
        result.traces_exporter = exporter;
    }

    if let Some(exporter) = config.logs_exporter {
        result.logs_exporter = exporter;
    }

    if let Some(exporter) = config.metrics_exporter {
        result.metrics_exporter = exporter;
    }

    if let Some(sampler) = config.traces_sampler {
        result.traces_sampler = sampler;
    }

    if config.traces_sampler_arg.is_some() {
        result.traces_sampler_arg = config.traces_sampler_arg;
    }

    if let Some(debug) = config.debug {
        result.debug = debug;
    }

    if let Some(dir) = config.context_dir {
        result.context_dir = dir;
    }

    if let Some(create) = config.create_tool_spans {
        result.create_tool_spans = create;
    }

    if let Some(timeout) = config.flush_timeout_ms {
        result.flush_timeout_ms = timeout;
    }
}
