// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for agent-otel.
//!
//! Handles loading and merging of configuration from multiple sources:
//! - Global config: ~/.agent-otel/config.json (or config.yaml)
//! - Environment: the standard `OTEL_*` variables plus `AGENT_OTEL_*` switches
//!
//! Configuration is merged with precedence (environment > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    get_global_config_dir, load_config_file, load_config_from_dir, load_global_config,
    CONFIG_FILES, GLOBAL_CONFIG_DIR,
};

pub use merger::{default_config, env, env_overrides, merge_config, parse_flag, parse_resource_attributes};

pub use types::{
    FileConfig, OtelConfig, DEFAULT_CONTEXT_DIR_NAME, DEFAULT_ENDPOINT, DEFAULT_FLUSH_TIMEOUT_MS,
    DEFAULT_PROTOCOL, DEFAULT_SERVICE_NAME, DEFAULT_SERVICE_NAMESPACE,
};

use crate::error::ConfigError;

/// Load and merge all configuration sources.
///
/// This is the main entry point for configuration loading.
pub fn load_config() -> Result<OtelConfig, ConfigError> {
    let global = load_global_config()?;
    let env = env_overrides(|key| std::env::var(key).ok());

    Ok(merge_config(global, env))
}

/// Like [`load_config`], but a broken config file falls back to defaults.
///
/// Hooks must never fail because of configuration; this is what they use.
pub fn load_config_or_default() -> OtelConfig {
    match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unreadable config file");
            merge_config(None, env_overrides(|key| std::env::var(key).ok()))
        }
    }
}
