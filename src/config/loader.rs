// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading configuration from JSON and YAML files in the global
//! config directory.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::FileConfig;

/// Config file names to search for in the global directory (in order).
pub const CONFIG_FILES: &[&str] = &["config.json", "config.yaml", "config.yml"];

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".agent-otel";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Load global configuration from ~/.agent-otel/.
pub fn load_global_config() -> Result<Option<FileConfig>, ConfigError> {
    match get_global_config_dir() {
        Some(dir) => load_config_from_dir(&dir),
        None => Ok(None),
    }
}

/// Load the first config file found in `dir`.
///
/// Searches for config files in the following order:
/// 1. config.json
/// 2. config.yaml
/// 3. config.yml
pub fn load_config_from_dir(dir: &Path) -> Result<Option<FileConfig>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = dir.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}
