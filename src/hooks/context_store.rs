// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Single-use storage handing tool-call context from the pre-tool hook to
//! the post-tool hook.
//!
//! The two hooks usually run as separate short-lived processes, so the
//! default store is one JSON file per correlation id. An entry is deleted the
//! first time it is read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::StoreError;
use crate::telemetry::unix_nanos;

/// What the pre-tool hook knows about a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationContext {
    /// Call start, nanoseconds since the Unix epoch.
    pub start_time_ns: u64,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub cwd: String,
}

impl ToolInvocationContext {
    /// Context for a call starting now.
    pub fn starting_now(
        tool_name: impl Into<String>,
        tool_input: Value,
        session_id: impl Into<String>,
        cwd: impl Into<String>,
    ) -> Self {
        Self {
            start_time_ns: unix_nanos(),
            tool_name: tool_name.into(),
            tool_input,
            session_id: session_id.into(),
            cwd: cwd.into(),
        }
    }
}

/// Put/take storage keyed by correlation id.
pub trait ContextStore: Send + Sync {
    /// Store `context` under `id`, replacing any previous entry.
    fn put(&self, id: &str, context: &ToolInvocationContext) -> Result<(), StoreError>;

    /// Remove and return the entry for `id`.
    ///
    /// Missing or unreadable entries yield `None`; an unreadable entry is
    /// still removed.
    fn take(&self, id: &str) -> Option<ToolInvocationContext>;
}

/// Map an id to a safe file stem: anything outside `[A-Za-z0-9_.-]`
/// becomes `_`, and a stem made only of dots is prefixed.
pub fn sanitize_id(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.chars().all(|c| c == '.') {
        format!("_{}", stem)
    } else {
        stem
    }
}

/// One JSON file per id under a directory.
#[derive(Debug, Clone)]
pub struct FileContextStore {
    dir: PathBuf,
}

impl FileContextStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under `<tmp>/claude-otel-spans`.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join(crate::config::DEFAULT_CONTEXT_DIR_NAME))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `id`.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_id(id)))
    }
}

impl ContextStore for FileContextStore {
    fn put(&self, id: &str, context: &ToolInvocationContext) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::EmptyId);
        }

        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec(context)?;
        std::fs::write(self.path_for(id), json)?;
        Ok(())
    }

    fn take(&self, id: &str) -> Option<ToolInvocationContext> {
        if id.is_empty() {
            return None;
        }

        let path = self.path_for(id);
        let content = std::fs::read(&path).ok()?;

        if let Err(e) = std::fs::remove_file(&path) {
            debug!(path = %path.display(), error = %e, "Failed to remove context file");
        }

        match serde_json::from_slice(&content) {
            Ok(context) => Some(context),
            Err(e) => {
                debug!(id, error = %e, "Discarding corrupt context file");
                None
            }
        }
    }
}

/// Same-process store for when both hooks run in one process.
#[derive(Debug, Default)]
pub struct MemoryContextStore {
    entries: Mutex<HashMap<String, ToolInvocationContext>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContextStore for MemoryContextStore {
    fn put(&self, id: &str, context: &ToolInvocationContext) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::EmptyId);
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        entries.insert(id.to_string(), context.clone());
        Ok(())
    }

    fn take(&self, id: &str) -> Option<ToolInvocationContext> {
        self.entries.lock().ok()?.remove(id)
    }
}
