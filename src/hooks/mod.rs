// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hook handling: turning host lifecycle events into spans and metrics.
//!
//! Two ways in:
//!
//! - [`SessionController`] for hosts that call back into one long-lived
//!   process (prompt, tool, turn and compaction events for a whole session).
//! - The `run_*` functions in [`process`] for hosts that spawn one process
//!   per event. These correlate pre/post tool calls through a
//!   [`ContextStore`].

pub mod classify;
pub mod context_store;
pub mod controller;
pub mod event;
pub mod process;
pub mod summary;
pub mod transcript;

pub use classify::{classify, error_message, ToolStatus};
pub use context_store::{
    sanitize_id, ContextStore, FileContextStore, MemoryContextStore, ToolInvocationContext,
};
pub use controller::{
    ControllerOptions, Message, Role, SessionController, SessionMetrics, SessionSummary,
    UNFINISHED_TOOL_MESSAGE,
};
pub use event::{AssistantMessage, HookContext, HookEvent, TokenUsage, UNKNOWN_MODEL};
pub use process::{run_post_tool, run_pre_compact, run_pre_tool, PostToolReport};
pub use summary::{input_summary, payload_size, tool_title, truncate, TRUNCATION_MARKER};
pub use transcript::{extract_usage, scan_turns, scan_turns_since, TurnScan, TAIL_WINDOW_BYTES};
