// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! agent-otel entry point - hook subcommands and config inspection.
//!
//! The host runtime invokes one hook subcommand per event with the JSON
//! payload on stdin. Hook subcommands always exit 0.

use std::io::Read;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use agent_otel::config::{self, OtelConfig};
use agent_otel::hooks::{self, FileContextStore, HookEvent};
use agent_otel::telemetry::{
    init_logging, HookMetrics, LogConfig, LogTracer, MetricsRecorder, NoopMetrics, NoopToolLog,
    TelemetryTracer, ToolCallLog, TracingToolLog,
};
use agent_otel::VERSION;

/// agent-otel - OpenTelemetry hooks for LLM agent CLIs.
#[derive(Parser)]
#[command(name = "agent-otel")]
#[command(author, version, about = "OpenTelemetry hooks for LLM agent CLIs", long_about = None)]
struct Cli {
    /// Show debug output on stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for agent-otel.
#[derive(Subcommand)]
enum Commands {
    /// Record the start of a tool call (payload on stdin)
    PreTool,

    /// Emit the span for a finished tool call (payload on stdin)
    PostTool,

    /// Emit a context compaction span (payload on stdin)
    PreCompact,

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Show version information
    Version,
}

/// Config subcommand actions.
#[derive(Subcommand)]
enum ConfigAction {
    /// Show the resolved configuration as JSON
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config_or_default();

    if let Err(e) = init_logging(&LogConfig::for_debug_flag(cli.debug || config.debug)) {
        eprintln!("agent-otel: logging unavailable: {}", e);
    }

    match cli.command {
        Commands::PreTool => run_hook(config, HookKind::PreTool).await,
        Commands::PostTool => run_hook(config, HookKind::PostTool).await,
        Commands::PreCompact => run_hook(config, HookKind::PreCompact).await,
        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },
        Commands::Version => print_version(&config),
    }

    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum HookKind {
    PreTool,
    PostTool,
    PreCompact,
}

/// Run one hook to completion. Never fails.
async fn run_hook(config: OtelConfig, kind: HookKind) {
    let event = read_event();

    // Flushing blocks, so keep it off the runtime threads the exporters use.
    let handle = tokio::task::spawn_blocking(move || dispatch(&config, kind, &event));
    if let Err(e) = handle.await {
        debug!(hook = ?kind, error = %e, "Hook task failed");
    }
}

fn dispatch(config: &OtelConfig, kind: HookKind, event: &HookEvent) {
    let store = FileContextStore::new(config.context_dir.clone());

    match kind {
        HookKind::PreTool => {
            hooks::run_pre_tool(event, &store);
        }
        HookKind::PostTool => {
            let tracer = build_tracer(config);
            let metrics = build_metrics(config);
            let tool_log = build_tool_log(config);
            let report = hooks::run_post_tool(
                event,
                &store,
                tracer.as_ref(),
                metrics.as_ref(),
                tool_log.as_ref(),
                config.flush_timeout(),
            );
            debug!(
                tool = %report.tool_name,
                status = report.status.as_str(),
                duration_ms = report.duration_ms,
                correlated = report.correlated,
                "post-tool done"
            );
        }
        HookKind::PreCompact => {
            let tracer = build_tracer(config);
            let metrics = build_metrics(config);
            hooks::run_pre_compact(event, tracer.as_ref(), metrics.as_ref(), config.flush_timeout());
        }
    }
}

/// Parse the stdin payload; anything unreadable becomes an empty event.
fn read_event() -> HookEvent {
    let mut input = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut input) {
        debug!(error = %e, "Failed to read hook payload");
        return HookEvent::default();
    }

    if input.trim().is_empty() {
        return HookEvent::default();
    }

    serde_json::from_str(&input).unwrap_or_else(|e| {
        debug!(error = %e, "Malformed hook payload");
        HookEvent::default()
    })
}

#[cfg(feature = "otlp")]
fn build_tracer(config: &OtelConfig) -> Box<dyn TelemetryTracer> {
    use agent_otel::telemetry::otlp::OtelTracer;

    if config.traces_enabled() {
        match OtelTracer::new(config) {
            Ok(tracer) => return Box::new(tracer),
            Err(e) => debug!(error = %e, "Falling back to log tracer"),
        }
    }
    Box::new(LogTracer::new())
}

#[cfg(not(feature = "otlp"))]
fn build_tracer(config: &OtelConfig) -> Box<dyn TelemetryTracer> {
    if config.traces_enabled() {
        debug!("Built without the otlp feature, spans go to the log");
    }
    Box::new(LogTracer::new())
}

#[cfg(feature = "otlp")]
fn build_metrics(config: &OtelConfig) -> Box<dyn MetricsRecorder> {
    use agent_otel::telemetry::otlp::OtelMetrics;

    if !config.metrics_enabled() {
        return Box::new(NoopMetrics);
    }
    match OtelMetrics::new(config) {
        Ok(metrics) => Box::new(metrics),
        Err(e) => {
            debug!(error = %e, "Falling back to in-process metrics");
            Box::new(HookMetrics::new())
        }
    }
}

#[cfg(not(feature = "otlp"))]
fn build_metrics(config: &OtelConfig) -> Box<dyn MetricsRecorder> {
    if config.metrics_enabled() {
        Box::new(HookMetrics::new())
    } else {
        Box::new(NoopMetrics)
    }
}

#[cfg(feature = "otlp")]
fn build_tool_log(config: &OtelConfig) -> Box<dyn ToolCallLog> {
    use agent_otel::telemetry::otlp::OtelToolLog;

    if !config.logs_enabled() {
        return Box::new(NoopToolLog);
    }
    match OtelToolLog::new(config) {
        Ok(log) => Box::new(log),
        Err(e) => {
            debug!(error = %e, "Falling back to tracing tool-call log");
            Box::new(TracingToolLog)
        }
    }
}

#[cfg(not(feature = "otlp"))]
fn build_tool_log(config: &OtelConfig) -> Box<dyn ToolCallLog> {
    if config.logs_enabled() {
        Box::new(TracingToolLog)
    } else {
        Box::new(NoopToolLog)
    }
}

fn print_version(config: &OtelConfig) {
    println!("{} {}", "agent-otel".bright_cyan().bold(), VERSION);

    let otlp = if cfg!(feature = "otlp") {
        "enabled".green()
    } else {
        "disabled".yellow()
    };
    println!("  otlp export: {}", otlp);
    println!(
        "  endpoint:    {} ({})",
        config.endpoint.bright_white(),
        config.protocol
    );
    println!(
        "  traces:      {}",
        if config.traces_enabled() { "on".green() } else { "off".dimmed() }
    );
    println!(
        "  metrics:     {}",
        if config.metrics_enabled() { "on".green() } else { "off".dimmed() }
    );
    println!(
        "  logs:        {}",
        if config.logs_enabled() { "on".green() } else { "off".dimmed() }
    );
    println!("  flush:       {}ms", config.flush_timeout_ms);
}
