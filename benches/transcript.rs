// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for transcript scanning and tool classification.
//!
//! Run with: `cargo bench --bench transcript`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use std::hint::black_box;
use tempfile::TempDir;

use agent_otel::hooks::{classify, extract_usage, input_summary, scan_turns};
use serde_json::json;

/// Write a JSON-lines transcript with `turns` assistant tool-use entries.
fn write_transcript(dir: &TempDir, turns: usize) -> std::path::PathBuf {
    let mut content = String::new();
    for i in 0..turns {
        let user = json!({"type": "user", "message": {"role": "user", "content": format!("step {}", i)}});
        let assistant = json!({
            "type": "assistant",
            "message": {
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Running the next command."},
                    {"type": "tool_use", "id": format!("toolu_{:05}", i), "name": "Bash", "input": {"command": "ls"}}
                ],
                "usage": {"input_tokens": 1000 + i, "output_tokens": 50, "cache_read_input_tokens": 800}
            }
        });
        content.push_str(&user.to_string());
        content.push('\n');
        content.push_str(&assistant.to_string());
        content.push('\n');
    }

    let path = dir.path().join(format!("transcript-{}.jsonl", turns));
    fs::write(&path, content).unwrap();
    path
}

/// Tail-window lookup of the most recent tool call versus a miss.
fn bench_extract_usage(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let mut group = c.benchmark_group("extract_usage");

    for turns in [10, 100, 1000] {
        let path = write_transcript(&temp, turns);
        let last_id = format!("toolu_{:05}", turns - 1);

        group.bench_with_input(BenchmarkId::new("latest", turns), &path, |b, path| {
            b.iter(|| extract_usage(black_box(path), black_box(&last_id)));
        });
        group.bench_with_input(BenchmarkId::new("miss", turns), &path, |b, path| {
            b.iter(|| extract_usage(black_box(path), black_box("toolu_none")));
        });
    }

    group.finish();
}

/// Whole-file turn scan used by the stop event.
fn bench_scan_turns(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let mut group = c.benchmark_group("scan_turns");

    for turns in [10, 100, 1000] {
        let path = write_transcript(&temp, turns);
        group.throughput(Throughput::Elements(turns as u64));
        group.bench_with_input(BenchmarkId::from_parameter(turns), &path, |b, path| {
            b.iter(|| scan_turns(black_box(path)));
        });
    }

    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");

    let object = json!({"stdout": "ok", "stderr": "", "exit_code": 0});
    let long_text = json!("line of output\n".repeat(500));
    let error_text = json!("Error: file not found");

    group.bench_function("object", |b| b.iter(|| classify(black_box(&object))));
    group.bench_function("long_string", |b| b.iter(|| classify(black_box(&long_text))));
    group.bench_function("error_string", |b| b.iter(|| classify(black_box(&error_text))));
    group.bench_function("input_summary", |b| {
        let input = json!({"command": "cargo test --all-features -- --nocapture"});
        b.iter(|| input_summary(black_box(&input), black_box("Bash")))
    });

    group.finish();
}

criterion_group!(benches, bench_extract_usage, bench_scan_turns, bench_classify);
criterion_main!(benches);
