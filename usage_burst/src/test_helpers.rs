//! Centralized test helpers for usage-burst
//!
//! This module provides common test utilities used across unit tests,
//! integration tests and benchmarks, mostly for producing gzip compressed
//! usage traces on disk.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::{tempdir, TempDir};

/// Renders one well-formed trace line in the shape of the cluster usage
/// export.
pub fn usage_line(start_time: i64, collection_id: &str, cpus: f64) -> String {
    format!(
        r#"{{"start_time":{},"end_time":{},"collection_id":"{}","instance_index":0,"average_usage":{{"cpus":{},"memory":{}}}}}"#,
        start_time,
        start_time + 300_000_000,
        collection_id,
        cpus,
        cpus / 2.0
    )
}

/// Writes the given lines, newline terminated, as a gzip compressed file.
///
/// # Panics
/// Panics if the file cannot be created or written.
pub fn write_gzip_lines(path: &Path, lines: &[String]) {
    let file = File::create(path).expect("Failed to create trace file");
    let mut encoder = GzEncoder::new(file, Compression::default());
    for line in lines {
        writeln!(encoder, "{}", line).expect("Failed to write trace line");
    }
    encoder.finish().expect("Failed to finish gzip stream");
}

/// Creates a temporary directory holding `trace.json.gz` with the given lines.
///
/// # Returns
/// The `TempDir` (cleaned up when dropped) and the path of the trace.
pub fn dir_with_trace(lines: &[String]) -> (TempDir, PathBuf) {
    let dir = tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("trace.json.gz");
    write_gzip_lines(&path, lines);
    (dir, path)
}

/// A small trace: job "busy" sampled every minute for half an hour with a
/// spike in the middle, job "idle" sampled a handful of times, plus a few
/// malformed lines.
pub fn sample_trace_lines() -> Vec<String> {
    const MINUTE: i64 = 60_000_000;
    let base = 1_556_668_800_000_000;

    let mut lines: Vec<String> = (0..30)
        .map(|i| {
            let cpus = if (12..15).contains(&i) { 4.0 } else { 0.5 };
            usage_line(base + i * MINUTE, "busy", cpus)
        })
        .collect();
    lines.extend((0..5).map(|i| usage_line(base + i * 7 * MINUTE, "idle", 0.125)));
    lines.push("not json".to_string());
    lines.push(r#"{"start_time": 1, "collection_id": "busy"}"#.to_string());
    lines
}
