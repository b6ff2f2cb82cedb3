//! Streaming reader for gzip compressed, newline delimited usage traces.
//!
//! Every line is turned into a [`LineOutcome`]: either a parsed
//! [`UsageSample`] or the reason the line was skipped. Skips never abort the
//! load; they are tallied in a [`LoadSummary`] so the final report can show
//! how much of the trace was unusable.

use std::{
    collections::BTreeMap,
    fmt::Display,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result};
use chrono::DateTime;
use flate2::read::MultiGzDecoder;
use serde_json::{Map, Value};

use crate::data::UsageSample;

const START_TIME: &str = "start_time";
const COLLECTION_ID: &str = "collection_id";
const AVERAGE_USAGE: &str = "average_usage";
const CPUS: &str = "average_usage.cpus";
const MEMORY: &str = "average_usage.memory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    /// The line is not valid JSON (includes blank lines and invalid UTF-8)
    InvalidJson,
    /// The line is valid JSON but not an object
    NotAnObject,
    /// A required field is absent or null
    MissingField(&'static str),
    /// A required field is present but cannot be converted
    InvalidField(&'static str),
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::InvalidJson => write!(f, "invalid JSON"),
            SkipReason::NotAnObject => write!(f, "not a JSON object"),
            SkipReason::MissingField(field) => write!(f, "missing field '{}'", field),
            SkipReason::InvalidField(field) => write!(f, "invalid field '{}'", field),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum LineOutcome {
    Sample(UsageSample),
    Skipped(SkipReason),
}

/// Parses one trace line into a sample or the reason it has to be skipped.
pub fn parse_line(line: &[u8]) -> LineOutcome {
    match parse_record(line) {
        Ok(sample) => LineOutcome::Sample(sample),
        Err(reason) => LineOutcome::Skipped(reason),
    }
}

fn parse_record(line: &[u8]) -> Result<UsageSample, SkipReason> {
    let value: Value = serde_json::from_slice(line).map_err(|_| SkipReason::InvalidJson)?;
    let record = value.as_object().ok_or(SkipReason::NotAnObject)?;

    let timestamp = required(record, START_TIME)
        .and_then(|v| to_timestamp(v).ok_or(SkipReason::InvalidField(START_TIME)))?;
    let job_id = required(record, COLLECTION_ID)
        .and_then(|v| to_job_id(v).ok_or(SkipReason::InvalidField(COLLECTION_ID)))?;

    let usage = required(record, AVERAGE_USAGE)?
        .as_object()
        .ok_or(SkipReason::InvalidField(AVERAGE_USAGE))?;
    let cpu_usage = required(usage, "cpus")
        .map_err(|_| SkipReason::MissingField(CPUS))
        .and_then(|v| to_finite_float(v).ok_or(SkipReason::InvalidField(CPUS)))?;
    let mem_usage = required(usage, "memory")
        .map_err(|_| SkipReason::MissingField(MEMORY))
        .and_then(|v| to_finite_float(v).ok_or(SkipReason::InvalidField(MEMORY)))?;

    Ok(UsageSample {
        timestamp,
        job_id,
        cpu_usage,
        mem_usage,
    })
}

fn required<'a>(
    record: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Value, SkipReason> {
    match record.get(field) {
        None | Some(Value::Null) => Err(SkipReason::MissingField(field)),
        Some(value) => Ok(value),
    }
}

/// Integers are taken as is, floats are truncated toward zero and strings
/// must hold an integer. The result must be a representable point in time.
fn to_timestamp(value: &Value) -> Option<i64> {
    let micros = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i),
            None => n
                .as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64),
        },
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    DateTime::from_timestamp_micros(micros).map(|_| micros)
}

fn to_job_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn to_finite_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

/// Lazy, non-restartable sequence of line outcomes.
///
/// Yields no more than `max_rows` samples; once the limit is hit the
/// remaining input is left unread.
pub struct UsageRecords<R> {
    lines: io::Split<R>,
    max_rows: u64,
    emitted: u64,
    line_number: u64,
}

impl<R: BufRead> UsageRecords<R> {
    pub fn new(reader: R, max_rows: u64) -> Self {
        UsageRecords {
            lines: reader.split(b'\n'),
            max_rows,
            emitted: 0,
            line_number: 0,
        }
    }

    /// Whether reading stopped because `max_rows` samples were produced.
    pub fn limit_reached(&self) -> bool {
        self.emitted >= self.max_rows
    }
}

impl<R: BufRead> Iterator for UsageRecords<R> {
    type Item = io::Result<LineOutcome>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.limit_reached() {
            return None;
        }

        let mut line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e)),
        };
        self.line_number += 1;

        if line.last() == Some(&b'\r') {
            line.pop();
        }

        let outcome = parse_line(&line);
        match &outcome {
            LineOutcome::Sample(_) => self.emitted += 1,
            LineOutcome::Skipped(reason) => {
                log::trace!("Skipping line {}: {}", self.line_number, reason)
            }
        }
        Some(Ok(outcome))
    }
}

/// Opens a gzip compressed trace for streaming.
pub fn open_usage_trace(
    path: &Path,
    max_rows: u64,
) -> Result<UsageRecords<BufReader<MultiGzDecoder<File>>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open usage trace: {}", path.display()))?;
    Ok(UsageRecords::new(
        BufReader::new(MultiGzDecoder::new(file)),
        max_rows,
    ))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadSummary {
    pub lines_read: u64,
    pub samples: u64,
    pub skipped: BTreeMap<SkipReason, u64>,
    /// Reading stopped at the sample limit
    pub truncated: bool,
}

impl LoadSummary {
    pub fn total_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }
}

/// Drains the records into memory, counting skipped lines per reason.
pub fn collect_samples<R: BufRead>(
    mut records: UsageRecords<R>,
) -> io::Result<(Vec<UsageSample>, LoadSummary)> {
    let mut samples = Vec::new();
    let mut summary = LoadSummary::default();

    for outcome in records.by_ref() {
        summary.lines_read += 1;
        match outcome? {
            LineOutcome::Sample(sample) => samples.push(sample),
            LineOutcome::Skipped(reason) => *summary.skipped.entry(reason).or_default() += 1,
        }
    }

    summary.samples = samples.len() as u64;
    summary.truncated = records.limit_reached();
    Ok((samples, summary))
}

/// Reads up to `max_rows` samples from the gzip trace at `path`.
pub fn load_usage(path: &Path, max_rows: u64) -> Result<(Vec<UsageSample>, LoadSummary)> {
    let records = open_usage_trace(path, max_rows)?;
    collect_samples(records)
        .with_context(|| format!("Failed to read usage trace: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{usage_line, write_gzip_lines};
    use tempfile::tempdir;

    fn records(input: &str, max_rows: u64) -> UsageRecords<&[u8]> {
        UsageRecords::new(input.as_bytes(), max_rows)
    }

    #[test]
    fn test_parse_valid_line() {
        let line = br#"{"start_time": 1000000, "collection_id": 7, "average_usage": {"cpus": 0.25, "memory": 0.5}}"#;
        assert_eq!(
            parse_line(line),
            LineOutcome::Sample(UsageSample {
                timestamp: 1_000_000,
                job_id: "7".to_string(),
                cpu_usage: 0.25,
                mem_usage: 0.5,
            })
        );
    }

    #[test]
    fn test_parse_coerces_strings() {
        let line = br#"{"start_time": " 600000000 ", "collection_id": "job-a", "average_usage": {"cpus": "1.5", "memory": 2}}"#;
        match parse_line(line) {
            LineOutcome::Sample(sample) => {
                assert_eq!(sample.timestamp, 600_000_000);
                assert_eq!(sample.job_id, "job-a");
                assert_eq!(sample.cpu_usage, 1.5);
                assert_eq!(sample.mem_usage, 2.0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_parse_truncates_float_timestamp() {
        let line = br#"{"start_time": 1234.9, "collection_id": true, "average_usage": {"cpus": 0, "memory": 0}}"#;
        match parse_line(line) {
            LineOutcome::Sample(sample) => {
                assert_eq!(sample.timestamp, 1234);
                assert_eq!(sample.job_id, "true");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_missing_fields_are_skipped() {
        let cases: [(&str, SkipReason); 7] = [
            (
                r#"{"collection_id": 1, "average_usage": {"cpus": 1, "memory": 1}}"#,
                SkipReason::MissingField(START_TIME),
            ),
            (
                r#"{"start_time": 1, "average_usage": {"cpus": 1, "memory": 1}}"#,
                SkipReason::MissingField(COLLECTION_ID),
            ),
            (
                r#"{"start_time": 1, "collection_id": 1}"#,
                SkipReason::MissingField(AVERAGE_USAGE),
            ),
            (
                r#"{"start_time": 1, "collection_id": 1, "average_usage": {"memory": 1}}"#,
                SkipReason::MissingField(CPUS),
            ),
            (
                r#"{"start_time": 1, "collection_id": 1, "average_usage": {"cpus": 1}}"#,
                SkipReason::MissingField(MEMORY),
            ),
            (
                r#"{"start_time": null, "collection_id": 1, "average_usage": {"cpus": 1, "memory": 1}}"#,
                SkipReason::MissingField(START_TIME),
            ),
            (
                r#"{"start_time": 1, "collection_id": 1, "average_usage": {"cpus": null, "memory": 1}}"#,
                SkipReason::MissingField(CPUS),
            ),
        ];

        for (line, reason) in cases {
            assert_eq!(parse_line(line.as_bytes()), LineOutcome::Skipped(reason));
        }
    }

    #[test]
    fn test_invalid_fields_are_skipped() {
        let cases: [(&str, SkipReason); 7] = [
            ("", SkipReason::InvalidJson),
            ("{not json", SkipReason::InvalidJson),
            ("[1, 2, 3]", SkipReason::NotAnObject),
            (
                r#"{"start_time": "soon", "collection_id": 1, "average_usage": {"cpus": 1, "memory": 1}}"#,
                SkipReason::InvalidField(START_TIME),
            ),
            (
                r#"{"start_time": 1, "collection_id": [1], "average_usage": {"cpus": 1, "memory": 1}}"#,
                SkipReason::InvalidField(COLLECTION_ID),
            ),
            (
                r#"{"start_time": 1, "collection_id": 1, "average_usage": 3}"#,
                SkipReason::InvalidField(AVERAGE_USAGE),
            ),
            (
                r#"{"start_time": 1, "collection_id": 1, "average_usage": {"cpus": "NaN", "memory": 1}}"#,
                SkipReason::InvalidField(CPUS),
            ),
        ];

        for (line, reason) in cases {
            assert_eq!(parse_line(line.as_bytes()), LineOutcome::Skipped(reason));
        }
    }

    #[test]
    fn test_invalid_utf8_is_skipped() {
        let line = b"{\"start_time\": 1, \"collection_id\": \"\xff\xfe\"}";
        assert_eq!(parse_line(line), LineOutcome::Skipped(SkipReason::InvalidJson));
    }

    #[test]
    fn test_max_rows_limits_samples() {
        let input = (0..10)
            .map(|i| usage_line(i * 1_000_000, "a", 1.0))
            .collect::<Vec<_>>()
            .join("\n");

        let (samples, summary) = collect_samples(records(&input, 3)).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.lines_read, 3);
        assert!(summary.truncated);
    }

    #[test]
    fn test_skipped_lines_do_not_count_towards_limit() {
        let input = [
            "garbage".to_string(),
            usage_line(1, "a", 1.0),
            String::new(),
            usage_line(2, "b", 1.0),
            usage_line(3, "c", 1.0),
        ]
        .join("\r\n");

        let (samples, summary) = collect_samples(records(&input, 2)).unwrap();
        assert_eq!(
            samples.iter().map(|s| s.job_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(summary.lines_read, 4);
        assert_eq!(summary.total_skipped(), 2);
        assert_eq!(summary.skipped.get(&SkipReason::InvalidJson), Some(&2));
        assert!(summary.truncated);
    }

    #[test]
    fn test_exhausted_input_is_not_truncated() {
        let input = format!("{}\n{}\n", usage_line(1, "a", 1.0), usage_line(2, "a", 2.0));
        let (samples, summary) = collect_samples(records(&input, 100)).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(!summary.truncated);
        assert_eq!(summary.total_skipped(), 0);
    }

    #[test]
    fn test_load_usage_from_gzip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.json.gz");
        write_gzip_lines(
            &path,
            &[
                usage_line(0, "x", 1.0),
                "{}".to_string(),
                usage_line(300_000_000, "x", 2.0),
            ],
        );

        let (samples, summary) = load_usage(&path, 10).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(summary.skipped.get(&SkipReason::MissingField(START_TIME)), Some(&1));
    }

    #[test]
    fn test_load_usage_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_usage(&dir.path().join("absent.json.gz"), 10).unwrap_err();
        assert!(err.to_string().contains("Failed to open usage trace"));
    }
}
