use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{data::ResampledSeries, defaults::default_bucket_width, errors::AnalysisError};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One CSV row: bucket start and aggregated CPU usage.
#[derive(Debug, Serialize, Deserialize)]
struct SeriesRow {
    time: String,
    cpu_usage: f64,
}

/// Writes the series as `time,cpu_usage` CSV, replacing any existing file.
pub fn write_series(series: &ResampledSeries, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    for bucket in series.buckets() {
        writer
            .serialize(SeriesRow {
                time: bucket.start.format(TIME_FORMAT).to_string(),
                cpu_usage: bucket.value,
            })
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Reads a series previously written by [`write_series`].
///
/// The bucket width is inferred from the first two rows; a single row series
/// gets the default width. Rows must be evenly spaced.
pub fn read_series(path: &Path) -> Result<ResampledSeries> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut starts: Vec<DateTime<Utc>> = Vec::new();
    let mut values = Vec::new();
    for (index, row) in reader.deserialize::<SeriesRow>().enumerate() {
        let row = row.with_context(|| format!("Invalid row {} in {}", index + 1, path.display()))?;
        let start = NaiveDateTime::parse_from_str(&row.time, TIME_FORMAT)
            .with_context(|| format!("Invalid time '{}' in row {}", row.time, index + 1))?
            .and_utc();
        starts.push(start);
        values.push(row.cpu_usage);
    }

    let width = match starts.as_slice() {
        [first, second, ..] => *second - *first,
        _ => default_bucket_width(),
    };
    check_spacing(&starts, width)?;

    let first_start = starts.first().copied().unwrap_or(DateTime::UNIX_EPOCH);
    Ok(ResampledSeries::from_values(first_start, width, values))
}

fn check_spacing(starts: &[DateTime<Utc>], width: TimeDelta) -> Result<()> {
    for (row, pair) in starts.windows(2).enumerate() {
        if width <= TimeDelta::zero() || pair[1] - pair[0] != width {
            return Err(AnalysisError::UnevenSeries { row: row + 2, width }.into());
        }
    }
    Ok(())
}
