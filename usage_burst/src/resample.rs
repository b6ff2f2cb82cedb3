//! Aggregation of irregular usage samples into contiguous, fixed width
//! time buckets.
//!
//! Buckets are aligned to the unix epoch: a sample at `t` falls into the
//! bucket starting at `floor(t / width) * width`. The series spans every
//! bucket from the one holding the earliest sample to the one holding the
//! latest; buckets without samples are filled with zero.

use anyhow::Result;
use average::{concatenate, Estimate, Max, Mean};
use chrono::{DateTime, TimeDelta};
use itertools::Itertools;
use serde::Deserialize;

use crate::{
    data::{ResampledSeries, UsageSample},
    defaults::MAX_BUCKETS,
    errors::AnalysisError,
};

/// How the samples falling into one bucket are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketAggregation {
    #[default]
    Sum,
    Mean,
    Max,
}

impl From<usage_burst_cli_types::BucketAggregation> for BucketAggregation {
    fn from(value: usage_burst_cli_types::BucketAggregation) -> Self {
        match value {
            usage_burst_cli_types::BucketAggregation::Sum => BucketAggregation::Sum,
            usage_burst_cli_types::BucketAggregation::Mean => BucketAggregation::Mean,
            usage_burst_cli_types::BucketAggregation::Max => BucketAggregation::Max,
        }
    }
}

concatenate!(BucketStats, [Mean, mean], [Max, max]);

struct BucketAccumulator {
    sum: f64,
    stats: BucketStats,
}

impl BucketAccumulator {
    fn new() -> Self {
        BucketAccumulator {
            sum: 0.0,
            stats: BucketStats::new(),
        }
    }

    fn add(&mut self, value: f64) {
        self.sum += value;
        self.stats.add(value);
    }

    fn value(&self, aggregation: BucketAggregation) -> f64 {
        if self.stats.mean.is_empty() {
            return 0.0;
        }
        match aggregation {
            BucketAggregation::Sum => self.sum,
            BucketAggregation::Mean => self.stats.mean(),
            BucketAggregation::Max => self.stats.max(),
        }
    }
}

/// Index of the epoch aligned bucket holding `timestamp` (microseconds).
pub fn bucket_index(timestamp: i64, width_micros: i64) -> i64 {
    timestamp.div_euclid(width_micros)
}

/// Resamples the CPU usage of `samples` into buckets of `width`.
///
/// The samples need not be sorted. Fails on empty input, on a non-positive
/// width and when the samples span more than [`MAX_BUCKETS`] buckets.
pub fn resample(
    samples: &[UsageSample],
    width: TimeDelta,
    aggregation: BucketAggregation,
) -> Result<ResampledSeries> {
    let width_micros = width
        .num_microseconds()
        .filter(|w| *w > 0)
        .ok_or(AnalysisError::InvalidBucketWidth { width })?;

    let (first, last) = samples
        .iter()
        .map(|s| s.timestamp)
        .minmax()
        .into_option()
        .ok_or(AnalysisError::NoSamples)?;

    let first_bucket = bucket_index(first, width_micros);
    let last_bucket = bucket_index(last, width_micros);
    // Both indices are bounded by i64::MAX / width, so the span cannot overflow i128
    let span = (last_bucket as i128 - first_bucket as i128 + 1) as u64;
    if span > MAX_BUCKETS as u64 {
        return Err(AnalysisError::TooManyBuckets {
            buckets: span,
            limit: MAX_BUCKETS,
        }
        .into());
    }

    let first_start = first_bucket
        .checked_mul(width_micros)
        .and_then(DateTime::from_timestamp_micros)
        .ok_or(AnalysisError::TimestampOutOfRange { timestamp: first })?;

    let mut accumulators: Vec<BucketAccumulator> =
        (0..span).map(|_| BucketAccumulator::new()).collect();
    for sample in samples {
        let index = (bucket_index(sample.timestamp, width_micros) - first_bucket) as usize;
        accumulators[index].add(sample.cpu_usage);
    }

    let values = accumulators
        .iter()
        .map(|acc| acc.value(aggregation))
        .collect_vec();

    log::debug!(
        "Resampled {} samples into {} buckets of {} s",
        samples.len(),
        values.len(),
        width.num_seconds()
    );

    Ok(ResampledSeries::from_values(first_start, width, values))
}
