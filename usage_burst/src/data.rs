use chrono::{DateTime, TimeDelta, Utc};

/// One resource usage sample of a job, as read from a single trace line.
#[derive(Debug, PartialEq, Clone)]
pub struct UsageSample {
    /// Microseconds since the unix epoch
    pub timestamp: i64,
    pub job_id: String,
    pub cpu_usage: f64,
    pub mem_usage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub value: f64,
}

/// A job's usage aggregated into contiguous, equally wide time buckets.
///
/// Bucket starts are strictly increasing and exactly `width` apart.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledSeries {
    width: TimeDelta,
    buckets: Vec<Bucket>,
}

impl ResampledSeries {
    /// Builds a series from a first bucket start and the per-bucket values.
    pub fn from_values(first_start: DateTime<Utc>, width: TimeDelta, values: Vec<f64>) -> Self {
        let buckets = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| Bucket {
                start: first_start + width * i as i32,
                value,
            })
            .collect();
        ResampledSeries { width, buckets }
    }

    pub fn width(&self) -> TimeDelta {
        self.width
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn values(&self) -> Vec<f64> {
        self.buckets.iter().map(|b| b.value).collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
