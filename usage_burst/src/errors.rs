use chrono::TimeDelta;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("No usable samples found in the usage trace.")]
    NoSamples,

    #[error("Job {job_id} has no samples in the loaded trace.")]
    JobNotFound { job_id: String },

    #[error("The resampled series is empty, no statistics can be computed.")]
    EmptySeries,

    #[error("Bucket width must be positive, got {width}.")]
    InvalidBucketWidth { width: TimeDelta },

    #[error("Timestamp {timestamp} is out of the representable time range.")]
    TimestampOutOfRange { timestamp: i64 },

    #[error("The samples span {buckets} buckets, more than the supported {limit}.")]
    TooManyBuckets { buckets: u64, limit: usize },

    #[error("Row {row} of the series is not {width} after its predecessor.")]
    UnevenSeries { row: usize, width: TimeDelta },
}
