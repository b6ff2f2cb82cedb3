//! Centralized default values for usage-burst configuration.
//!
//! This module defines all default values used throughout the application
//! to avoid magic numbers scattered in the codebase. These defaults are used
//! as fallback values when neither the CLI nor a configuration file provides
//! a setting.

use chrono::TimeDelta;

// ============================================================================
// Input Defaults
// ============================================================================

/// Default usage trace read by `analyze`.
pub const DEFAULT_INPUT_PATH: &str = "instance_usage-000000000000.json.gz";

/// Default maximum number of valid samples taken from the trace.
///
/// Reading stops as soon as this many samples have been parsed, even if the
/// trace holds more lines. Skipped lines do not count towards this limit.
pub const DEFAULT_MAX_ROWS: u64 = 500_000;

// ============================================================================
// Resampling Defaults
// ============================================================================

/// Default width of a resampling bucket in minutes.
pub const DEFAULT_BUCKET_MINUTES: u32 = 5;

/// Upper bound on the number of buckets a single series may span.
///
/// A trace whose selected job spans a longer period than
/// `MAX_BUCKETS * bucket width` is rejected instead of allocating a huge,
/// mostly zero-filled series.
pub const MAX_BUCKETS: usize = 10_000_000;

// ============================================================================
// Output Defaults
// ============================================================================

/// Default CSV file receiving the resampled series.
pub const DEFAULT_OUTPUT_CSV: &str = "cleaned_usage.csv";

/// Default file of the time series figure.
pub const DEFAULT_TIME_SERIES_FIGURE: &str = "Figure1_TimeSeries.png";

/// Default file of the distribution figure.
pub const DEFAULT_DISTRIBUTION_FIGURE: &str = "Figure2_Distribution.png";

/// Default number of histogram bins in the distribution figure.
pub const DEFAULT_HISTOGRAM_BINS: u16 = 40;

/// Number of points at which the density curve is evaluated.
pub const DEFAULT_DENSITY_GRID_POINTS: usize = 200;

// ============================================================================
// Helper Functions
// ============================================================================

/// Returns the default bucket width.
#[inline]
pub fn default_bucket_width() -> TimeDelta {
    TimeDelta::minutes(DEFAULT_BUCKET_MINUTES.into())
}
