pub mod analysis;
pub mod cli;
pub mod config;
pub mod data;
pub mod defaults;
pub mod errors;
pub mod figures;
pub mod loader;
pub mod persist;
pub mod reporting;
pub mod resample;
pub mod selection;
pub mod stats;

// Test helpers module - made public for use in unit tests, integration tests, and benchmarks
// This is conditionally compiled to avoid including test code in release builds
#[doc(hidden)]
#[cfg(any(test, doctest, feature = "test-helpers"))]
pub mod test_helpers;
