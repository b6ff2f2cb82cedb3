use std::f64::consts::PI;
use std::fmt::Display;

use anyhow::Result;
use average::{self, concatenate, Estimate, Max, Mean, Variance};
use readable::num::*;

use crate::errors::AnalysisError;

concatenate!(SeriesStats, [Mean, mean], [Max, max]);

/// Burstiness summary of a resampled series.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadStats {
    pub peak: f64,
    pub mean: f64,
    /// `None` when the mean is zero
    pub peak_to_mean_ratio: Option<f64>,
    pub buckets: usize,
    pub idle_buckets: usize,
}

/// Computes peak, mean (zero-filled buckets included) and their ratio.
pub fn workload_stats(values: &[f64]) -> Result<WorkloadStats> {
    if values.is_empty() {
        return Err(AnalysisError::EmptySeries.into());
    }

    let s: SeriesStats = values.iter().copied().collect();
    let peak = s.max();
    let mean = s.mean();
    let peak_to_mean_ratio = if mean == 0.0 {
        None
    } else {
        Some(peak / mean)
    };

    Ok(WorkloadStats {
        peak,
        mean,
        peak_to_mean_ratio,
        buckets: values.len(),
        idle_buckets: values.iter().filter(|v| **v == 0.0).count(),
    })
}

impl WorkloadStats {
    pub fn ratio_display(&self) -> String {
        match self.peak_to_mean_ratio {
            Some(ratio) => format!("{:.2}", ratio),
            None => "undefined".to_string(),
        }
    }
}

impl Display for WorkloadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Peak CPU: {:.4}", self.peak)?;
        writeln!(f, "Mean CPU: {:.4}", self.mean)?;
        match self.peak_to_mean_ratio {
            Some(ratio) => writeln!(f, "Peak-to-Mean Ratio: {:.2} (High ratio = Bursty)", ratio)?,
            None => writeln!(f, "Peak-to-Mean Ratio: undefined (mean is zero)")?,
        }
        write!(
            f,
            "Buckets: {} ({} idle)",
            Unsigned::from(self.buckets),
            Unsigned::from(self.idle_buckets)
        )
    }
}

/// Equal width histogram normalized to a probability density.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// `bins + 1` ascending bin edges
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
    pub densities: Vec<f64>,
}

impl Histogram {
    /// Bins `values` between their minimum and maximum; the last bin is
    /// closed on the right. A series without spread gets a unit wide range
    /// centered on its value.
    pub fn compute(values: &[f64], bins: usize) -> Option<Histogram> {
        if values.is_empty() || bins == 0 {
            return None;
        }

        let (min, max) = min_max(values);
        let (low, high) = if min == max {
            (min - 0.5, max + 0.5)
        } else {
            (min, max)
        };
        let width = (high - low) / bins as f64;

        let mut counts = vec![0; bins];
        for v in values {
            let index = (((v - low) / width).floor() as usize).min(bins - 1);
            counts[index] += 1;
        }

        let norm = values.len() as f64 * width;
        let densities = counts.iter().map(|c| *c as f64 / norm).collect();
        let edges = (0..=bins).map(|i| low + width * i as f64).collect();

        Some(Histogram {
            edges,
            counts,
            densities,
        })
    }

    pub fn bin_width(&self) -> f64 {
        self.edges[1] - self.edges[0]
    }

    /// Midpoint of every bin, in bin order.
    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|e| (e[0] + e[1]) / 2.0).collect()
    }

    pub fn low(&self) -> f64 {
        self.edges[0]
    }

    pub fn high(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }
}

/// Gaussian kernel density estimate evaluated on an even grid.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityCurve {
    pub x: Vec<f64>,
    pub density: Vec<f64>,
    pub bandwidth: f64,
}

/// Estimates the density of `values` with a Gaussian kernel and Scott's
/// bandwidth, evaluated at `points` positions between the minimum and
/// maximum value. Returns `None` for fewer than two values or no spread.
pub fn gaussian_kde(values: &[f64], points: usize) -> Option<DensityCurve> {
    if values.len() < 2 || points < 2 {
        return None;
    }

    let variance: Variance = values.iter().copied().collect();
    let n = values.len() as f64;
    let bandwidth = variance.sample_variance().sqrt() * n.powf(-0.2);
    if !bandwidth.is_finite() || bandwidth <= 0.0 {
        return None;
    }

    let (min, max) = min_max(values);
    let step = (max - min) / (points - 1) as f64;
    let norm = n * bandwidth * (2.0 * PI).sqrt();

    let x: Vec<f64> = (0..points).map(|i| min + step * i as f64).collect();
    let density = x
        .iter()
        .map(|xi| {
            values
                .iter()
                .map(|v| {
                    let z = (xi - v) / bandwidth;
                    (-0.5 * z * z).exp()
                })
                .sum::<f64>()
                / norm
        })
        .collect();

    Some(DensityCurve {
        x,
        density,
        bandwidth,
    })
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        })
}
