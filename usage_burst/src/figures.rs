//! Static PNG rendering of the two figures.
//!
//! Text needs a TrueType font registered at runtime. The first readable font
//! from `USAGE_BURST_FONT` or a list of common system locations is used; when
//! none is found the charts are drawn without caption, axis labels and legend.

use std::{env, fs, ops::Range, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use plotters::{
    prelude::*,
    style::{register_font, FontStyle},
};

use crate::{
    data::ResampledSeries,
    defaults::DEFAULT_DENSITY_GRID_POINTS,
    errors::AnalysisError,
    stats::{self, Histogram},
};

const TIME_SERIES_SIZE: (u32, u32) = (1200, 500);
const DISTRIBUTION_SIZE: (u32, u32) = (1000, 600);

const SERIES_COLOR: RGBColor = RGBColor(0x1f, 0x77, 0xb4);
const HISTOGRAM_COLOR: RGBColor = RGBColor(0xff, 0x7f, 0x0e);
const HISTOGRAM_OPACITY: f64 = 0.6;
const DENSITY_COLOR: RGBColor = RGBColor(0xd6, 0x27, 0x28);

const AXIS_TICK_FORMAT: &str = "%m-%d %H:%M";
const FONT_FAMILY: &str = "sans-serif";
const FONT_ENV: &str = "USAGE_BURST_FONT";
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

static LABELS: OnceLock<bool> = OnceLock::new();

fn labels_available() -> bool {
    *LABELS.get_or_init(|| {
        let candidates = env::var(FONT_ENV)
            .ok()
            .into_iter()
            .chain(FONT_CANDIDATES.iter().map(|p| p.to_string()));
        for candidate in candidates {
            let Ok(bytes) = fs::read(&candidate) else {
                continue;
            };
            // plotters keeps registered fonts for the lifetime of the process
            let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
            if register_font(FONT_FAMILY, FontStyle::Normal, bytes).is_ok() {
                log::debug!("Using font {} for figure text", candidate);
                return true;
            }
            log::debug!("Ignoring unreadable font {}", candidate);
        }
        log::warn!(
            "No usable font found, figures are drawn without text. Set {} to a .ttf file.",
            FONT_ENV
        );
        false
    })
}

/// Value range padded by 5% above; always includes zero.
fn value_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (low, high) = values.fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if high > low {
        low..high + (high - low) * 0.05
    } else {
        low..low + 1.0
    }
}

fn tick_label(series: &ResampledSeries, x: f64) -> String {
    if x < 0.0 {
        return String::new();
    }
    series
        .buckets()
        .get(x.round() as usize)
        .map(|b| b.start.format(AXIS_TICK_FORMAT).to_string())
        .unwrap_or_default()
}

/// Draws the resampled series as a line chart over bucket start times.
pub fn draw_time_series(
    series: &ResampledSeries,
    job_id: &str,
    title: &str,
    path: &Path,
) -> Result<()> {
    let labelled = labels_available();
    let root = BitMapBackend::new(path, TIME_SERIES_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let values = series.values();
    let x_max = values.len().saturating_sub(1).max(1) as f64;
    let y_range = value_range(values.iter().copied());

    let mut builder = ChartBuilder::on(&root);
    builder.margin(20);
    if labelled {
        builder
            .caption(title, (FONT_FAMILY, 24).into_font())
            .x_label_area_size(50)
            .y_label_area_size(80);
    }
    let mut chart = builder.build_cartesian_2d(0.0..x_max, y_range)?;

    if labelled {
        chart
            .configure_mesh()
            .x_labels(8)
            .x_label_formatter(&|x| tick_label(series, *x))
            .x_desc("Time (UTC)")
            .y_desc("Normalized Compute Units (NCU)")
            .draw()?;
    }

    let line = chart.draw_series(LineSeries::new(
        values.iter().enumerate().map(|(i, v)| (i as f64, *v)),
        SERIES_COLOR.stroke_width(2),
    ))?;

    if labelled {
        line.label(format!("Job {}", job_id)).legend(|(x, y)| {
            PathElement::new(vec![(x, y), (x + 20, y)], SERIES_COLOR.stroke_width(2))
        });
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()
        .with_context(|| format!("Failed to write figure {}", path.display()))
}

/// Draws the density histogram of `values` with the kernel density overlay.
pub fn draw_distribution(values: &[f64], bins: usize, title: &str, path: &Path) -> Result<()> {
    let hist = Histogram::compute(values, bins).ok_or(AnalysisError::EmptySeries)?;
    let curve = stats::gaussian_kde(values, DEFAULT_DENSITY_GRID_POINTS);

    let labelled = labels_available();
    let root = BitMapBackend::new(path, DISTRIBUTION_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let y_range = value_range(
        hist.densities
            .iter()
            .chain(curve.iter().flat_map(|c| c.density.iter()))
            .copied(),
    );

    let mut builder = ChartBuilder::on(&root);
    builder.margin(20);
    if labelled {
        builder
            .caption(title, (FONT_FAMILY, 24).into_font())
            .x_label_area_size(50)
            .y_label_area_size(80);
    }
    let mut chart = builder.build_cartesian_2d(hist.low()..hist.high(), y_range)?;

    if labelled {
        chart
            .configure_mesh()
            .x_desc("CPU Usage (NCU)")
            .y_desc("Density")
            .draw()?;
    }

    let bar_style = HISTOGRAM_COLOR.mix(HISTOGRAM_OPACITY).filled();
    let bars = chart.draw_series(
        hist.edges
            .windows(2)
            .zip(&hist.densities)
            .map(|(edge, density)| Rectangle::new([(edge[0], 0.0), (edge[1], *density)], bar_style)),
    )?;
    if labelled {
        bars.label("Histogram")
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], bar_style));
    }

    match curve {
        Some(curve) => {
            let density = chart.draw_series(LineSeries::new(
                curve.x.iter().copied().zip(curve.density.iter().copied()),
                DENSITY_COLOR.stroke_width(2),
            ))?;
            if labelled {
                density.label("Kernel density").legend(|(x, y)| {
                    PathElement::new(vec![(x, y), (x + 20, y)], DENSITY_COLOR.stroke_width(2))
                });
            }
        }
        None => log::debug!("No spread in the series, skipping density curve"),
    }

    if labelled {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()
        .with_context(|| format!("Failed to write figure {}", path.display()))
}
