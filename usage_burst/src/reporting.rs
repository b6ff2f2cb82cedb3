use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use plotly::{
    common::{Line, Marker, Mode, Title},
    layout::{Axis, AxisType, Legend},
    Bar, Configuration, Layout, Plot, Scatter,
};

use crate::{
    data::ResampledSeries,
    defaults::DEFAULT_DENSITY_GRID_POINTS,
    figures,
    stats::{self, WorkloadStats},
};

const DISTRIBUTION_TITLE: &str = "Probability Distribution of CPU Usage (Evidence of Heavy-Tail)";

const SERIES_LINE_COLOR: &str = "#1f77b4";
const SERIES_LINE_WIDTH: f64 = 1.5;
const HISTOGRAM_COLOR: &str = "#ff7f0e";
const HISTOGRAM_OPACITY: f64 = 0.6;
const DENSITY_LINE_COLOR: &str = "#d62728";
const DENSITY_LINE_WIDTH: f64 = 2.0;

const X_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const AXIS_TICK_FORMAT: &str = "%m-%d %H:%M";

const DEFAULT_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{{TITLE}}</title>
    {{PLOTLY_HEAD}}
</head>
<body>
    {{PLOTLY_BODY}}
</body>
</html>"#;

/// Whether rendered figures are only written or also opened for viewing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    FileOnly,
    Interactive,
}

impl From<bool> for DisplayMode {
    fn from(show: bool) -> Self {
        if show {
            DisplayMode::Interactive
        } else {
            DisplayMode::FileOnly
        }
    }
}

/// Where the PNG figures go.
#[derive(Debug, Clone, PartialEq)]
pub struct FigurePaths {
    pub time_series: PathBuf,
    pub distribution: PathBuf,
    /// Also write an interactive HTML copy next to each PNG
    pub html: bool,
}

fn new_plot() -> Plot {
    let mut plot = Plot::new();
    plot.set_configuration(Configuration::default().responsive(true).fill_frame(false));
    plot
}

fn time_series_title(job_id: &str, stats: &WorkloadStats) -> String {
    format!(
        "CPU Usage of Job {} (Peak-to-Mean Ratio: {})",
        job_id,
        stats.ratio_display()
    )
}

/// Line chart of the resampled series over time.
pub fn time_series_plot(series: &ResampledSeries, job_id: &str, stats: &WorkloadStats) -> Plot {
    let (x, y): (Vec<String>, Vec<f64>) = series
        .buckets()
        .iter()
        .map(|b| (b.start.format(X_TIME_FORMAT).to_string(), b.value))
        .unzip();

    let trace = Scatter::new(x, y)
        .mode(Mode::Lines)
        .name(format!("Job {}", job_id))
        .line(Line::new().color(SERIES_LINE_COLOR).width(SERIES_LINE_WIDTH));

    let layout = Layout::new()
        .title(Title::from(time_series_title(job_id, stats).as_str()))
        .x_axis(
            Axis::new()
                .title(Title::from("Time (UTC)"))
                .type_(AxisType::Date)
                .tick_format(AXIS_TICK_FORMAT)
                .show_grid(true),
        )
        .y_axis(
            Axis::new()
                .title(Title::from("Normalized Compute Units (NCU)"))
                .show_grid(true),
        )
        .show_legend(true)
        .legend(Legend::new());

    let mut plot = new_plot();
    plot.add_trace(trace);
    plot.set_layout(layout);
    plot
}

/// Density histogram of the bucket values with a kernel density overlay.
pub fn distribution_plot(values: &[f64], bins: usize) -> Plot {
    let mut plot = new_plot();

    if let Some(hist) = stats::Histogram::compute(values, bins) {
        let trace = Bar::new(hist.centers(), hist.densities)
            .name("Histogram")
            .opacity(HISTOGRAM_OPACITY)
            .marker(Marker::new().color(HISTOGRAM_COLOR));
        plot.add_trace(trace);
    }

    match stats::gaussian_kde(values, DEFAULT_DENSITY_GRID_POINTS) {
        Some(curve) => {
            let trace = Scatter::new(curve.x, curve.density)
                .mode(Mode::Lines)
                .name("Kernel density")
                .line(Line::new().color(DENSITY_LINE_COLOR).width(DENSITY_LINE_WIDTH));
            plot.add_trace(trace);
        }
        None => log::debug!("No spread in the series, skipping density curve"),
    }

    // Adjacent bars without gaps span exactly one bin each
    let layout = Layout::new()
        .title(Title::from(DISTRIBUTION_TITLE))
        .bar_gap(0.0)
        .x_axis(Axis::new().title(Title::from("CPU Usage (NCU)")).show_grid(true))
        .y_axis(Axis::new().title(Title::from("Density")).show_grid(true));
    plot.set_layout(layout);
    plot
}

fn render_html(plot: &Plot, title: &str) -> Vec<u8> {
    DEFAULT_HTML_TEMPLATE
        .replace("{{TITLE}}", title)
        .replace("{{PLOTLY_HEAD}}", &Plot::online_cdn_js())
        .replace("{{PLOTLY_BODY}}", &plot.to_inline_html(None))
        .into_bytes()
}

/// Writes `plot` as a standalone HTML document, replacing `path`.
pub fn write_figure(plot: &Plot, title: &str, path: &Path) -> Result<()> {
    let bytes = render_html(plot, title);
    File::create(path)
        .and_then(|mut f| f.write_all(&bytes))
        .with_context(|| format!("Failed to write figure {}", path.display()))
}

/// Writes both figures as PNG to `paths`, plus HTML copies when requested,
/// and in interactive mode opens them in the browser.
pub fn render_figures(
    series: &ResampledSeries,
    job_id: &str,
    stats: &WorkloadStats,
    bins: usize,
    paths: &FigurePaths,
    mode: DisplayMode,
) -> Result<()> {
    let values = series.values();
    let ts_title = time_series_title(job_id, stats);

    figures::draw_time_series(series, job_id, &ts_title, &paths.time_series)?;
    log::info!("Wrote {}", paths.time_series.display());
    figures::draw_distribution(&values, bins, DISTRIBUTION_TITLE, &paths.distribution)?;
    log::info!("Wrote {}", paths.distribution.display());

    if !paths.html && mode == DisplayMode::FileOnly {
        return Ok(());
    }

    let interactive = [
        (
            time_series_plot(series, job_id, stats),
            ts_title,
            &paths.time_series,
        ),
        (
            distribution_plot(&values, bins),
            DISTRIBUTION_TITLE.to_string(),
            &paths.distribution,
        ),
    ];
    for (plot, title, path) in &interactive {
        if paths.html {
            let html_path = path.with_extension("html");
            write_figure(plot, title, &html_path)?;
            log::info!("Wrote {}", html_path.display());
        }
        if mode == DisplayMode::Interactive {
            plot.show();
        }
    }

    Ok(())
}
