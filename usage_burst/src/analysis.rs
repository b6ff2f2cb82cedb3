use std::path::Path;

use anyhow::Result;
use readable::num::*;
use sparklines::spark;

use crate::{
    config::AnalysisConfig,
    data::ResampledSeries,
    loader::{load_usage, LoadSummary},
    persist::{read_series, write_series},
    reporting::render_figures,
    resample::resample,
    selection::{samples_of_job, select_dominant_job, select_pinned_job, JobSelection},
    stats::{workload_stats, WorkloadStats},
};

const SPARKLINE_WIDTH: usize = 80;

/// Everything an analysis run produced, for callers that want more than the
/// console report.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub load: LoadSummary,
    pub selection: JobSelection,
    pub series: ResampledSeries,
    pub stats: WorkloadStats,
}

/// Runs the whole pipeline: load, select, resample, persist, report, render.
pub fn analyze(config: &AnalysisConfig) -> Result<AnalysisReport> {
    println!(
        "Loading up to {} samples from {}...",
        Unsigned::from(config.max_rows),
        config.input.display()
    );
    let (samples, load) = load_usage(&config.input, config.max_rows)?;
    print_load_summary(&load);

    let selection = match &config.job {
        Some(job_id) => select_pinned_job(&samples, job_id)?,
        None => select_dominant_job(&samples, config.tie_break)?,
    };
    println!(
        "Selected job {} ({} of {} samples, {} distinct jobs)",
        selection.job_id,
        Unsigned::from(selection.sample_count),
        Unsigned::from(samples.len()),
        Unsigned::from(selection.distinct_jobs)
    );

    let job_samples = samples_of_job(&samples, &selection.job_id);
    drop(samples);

    println!(
        "Resampling into {} minute buckets...",
        config.bucket_width.num_minutes()
    );
    let series = resample(&job_samples, config.bucket_width, config.aggregation)?;

    write_series(&series, &config.csv)?;
    println!("Wrote {}", config.csv.display());

    let stats = workload_stats(&series.values())?;
    print_stats(&series, &stats);

    render_figures(
        &series,
        &selection.job_id,
        &stats,
        config.histogram_bins,
        &config.figures,
        config.display,
    )?;
    println!(
        "Wrote {} and {}",
        config.figures.time_series.display(),
        config.figures.distribution.display()
    );

    Ok(AnalysisReport {
        load,
        selection,
        series,
        stats,
    })
}

/// Reports the statistics of a series persisted by an earlier run.
pub fn report_persisted(path: &Path) -> Result<WorkloadStats> {
    let series = read_series(path)?;
    let stats = workload_stats(&series.values())?;
    print_stats(&series, &stats);
    Ok(stats)
}

fn print_load_summary(load: &LoadSummary) {
    println!(
        "Read {} lines: {} samples, {} skipped",
        Unsigned::from(load.lines_read),
        Unsigned::from(load.samples),
        Unsigned::from(load.total_skipped())
    );
    for (reason, count) in &load.skipped {
        println!("  {}: {}", reason, Unsigned::from(*count));
    }
    if load.truncated {
        log::warn!(
            "Stopped after {} samples, the rest of the trace was not read",
            load.samples
        );
    }
}

fn print_stats(series: &ResampledSeries, stats: &WorkloadStats) {
    println!("{}", stats);
    println!("{}", spark(&overview(&series.values(), SPARKLINE_WIDTH)));
}

/// Reduces `values` to at most `width` points by taking the maximum of
/// consecutive chunks, so short peaks stay visible.
fn overview(values: &[f64], width: usize) -> Vec<f64> {
    if width == 0 || values.len() <= width {
        return values.to_vec();
    }
    let chunk = values.len().div_ceil(width);
    values
        .chunks(chunk)
        .map(|c| c.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        reporting::{DisplayMode, FigurePaths},
        test_helpers::{dir_with_trace, sample_trace_lines, usage_line},
    };
    use std::fs;

    fn config_in(dir: &Path, input: &Path) -> AnalysisConfig {
        AnalysisConfig {
            input: input.to_path_buf(),
            csv: dir.join("series.csv"),
            figures: FigurePaths {
                time_series: dir.join("ts.png"),
                distribution: dir.join("dist.png"),
                html: false,
            },
            display: DisplayMode::FileOnly,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_analyze_sample_trace() {
        let (dir, trace) = dir_with_trace(&sample_trace_lines());
        let config = config_in(dir.path(), &trace);

        let report = analyze(&config).unwrap();

        assert_eq!(report.load.samples, 35);
        assert_eq!(report.load.total_skipped(), 2);
        assert_eq!(report.selection.job_id, "busy");
        assert_eq!(report.selection.sample_count, 30);
        assert_eq!(report.selection.distinct_jobs, 2);
        assert_eq!(report.load.lines_read, 37);
        // 30 one minute samples starting on a bucket boundary
        assert_eq!(report.series.values(), vec![2.5, 2.5, 13.0, 2.5, 2.5, 2.5]);
        assert_eq!(report.stats.peak, 13.0);
        assert!(config.csv.is_file());
        for figure in [&config.figures.time_series, &config.figures.distribution] {
            assert!(fs::read(figure).unwrap().starts_with(b"\x89PNG\r\n\x1a\n"));
        }
    }

    #[test]
    fn test_analyze_pinned_job() {
        let (dir, trace) = dir_with_trace(&sample_trace_lines());
        let config = AnalysisConfig {
            job: Some("idle".to_string()),
            ..config_in(dir.path(), &trace)
        };

        let report = analyze(&config).unwrap();
        assert_eq!(report.selection.job_id, "idle");
        // Samples every 7 minutes over 28 minutes leave one empty bucket
        assert_eq!(report.series.len(), 6);
        assert_eq!(report.stats.idle_buckets, 1);
    }

    #[test]
    fn test_analyze_unknown_job_fails() {
        let (dir, trace) = dir_with_trace(&sample_trace_lines());
        let config = AnalysisConfig {
            job: Some("missing".to_string()),
            ..config_in(dir.path(), &trace)
        };
        assert!(analyze(&config).is_err());
        assert!(!dir.path().join("series.csv").exists());
    }

    #[test]
    fn test_analyze_without_valid_lines_fails() {
        let (dir, trace) = dir_with_trace(&["garbage".to_string(), String::new()]);
        let config = config_in(dir.path(), &trace);
        assert!(analyze(&config).is_err());
    }

    #[test]
    fn test_analyze_missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &dir.path().join("absent.json.gz"));
        assert!(analyze(&config).is_err());
    }

    #[test]
    fn test_report_persisted() {
        let (dir, trace) = dir_with_trace(&[
            usage_line(0, "a", 1.0),
            usage_line(600_000_000, "a", 5.0),
        ]);
        let config = config_in(dir.path(), &trace);
        let report = analyze(&config).unwrap();

        let stats = report_persisted(&config.csv).unwrap();
        assert_eq!(stats, report.stats);
        assert_eq!(stats.peak_to_mean_ratio, Some(2.5));
        fs::remove_file(&config.csv).unwrap();
        assert!(report_persisted(&config.csv).is_err());
    }

    #[test]
    fn test_overview() {
        let values: Vec<f64> = (0..10).map(f64::from).collect();
        assert_eq!(overview(&values, 20), values);
        assert_eq!(overview(&values, 5), vec![1.0, 3.0, 5.0, 7.0, 9.0]);
        assert_eq!(overview(&values, 3), vec![3.0, 7.0, 9.0]);
        assert!(overview(&[], 3).is_empty());
    }
}
