use anyhow::{bail, Context, Result};
use chrono::TimeDelta;
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;
use std::{
    env,
    path::{Path, PathBuf},
};

use crate::{
    defaults::{
        default_bucket_width, DEFAULT_DISTRIBUTION_FIGURE, DEFAULT_HISTOGRAM_BINS,
        DEFAULT_INPUT_PATH, DEFAULT_MAX_ROWS, DEFAULT_OUTPUT_CSV, DEFAULT_TIME_SERIES_FIGURE,
    },
    reporting::{DisplayMode, FigurePaths},
    resample::BucketAggregation,
    selection::TieBreak,
};

const LOCAL_CONFIG_FILE: &str = ".usageburstconfig";
const APP_DIR: &str = "usage-burst";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InputSettings {
    path: Option<PathBuf>,
    max_rows: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SelectionSettings {
    tie_break: Option<TieBreak>,
    job: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResampleSettings {
    bucket_minutes: Option<u32>,
    aggregation: Option<BucketAggregation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OutputSettings {
    csv: Option<PathBuf>,
    time_series: Option<PathBuf>,
    distribution: Option<PathBuf>,
    html: Option<bool>,
    histogram_bins: Option<u16>,
}

/// Settings as read from the config files; every value is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    input: InputSettings,
    selection: SelectionSettings,
    resample: ResampleSettings,
    output: OutputSettings,
}

/// Values given on the command line. They take precedence over every file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub input: Option<PathBuf>,
    pub max_rows: Option<u64>,
    pub tie_break: Option<TieBreak>,
    pub job: Option<String>,
    pub bucket_minutes: Option<u32>,
    pub aggregation: Option<BucketAggregation>,
    pub csv: Option<PathBuf>,
    pub time_series: Option<PathBuf>,
    pub distribution: Option<PathBuf>,
    pub histogram_bins: Option<u16>,
    pub html: bool,
    pub show: bool,
}

/// Fully resolved parameters of one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub input: PathBuf,
    pub max_rows: u64,
    pub tie_break: TieBreak,
    /// Analyze this job instead of the most sampled one
    pub job: Option<String>,
    pub bucket_width: TimeDelta,
    pub aggregation: BucketAggregation,
    pub csv: PathBuf,
    pub figures: FigurePaths,
    pub histogram_bins: usize,
    pub display: DisplayMode,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            input: PathBuf::from(DEFAULT_INPUT_PATH),
            max_rows: DEFAULT_MAX_ROWS,
            tie_break: TieBreak::default(),
            job: None,
            bucket_width: default_bucket_width(),
            aggregation: BucketAggregation::default(),
            csv: PathBuf::from(DEFAULT_OUTPUT_CSV),
            figures: FigurePaths {
                time_series: PathBuf::from(DEFAULT_TIME_SERIES_FIGURE),
                distribution: PathBuf::from(DEFAULT_DISTRIBUTION_FIGURE),
                html: false,
            },
            histogram_bins: DEFAULT_HISTOGRAM_BINS.into(),
            display: DisplayMode::FileOnly,
        }
    }
}

impl AnalysisConfig {
    /// Layers command line overrides over file settings over the defaults.
    pub fn resolve(settings: Settings, overrides: ConfigOverrides) -> Result<AnalysisConfig> {
        let defaults = AnalysisConfig::default();

        let max_rows = overrides
            .max_rows
            .or(settings.input.max_rows)
            .unwrap_or(defaults.max_rows);
        if max_rows == 0 {
            bail!("max_rows must be at least 1");
        }

        let bucket_width = match overrides
            .bucket_minutes
            .or(settings.resample.bucket_minutes)
        {
            Some(0) => bail!("bucket_minutes must be at least 1"),
            Some(minutes) => TimeDelta::minutes(minutes.into()),
            None => defaults.bucket_width,
        };

        let histogram_bins = match overrides
            .histogram_bins
            .or(settings.output.histogram_bins)
        {
            Some(0) => bail!("histogram_bins must be at least 1"),
            Some(bins) => bins.into(),
            None => defaults.histogram_bins,
        };

        Ok(AnalysisConfig {
            input: overrides
                .input
                .or(settings.input.path)
                .unwrap_or(defaults.input),
            max_rows,
            tie_break: overrides
                .tie_break
                .or(settings.selection.tie_break)
                .unwrap_or(defaults.tie_break),
            job: overrides.job.or(settings.selection.job),
            bucket_width,
            aggregation: overrides
                .aggregation
                .or(settings.resample.aggregation)
                .unwrap_or(defaults.aggregation),
            csv: overrides
                .csv
                .or(settings.output.csv)
                .unwrap_or(defaults.csv),
            figures: FigurePaths {
                time_series: overrides
                    .time_series
                    .or(settings.output.time_series)
                    .unwrap_or(defaults.figures.time_series),
                distribution: overrides
                    .distribution
                    .or(settings.output.distribution)
                    .unwrap_or(defaults.figures.distribution),
                html: overrides.html
                    || settings.output.html.unwrap_or(defaults.figures.html),
            },
            histogram_bins,
            display: DisplayMode::from(overrides.show),
        })
    }
}

/// User wide config file (XDG_CONFIG_HOME or ~/.config/usage-burst/config.toml)
fn user_config_path() -> Option<PathBuf> {
    if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
        return Some(
            Path::new(&xdg_config_home)
                .join(APP_DIR)
                .join("config.toml"),
        );
    }
    dirs_next::home_dir().map(|home| home.join(".config").join(APP_DIR).join("config.toml"))
}

/// Searches `start` and its ancestors for a local config file.
fn find_local_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(LOCAL_CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

/// Builds the layered config; later sources override earlier ones. Only an
/// explicitly requested file must exist.
fn build_config(
    user: Option<PathBuf>,
    local: Option<PathBuf>,
    explicit: Option<&Path>,
) -> Result<Config, ConfigError> {
    let mut builder = Config::builder();

    if let Some(user) = user {
        builder = builder.add_source(File::from(user).format(FileFormat::Toml).required(false));
    }

    match explicit {
        Some(path) => {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        None => {
            if let Some(local) = local {
                builder =
                    builder.add_source(File::from(local).format(FileFormat::Toml).required(false));
            }
        }
    }

    builder.build()
}

/// Read hierarchical configuration (user config -> local or explicit override)
pub fn read_hierarchical_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let local = match explicit {
        Some(_) => None,
        None => env::current_dir()
            .ok()
            .and_then(|dir| find_local_config(&dir)),
    };
    build_config(user_config_path(), local, explicit)
}

fn settings_from(config: Config) -> Result<Settings> {
    config
        .try_deserialize()
        .context("Invalid configuration")
}

/// Resolves the configuration of an analysis run from all layers.
pub fn load_analysis_config(
    explicit: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<AnalysisConfig> {
    let config = read_hierarchical_config(explicit).context("Failed to read configuration")?;
    AnalysisConfig::resolve(settings_from(config)?, overrides)
}
