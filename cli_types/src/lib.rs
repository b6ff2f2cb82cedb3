use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

/// How the samples falling into one time bucket are combined.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum BucketAggregation {
    Sum,
    Mean,
    Max,
}

impl FromStr for BucketAggregation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(BucketAggregation::Sum),
            "mean" => Ok(BucketAggregation::Mean),
            "max" => Ok(BucketAggregation::Max),
            _ => Err(anyhow!(
                "Invalid bucket aggregation: {}. Valid values are 'sum', 'mean' or 'max'",
                s
            )),
        }
    }
}

/// Which job wins when several jobs share the highest sample count.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum TieBreak {
    /// The job whose first sample appears earliest in the trace
    #[value(name = "first-seen")]
    FirstSeen,
    /// The lexicographically smallest job id
    #[value(name = "lowest-id")]
    LowestId,
}

impl FromStr for TieBreak {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-seen" => Ok(TieBreak::FirstSeen),
            "lowest-id" => Ok(TieBreak::LowestId),
            _ => Err(anyhow!(
                "Invalid tie break: {}. Valid values are 'first-seen' or 'lowest-id'",
                s
            )),
        }
    }
}

#[derive(Parser)]
#[command(version, name = "usage-burst")]
pub struct Cli {
    /// Increase verbosity level (can be specified multiple times.) The first level sets level
    /// "info", second sets level "debug", and third sets level "trace" for the logger.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output locations. Unset values fall back to the configuration file and
/// then to the built-in defaults.
#[derive(Args, Default)]
pub struct CliOutputs {
    /// CSV file receiving the resampled series
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// PNG file of the time series figure
    #[arg(long)]
    pub time_series: Option<PathBuf>,

    /// PNG file of the distribution figure
    #[arg(long)]
    pub distribution: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a usage trace, pick the dominant job, resample its CPU usage and
    /// report how bursty it is.
    ///
    /// The trace is a gzip compressed file with one JSON object per line
    /// carrying `start_time` (microseconds since epoch), `collection_id` and
    /// `average_usage.cpus` / `average_usage.memory`. Lines that cannot be
    /// parsed are skipped and counted in the final report.
    ///
    /// ## Configuration
    ///
    /// Every option can also be set in a `.usageburstconfig` TOML file found
    /// in the working directory or one of its parents, or in
    /// `$XDG_CONFIG_HOME/usage-burst/config.toml`. Command line options take
    /// precedence over the configuration files.
    Analyze {
        /// Gzip compressed, newline delimited JSON usage trace
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Explicit configuration file (replaces the .usageburstconfig lookup)
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        outputs: CliOutputs,

        /// Stop reading after this many valid samples
        #[arg(short = 'n', long, value_parser=clap::value_parser!(u64).range(1..))]
        max_rows: Option<u64>,

        /// Width of a resampling bucket in minutes
        #[arg(short, long, value_parser=clap::value_parser!(u32).range(1..))]
        bucket_minutes: Option<u32>,

        /// How samples within one bucket are combined
        #[arg(short, long)]
        aggregate_by: Option<BucketAggregation>,

        /// Which job wins when the highest sample count is shared
        #[arg(short, long)]
        tie_break: Option<TieBreak>,

        /// Analyze this job instead of the most frequently sampled one
        #[arg(short, long, value_parser=parse_spaceless_string)]
        job: Option<String>,

        /// Number of bins of the distribution histogram
        #[arg(long, value_parser=clap::value_parser!(u16).range(1..))]
        bins: Option<u16>,

        /// Also write an interactive HTML copy next to each PNG figure
        #[arg(long)]
        html: bool,

        /// Additionally open the figures in the browser after writing them
        #[arg(long)]
        show: bool,
    },

    /// Print the workload statistics of a previously written resampled series
    Stats {
        /// CSV file written by `analyze`
        csv: PathBuf,
    },
}

fn parse_spaceless_string(s: &str) -> Result<String> {
    if s.split_whitespace().count() > 1 {
        Err(anyhow!("invalid job id: found space in '{}'", s))
    } else {
        Ok(String::from(s))
    }
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert()
    }

    #[test]
    fn verify_value_enum_parsing() {
        assert_eq!(
            "sum".parse::<BucketAggregation>().unwrap(),
            BucketAggregation::Sum
        );
        assert_eq!(
            "max".parse::<BucketAggregation>().unwrap(),
            BucketAggregation::Max
        );
        assert!("median".parse::<BucketAggregation>().is_err());

        assert_eq!(
            "first-seen".parse::<TieBreak>().unwrap(),
            TieBreak::FirstSeen
        );
        assert_eq!("lowest-id".parse::<TieBreak>().unwrap(), TieBreak::LowestId);
        assert!("random".parse::<TieBreak>().is_err());
    }

    #[test]
    fn verify_analyze_arguments() {
        let cli = Cli::try_parse_from([
            "usage-burst",
            "-vv",
            "analyze",
            "--input",
            "trace.json.gz",
            "--bucket-minutes",
            "10",
            "--aggregate-by",
            "max",
            "--tie-break",
            "lowest-id",
            "--csv",
            "out.csv",
            "--html",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Analyze {
                input,
                bucket_minutes,
                aggregate_by,
                tie_break,
                outputs,
                html,
                show,
                ..
            } => {
                assert_eq!(input, Some(PathBuf::from("trace.json.gz")));
                assert_eq!(bucket_minutes, Some(10));
                assert_eq!(aggregate_by, Some(BucketAggregation::Max));
                assert_eq!(tie_break, Some(TieBreak::LowestId));
                assert_eq!(outputs.csv, Some(PathBuf::from("out.csv")));
                assert!(html);
                assert!(!show);
            }
            Commands::Stats { .. } => panic!("expected analyze"),
        }
    }

    #[test]
    fn verify_zero_bucket_width_rejected() {
        assert!(Cli::try_parse_from(["usage-burst", "analyze", "--bucket-minutes", "0"]).is_err());
        assert!(Cli::try_parse_from(["usage-burst", "analyze", "--job", "a b"]).is_err());
    }
}
