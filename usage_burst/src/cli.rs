use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::Level;

use crate::analysis::{analyze, report_persisted};
use crate::config::{load_analysis_config, ConfigOverrides};
use crate::resample::BucketAggregation;
use crate::selection::TieBreak;
use usage_burst_cli_types::{Cli, Commands};

pub fn handle_calls() -> Result<()> {
    let cli = Cli::parse();
    let logger_level = match cli.verbose {
        0 => Level::Warn,
        1 => Level::Info,
        2 => Level::Debug,
        _ => Level::Trace,
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(logger_level.as_str())).init();

    match cli.command {
        Commands::Analyze {
            input,
            config,
            outputs,
            max_rows,
            bucket_minutes,
            aggregate_by,
            tie_break,
            job,
            bins,
            html,
            show,
        } => {
            let overrides = ConfigOverrides {
                input,
                max_rows,
                tie_break: tie_break.map(TieBreak::from),
                job,
                bucket_minutes,
                aggregation: aggregate_by.map(BucketAggregation::from),
                csv: outputs.csv,
                time_series: outputs.time_series,
                distribution: outputs.distribution,
                histogram_bins: bins,
                html,
                show,
            };
            let config = load_analysis_config(config.as_deref(), overrides)?;
            log::debug!("Resolved configuration: {:?}", config);
            analyze(&config).map(|_| ())
        }
        Commands::Stats { csv } => report_persisted(&csv).map(|_| ()),
    }
}
