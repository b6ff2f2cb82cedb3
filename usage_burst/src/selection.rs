use std::collections::HashMap;

use anyhow::Result;
use serde::Deserialize;

use crate::{data::UsageSample, errors::AnalysisError};

/// Which job wins when several jobs share the highest sample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    #[default]
    FirstSeen,
    LowestId,
}

impl From<usage_burst_cli_types::TieBreak> for TieBreak {
    fn from(value: usage_burst_cli_types::TieBreak) -> Self {
        match value {
            usage_burst_cli_types::TieBreak::FirstSeen => TieBreak::FirstSeen,
            usage_burst_cli_types::TieBreak::LowestId => TieBreak::LowestId,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobSelection {
    pub job_id: String,
    pub sample_count: usize,
    pub distinct_jobs: usize,
}

#[derive(Debug, Clone, Copy)]
struct JobTally {
    count: usize,
    first_seen: usize,
}

fn tally_jobs(samples: &[UsageSample]) -> HashMap<&str, JobTally> {
    let mut tallies: HashMap<&str, JobTally> = HashMap::new();
    for (index, sample) in samples.iter().enumerate() {
        tallies
            .entry(sample.job_id.as_str())
            .and_modify(|t| t.count += 1)
            .or_insert(JobTally {
                count: 1,
                first_seen: index,
            });
    }
    tallies
}

/// Returns the job with the most samples.
pub fn select_dominant_job(samples: &[UsageSample], tie_break: TieBreak) -> Result<JobSelection> {
    let tallies = tally_jobs(samples);

    let (job_id, tally) = tallies
        .iter()
        .max_by(|(a_id, a), (b_id, b)| {
            a.count.cmp(&b.count).then_with(|| match tie_break {
                // Earlier and smaller must compare as greater to win max_by
                TieBreak::FirstSeen => b.first_seen.cmp(&a.first_seen),
                TieBreak::LowestId => b_id.cmp(a_id),
            })
        })
        .ok_or(AnalysisError::NoSamples)?;

    log::debug!(
        "Job {} has {} of {} samples across {} jobs",
        job_id,
        tally.count,
        samples.len(),
        tallies.len()
    );

    Ok(JobSelection {
        job_id: job_id.to_string(),
        sample_count: tally.count,
        distinct_jobs: tallies.len(),
    })
}

/// Uses a job requested by the caller instead of the most sampled one.
pub fn select_pinned_job(samples: &[UsageSample], job_id: &str) -> Result<JobSelection> {
    if samples.is_empty() {
        return Err(AnalysisError::NoSamples.into());
    }

    let tallies = tally_jobs(samples);
    let tally = tallies
        .get(job_id)
        .ok_or_else(|| AnalysisError::JobNotFound {
            job_id: job_id.to_string(),
        })?;

    Ok(JobSelection {
        job_id: job_id.to_string(),
        sample_count: tally.count,
        distinct_jobs: tallies.len(),
    })
}

/// Copies out the samples of a single job, keeping their trace order.
pub fn samples_of_job(samples: &[UsageSample], job_id: &str) -> Vec<UsageSample> {
    samples
        .iter()
        .filter(|s| s.job_id == job_id)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(job_id: &str, timestamp: i64) -> UsageSample {
        UsageSample {
            timestamp,
            job_id: job_id.to_string(),
            cpu_usage: 1.0,
            mem_usage: 0.0,
        }
    }

    fn samples_with_counts(counts: &[(&str, usize)]) -> Vec<UsageSample> {
        counts
            .iter()
            .flat_map(|(job, n)| (0..*n).map(move |i| sample(job, i as i64)))
            .collect()
    }

    #[test]
    fn test_most_frequent_job_wins() {
        let samples = samples_with_counts(&[("A", 5), ("B", 9), ("C", 3)]);
        let selection = select_dominant_job(&samples, TieBreak::FirstSeen).unwrap();
        assert_eq!(
            selection,
            JobSelection {
                job_id: "B".to_string(),
                sample_count: 9,
                distinct_jobs: 3,
            }
        );
    }

    #[test]
    fn test_interleaved_samples() {
        let samples: Vec<_> = ["x", "y", "y", "x", "y", "z"]
            .iter()
            .enumerate()
            .map(|(i, job)| sample(job, i as i64))
            .collect();
        let selection = select_dominant_job(&samples, TieBreak::LowestId).unwrap();
        assert_eq!(selection.job_id, "y");
        assert_eq!(selection.sample_count, 3);
    }

    #[test]
    fn test_tie_break_first_seen() {
        let samples = samples_with_counts(&[("zeta", 2), ("alpha", 2), ("mid", 1)]);
        let selection = select_dominant_job(&samples, TieBreak::FirstSeen).unwrap();
        assert_eq!(selection.job_id, "zeta");
    }

    #[test]
    fn test_tie_break_lowest_id() {
        let samples = samples_with_counts(&[("zeta", 2), ("alpha", 2), ("mid", 1)]);
        let selection = select_dominant_job(&samples, TieBreak::LowestId).unwrap();
        assert_eq!(selection.job_id, "alpha");
    }

    #[test]
    fn test_empty_input_fails() {
        let err = select_dominant_job(&[], TieBreak::FirstSeen).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::NoSamples)
        ));
    }

    #[test]
    fn test_pinned_job() {
        let samples = samples_with_counts(&[("A", 5), ("B", 9)]);
        let selection = select_pinned_job(&samples, "A").unwrap();
        assert_eq!(selection.sample_count, 5);
        assert_eq!(selection.distinct_jobs, 2);

        let err = select_pinned_job(&samples, "Q").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::JobNotFound { .. })
        ));
    }

    #[test]
    fn test_samples_of_job() {
        let samples = samples_with_counts(&[("A", 2), ("B", 1), ("A", 1)]);
        let picked = samples_of_job(&samples, "A");
        assert_eq!(picked.len(), 3);
        assert!(picked.iter().all(|s| s.job_id == "A"));
        assert_eq!(
            picked.iter().map(|s| s.timestamp).collect::<Vec<_>>(),
            vec![0, 1, 0]
        );
    }
}
