//! Job scheduler - decides the order of jobs and whether each one runs

use crate::core::{config::When, Job, Pipeline};
use anyhow::{bail, Result};
use std::collections::HashSet;

/// Whether a job runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Run,
    Skip(String),
}

/// Scheduler for a sequential, stage-ordered run
///
/// Stages run in declared order and jobs within a stage in declaration
/// order. `on_success` jobs stop running once any job has failed, `always`
/// jobs run regardless and `manual` jobs only run when requested.
#[derive(Debug, Clone, Default)]
pub struct StageScheduler {
    manual: HashSet<String>,
    selected: HashSet<String>,
}

impl StageScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manual jobs that should run
    pub fn with_manual_jobs<I: IntoIterator<Item = String>>(mut self, jobs: I) -> Self {
        self.manual.extend(jobs);
        self
    }

    /// Restrict the run to these jobs; empty means every job
    pub fn with_selected_jobs<I: IntoIterator<Item = String>>(mut self, jobs: I) -> Self {
        self.selected.extend(jobs);
        self
    }

    /// Check that every requested job exists
    pub fn validate(&self, pipeline: &Pipeline) -> Result<()> {
        for name in self.manual.iter().chain(self.selected.iter()) {
            match pipeline.job(name) {
                None => bail!("Unknown job '{}'", name),
                Some(job) if self.manual.contains(name) && job.when != When::Manual => {
                    bail!("Job '{}' is not a manual job", name)
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Stages that have jobs, each with its job names in run order
    pub fn plan(&self, pipeline: &Pipeline) -> Vec<(String, Vec<String>)> {
        pipeline
            .stages
            .iter()
            .map(|stage| {
                let jobs = pipeline
                    .jobs_in_stage(stage)
                    .into_iter()
                    .map(|job| job.name.clone())
                    .collect::<Vec<_>>();
                (stage.clone(), jobs)
            })
            .filter(|(_, jobs)| !jobs.is_empty())
            .collect()
    }

    /// Decide whether a job runs given whether an earlier job has failed
    pub fn decide(&self, job: &Job, earlier_failure: bool) -> Decision {
        if !self.selected.is_empty() && !self.selected.contains(&job.name) {
            return Decision::Skip("not selected".to_string());
        }

        match job.when {
            When::Always => Decision::Run,
            When::Manual if !self.requested(&job.name) => {
                Decision::Skip("manual job was not requested".to_string())
            }
            When::Manual | When::OnSuccess if earlier_failure => {
                Decision::Skip("a previous job failed".to_string())
            }
            When::Manual | When::OnSuccess => Decision::Run,
        }
    }

    fn requested(&self, name: &str) -> bool {
        self.manual.contains(name) || self.selected.contains(name)
    }
}
