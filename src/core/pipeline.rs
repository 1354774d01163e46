//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    job::Job,
    state::{ExecutionStatus, JobState, PipelineState},
};
use anyhow::Result;
use std::collections::HashMap;

/// A pipeline instance, created fresh for one run
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Stage order
    pub stages: Vec<String>,

    /// Global variables
    pub variables: HashMap<String, String>,

    /// Variables set on the command line (highest precedence)
    pub overrides: HashMap<String, String>,

    /// Jobs in declaration order
    pub jobs: Vec<Job>,

    /// Execution state
    pub state: PipelineState,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let jobs = config
            .jobs
            .iter()
            .map(|job_config| Job::from_config(job_config, config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Pipeline {
            name: config.name(),
            stages: config.effective_stages(),
            variables: config.variables_as_string_map(),
            overrides: HashMap::new(),
            jobs,
            state: PipelineState::new(),
        })
    }

    /// Get a job by name
    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Get a mutable job by name
    pub fn job_mut(&mut self, name: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.name == name)
    }

    /// Set a variable that overrides global and job variables
    pub fn set_variable(&mut self, key: String, value: String) {
        self.overrides.insert(key, value);
    }

    /// Jobs of one stage, in declaration order
    pub fn jobs_in_stage(&self, stage: &str) -> Vec<&Job> {
        self.jobs.iter().filter(|j| j.stage == stage).collect()
    }

    /// Job names in the order they are considered: by stage, then declaration
    pub fn execution_order(&self) -> Vec<String> {
        self.stages
            .iter()
            .flat_map(|stage| self.jobs_in_stage(stage))
            .map(|job| job.name.clone())
            .collect()
    }

    /// Check if every job reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.jobs.iter().all(|j| j.state.is_terminal())
    }

    /// Check if any job has failed so far
    pub fn has_failed_job(&self) -> bool {
        self.jobs
            .iter()
            .any(|j| matches!(j.state, JobState::Failed { .. }))
    }

    /// Check if the pipeline has failed
    pub fn has_failed(&self) -> bool {
        self.state.status == ExecutionStatus::Failed
    }

    /// The first job that failed, in execution order
    pub fn first_failure(&self) -> Option<&Job> {
        self.execution_order()
            .iter()
            .filter_map(|name| self.job(name))
            .find(|j| matches!(j.state, JobState::Failed { .. }))
    }

    /// Recount job states into the pipeline state
    pub fn update_state_counts(&mut self) {
        let mut succeeded = 0;
        let mut failed = 0;
        let mut skipped = 0;

        for job in &self.jobs {
            match &job.state {
                JobState::Succeeded { .. } => succeeded += 1,
                JobState::Failed { .. } => failed += 1,
                JobState::Skipped { .. } => skipped += 1,
                _ => {}
            }
        }

        self.state.update_counts(succeeded, failed, skipped);
    }
}
