//! Job domain model

use crate::core::{
    config::{JobConfig, PipelineConfig, When},
    image::ImageRef,
    state::JobState,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A command string handed verbatim to the environment's shell
pub type ShellCommand = String;

/// Which command list a command belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPhase {
    BeforeScript,
    Script,
}

impl fmt::Display for ScriptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptPhase::BeforeScript => f.write_str("before_script"),
            ScriptPhase::Script => f.write_str("script"),
        }
    }
}

/// A single job in a pipeline
#[derive(Debug, Clone)]
pub struct Job {
    /// Job name
    pub name: String,

    /// Stage the job belongs to
    pub stage: String,

    /// Trigger condition
    pub when: When,

    /// Image the job's environment is provisioned from (unexpanded)
    pub image: ImageRef,

    /// Setup commands, run first
    pub before_script: Vec<ShellCommand>,

    /// Main commands, run after setup
    pub script: Vec<ShellCommand>,

    /// Job-level variables
    pub variables: HashMap<String, String>,

    /// Timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Runtime state
    pub state: JobState,
}

impl Job {
    /// Create a job from its config, resolving inherited settings
    pub fn from_config(config: &JobConfig, pipeline: &PipelineConfig) -> Result<Self> {
        let image = pipeline
            .image_for(config)
            .cloned()
            .with_context(|| format!("Job '{}' has no image", config.name))?;

        Ok(Job {
            name: config.name.clone(),
            stage: config.stage.clone(),
            when: config.when,
            image,
            before_script: pipeline.before_script_for(config),
            script: config.script.to_vec(),
            variables: config.variables_as_string_map(),
            timeout_secs: pipeline.timeout_for(config),
            state: JobState::Pending,
        })
    }

    /// All commands in execution order: `before_script`, then `script`
    pub fn commands(&self) -> impl Iterator<Item = (ScriptPhase, &str)> + '_ {
        self.before_script
            .iter()
            .map(|c| (ScriptPhase::BeforeScript, c.as_str()))
            .chain(self.script.iter().map(|c| (ScriptPhase::Script, c.as_str())))
    }

    /// Total number of commands
    pub fn command_count(&self) -> usize {
        self.before_script.len() + self.script.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_run_setup_first() {
        let yaml = r#"
image: python:3.9
before_script:
  - apt-get update
job:
  before_script:
    - apt-get update
    - apt-get install -y gcc
  script:
    - pip install -e .
    - pytest
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let job = Job::from_config(&config.jobs[0], &config).unwrap();

        let commands: Vec<_> = job.commands().collect();
        assert_eq!(
            commands,
            vec![
                (ScriptPhase::BeforeScript, "apt-get update"),
                (ScriptPhase::BeforeScript, "apt-get install -y gcc"),
                (ScriptPhase::Script, "pip install -e ."),
                (ScriptPhase::Script, "pytest"),
            ]
        );
        assert_eq!(job.command_count(), 4);
    }

    #[test]
    fn test_job_inherits_global_settings() {
        let yaml = r#"
image: python:3.9
before_script: [apt-get update]
variables:
  GLOBAL: "1"
job:
  variables:
    LOCAL: "2"
  script: [pytest]
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let job = Job::from_config(&config.jobs[0], &config).unwrap();

        assert_eq!(job.image.as_str(), "python:3.9");
        assert_eq!(job.before_script, vec!["apt-get update".to_string()]);
        assert_eq!(job.variables.get("LOCAL"), Some(&"2".to_string()));
        assert!(!job.variables.contains_key("GLOBAL"));
        assert!(job.timeout_secs.is_none());
        assert!(matches!(job.state, JobState::Pending));
    }
}
