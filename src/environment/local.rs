//! Host shell provisioner - runs commands directly on the machine

use crate::environment::{
    process, CommandOutcome, Environment, EnvironmentError, EnvironmentSpec, OutputSink,
    Provisioner, RunnerConfig,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

/// Provisioner that runs every command in the host shell
///
/// The job image is not used; commands run in the project directory with
/// the job's variables added to the inherited environment.
#[derive(Debug, Clone)]
pub struct LocalProvisioner {
    shell: String,
    project_dir: PathBuf,
}

impl LocalProvisioner {
    pub fn new(shell: String, project_dir: PathBuf) -> Self {
        Self { shell, project_dir }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.shell.clone(), config.project_dir.clone())
    }
}

#[async_trait]
impl Provisioner for LocalProvisioner {
    async fn provision(&self, spec: &EnvironmentSpec) -> Result<Box<dyn Environment>, EnvironmentError> {
        if !self.project_dir.is_dir() {
            return Err(EnvironmentError::Provision {
                image: spec.image.to_string(),
                reason: format!(
                    "project directory {} does not exist",
                    self.project_dir.display()
                ),
            });
        }

        warn!(
            "Job {} runs on the host shell; image {} is not used",
            spec.job_name, spec.image
        );

        let id = format!("local-{}-{}", spec.job_name, &Uuid::new_v4().simple().to_string()[..8]);
        debug!("Provisioned local environment {}", id);

        Ok(Box::new(LocalEnvironment {
            id,
            shell: self.shell.clone(),
            project_dir: self.project_dir.clone(),
            variables: spec.variables.clone(),
        }))
    }

    fn project_dir(&self) -> String {
        self.project_dir.display().to_string()
    }
}

/// A job's view of the host shell
#[derive(Debug)]
struct LocalEnvironment {
    id: String,
    shell: String,
    project_dir: PathBuf,
    variables: HashMap<String, String>,
}

#[async_trait]
impl Environment for LocalEnvironment {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(
        &self,
        command: &str,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutcome, EnvironmentError> {
        let mut child = Command::new(&self.shell);
        child
            .arg("-c")
            .arg(command)
            .current_dir(&self.project_dir)
            .envs(&self.variables);

        process::run_streaming(child, sink).await
    }

    async fn teardown(&self) -> Result<(), EnvironmentError> {
        debug!("Released local environment {}", self.id);
        Ok(())
    }
}
