//! Runner configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which provisioner turns images into environments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionerKind {
    /// One Docker container per job
    Docker,
    /// The host shell; the image is recorded but not used
    Local,
}

/// When the Docker provisioner pulls the job image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Pull before every job
    Always,
    /// Pull only when the image is missing locally
    IfNotPresent,
    /// Never pull; the image must already exist
    Never,
}

/// Configuration for the environment provisioners
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub provisioner: ProvisionerKind,

    /// Path to the docker executable
    pub docker_path: String,

    /// Shell used to run each command (`<shell> -c <command>`)
    pub shell: String,

    pub pull_policy: PullPolicy,

    /// Host directory holding the project
    pub project_dir: PathBuf,

    /// Where the project is mounted inside containers
    pub builds_dir: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            provisioner: ProvisionerKind::Docker,
            docker_path: "docker".to_string(),
            shell: "sh".to_string(),
            pull_policy: PullPolicy::IfNotPresent,
            project_dir: PathBuf::from("."),
            builds_dir: "/builds/project".to_string(),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provisioner(mut self, provisioner: ProvisionerKind) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn with_docker_path(mut self, docker_path: String) -> Self {
        self.docker_path = docker_path;
        self
    }

    pub fn with_shell(mut self, shell: String) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_pull_policy(mut self, pull_policy: PullPolicy) -> Self {
        self.pull_policy = pull_policy;
        self
    }

    pub fn with_project_dir(mut self, project_dir: PathBuf) -> Self {
        self.project_dir = project_dir;
        self
    }

    pub fn with_builds_dir(mut self, builds_dir: String) -> Self {
        self.builds_dir = builds_dir;
        self
    }
}
