//! Environment provisioning - turns a base image into somewhere to run commands
//!
//! A [`Provisioner`] creates one [`Environment`] per job. The environment runs
//! shell commands one at a time and is torn down when the job ends.

pub mod config;
pub mod docker;
pub mod error;
pub mod local;
pub mod outcome;
pub(crate) mod process;

use crate::core::ImageRef;
use async_trait::async_trait;
use std::collections::HashMap;

pub use config::{ProvisionerKind, PullPolicy, RunnerConfig};
pub use docker::DockerProvisioner;
pub use error::EnvironmentError;
pub use local::LocalProvisioner;
pub use outcome::{CommandOutcome, OutputStream};

/// What a job asks a provisioner for
#[derive(Debug, Clone)]
pub struct EnvironmentSpec {
    /// Image to provision from, variables already expanded
    pub image: ImageRef,

    /// Name of the job that will own the environment
    pub job_name: String,

    /// Variables exported to every command
    pub variables: HashMap<String, String>,
}

/// Receives command output as it is produced
pub trait OutputSink: Send + Sync {
    /// Called once per output line, without the trailing newline
    fn on_line(&self, stream: OutputStream, line: &str);
}

/// Creates environments from images
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provision a fresh environment; no command has run when this returns
    async fn provision(&self, spec: &EnvironmentSpec) -> Result<Box<dyn Environment>, EnvironmentError>;

    /// Project directory as seen by commands (`CI_PROJECT_DIR`)
    fn project_dir(&self) -> String;
}

/// A provisioned environment, exclusively owned by one job
#[async_trait]
pub trait Environment: Send + Sync {
    /// Identifier for logs
    fn id(&self) -> &str;

    /// Run one shell command to completion
    async fn run(
        &self,
        command: &str,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutcome, EnvironmentError>;

    /// Release the environment
    async fn teardown(&self) -> Result<(), EnvironmentError>;
}
