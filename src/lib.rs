//! ci-runner - a fail-fast runner for GitLab-style CI pipeline definitions
//!
//! A pipeline is a set of jobs grouped into ordered stages. Each job gets a
//! fresh environment provisioned from its image, runs `before_script` then
//! `script`, and stops at the first command that exits non-zero.

pub mod cli;
pub mod core;
pub mod environment;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use crate::core::config::PipelineConfig;
pub use crate::core::{ExecutionStatus, ImageRef, Job, JobFailure, JobState, Pipeline};
pub use environment::{
    DockerProvisioner, Environment, EnvironmentError, LocalProvisioner, Provisioner, RunnerConfig,
};
pub use execution::{ExecutionEngine, ExecutionEvent, Interrupt, StageScheduler};
