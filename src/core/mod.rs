//! Core domain models

pub mod config;
pub mod context;
pub mod image;
pub mod job;
pub mod pipeline;
pub mod state;

pub use config::When;
pub use context::JobContext;
pub use image::ImageRef;
pub use job::{Job, ScriptPhase, ShellCommand};
pub use pipeline::Pipeline;
pub use state::{ExecutionStatus, FailureKind, JobFailure, JobState, PipelineState};
