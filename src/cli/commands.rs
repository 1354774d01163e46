//! CLI command definitions

use crate::cli::DEFAULT_PIPELINE_FILE;
use crate::environment::{ProvisionerKind, PullPolicy};
use clap::Args;
use std::path::PathBuf;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long, default_value = DEFAULT_PIPELINE_FILE)]
    pub file: String,

    /// Variable overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub variable: Vec<(String, String)>,

    /// Manual job to run (repeatable)
    #[arg(long)]
    pub manual: Vec<String>,

    /// Only run these jobs (repeatable)
    #[arg(long)]
    pub job: Vec<String>,

    /// Where jobs run
    #[arg(long, value_enum, default_value_t = ProvisionerArg::Docker)]
    pub provisioner: ProvisionerArg,

    /// When to pull job images
    #[arg(long, value_enum, default_value_t = PullPolicyArg::IfNotPresent)]
    pub pull_policy: PullPolicyArg,

    /// Path to the docker executable
    #[arg(long, default_value = "docker")]
    pub docker: String,

    /// Shell used to run each command
    #[arg(long, default_value = "sh")]
    pub shell: String,

    /// Project directory (defaults to the pipeline file's directory)
    #[arg(long)]
    pub project_dir: Option<PathBuf>,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long, default_value = DEFAULT_PIPELINE_FILE)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List pipelines present in history
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show execution counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific execution
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Provisioner argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProvisionerArg {
    Docker,
    Local,
}

impl From<ProvisionerArg> for ProvisionerKind {
    fn from(arg: ProvisionerArg) -> Self {
        match arg {
            ProvisionerArg::Docker => ProvisionerKind::Docker,
            ProvisionerArg::Local => ProvisionerKind::Local,
        }
    }
}

/// Pull policy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PullPolicyArg {
    Always,
    IfNotPresent,
    Never,
}

impl From<PullPolicyArg> for PullPolicy {
    fn from(arg: PullPolicyArg) -> Self {
        match arg {
            PullPolicyArg::Always => PullPolicy::Always,
            PullPolicyArg::IfNotPresent => PullPolicy::IfNotPresent,
            PullPolicyArg::Never => PullPolicy::Never,
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
