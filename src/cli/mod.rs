//! Command-line interface

pub mod commands;
pub mod output;
pub mod terminal_output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Default pipeline definition file
pub const DEFAULT_PIPELINE_FILE: &str = ".gitlab-ci.yml";

/// Fail-fast runner for GitLab-style CI pipelines
#[derive(Debug, Parser, Clone)]
#[command(name = "ci-runner")]
#[command(version)]
#[command(about = "Run GitLab-style CI pipelines locally, stopping at the first failure", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (also shows full history details)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Don't echo command output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline
    Run(RunCommand),

    /// Validate a pipeline definition
    Validate(ValidateCommand),

    /// List pipelines present in history
    List(ListCommand),

    /// Show execution history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{ProvisionerKind, PullPolicy};

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["ci-runner", "run"]).unwrap();
        let Command::Run(run) = cli.command else {
            panic!("expected run command");
        };

        assert_eq!(run.file, DEFAULT_PIPELINE_FILE);
        assert_eq!(ProvisionerKind::from(run.provisioner), ProvisionerKind::Docker);
        assert_eq!(PullPolicy::from(run.pull_policy), PullPolicy::IfNotPresent);
        assert!(run.variable.is_empty());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "ci-runner",
            "run",
            "-f",
            "ci.yml",
            "--variable",
            "PYTHON_VERSION=3.11",
            "--manual",
            "publish",
            "--provisioner",
            "local",
            "--pull-policy",
            "never",
            "-q",
        ])
        .unwrap();
        let Command::Run(run) = cli.command else {
            panic!("expected run command");
        };

        assert_eq!(run.file, "ci.yml");
        assert_eq!(
            run.variable,
            vec![("PYTHON_VERSION".to_string(), "3.11".to_string())]
        );
        assert_eq!(run.manual, vec!["publish"]);
        assert_eq!(ProvisionerKind::from(run.provisioner), ProvisionerKind::Local);
        assert_eq!(PullPolicy::from(run.pull_policy), PullPolicy::Never);
        assert!(cli.quiet);
    }

    #[test]
    fn test_history_accepts_global_verbose() {
        let cli = Cli::try_parse_from(["ci-runner", "history", "-p", "geo", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::History(ref h) if h.pipeline.as_deref() == Some("geo")));
    }

    #[test]
    fn test_invalid_variable_is_rejected() {
        assert!(Cli::try_parse_from(["ci-runner", "run", "--variable", "NOVALUE"]).is_err());
    }
}
