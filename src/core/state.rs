//! Execution state models

use crate::core::job::ScriptPhase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Exit code reported when the environment could not be provisioned
pub const PROVISION_FAILURE_EXIT_CODE: i32 = 1;

/// Exit code reported when a job exceeds its timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the run is interrupted
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Every job that ran succeeded
    Succeeded,
    /// At least one job failed
    Failed,
    /// Pipeline was interrupted
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Succeeded => "Succeeded",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ExecutionStatus::Pending),
            "Running" => Ok(ExecutionStatus::Running),
            "Succeeded" => Ok(ExecutionStatus::Succeeded),
            "Failed" => Ok(ExecutionStatus::Failed),
            "Cancelled" => Ok(ExecutionStatus::Cancelled),
            other => Err(format!("Unknown execution status: {}", other)),
        }
    }
}

/// Why a job failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The base image could not be turned into an environment
    EnvironmentProvision,
    /// A `before_script` command exited non-zero
    SetupCommand,
    /// A `script` command exited non-zero
    TestCommand,
    /// The job ran past its timeout
    Timeout,
    /// The run was interrupted
    Interrupted,
}

impl FailureKind {
    /// Failure kind for a non-zero exit in the given phase
    pub fn for_phase(phase: ScriptPhase) -> Self {
        match phase {
            ScriptPhase::BeforeScript => FailureKind::SetupCommand,
            ScriptPhase::Script => FailureKind::TestCommand,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::EnvironmentProvision => "environment provisioning failed",
            FailureKind::SetupCommand => "setup command failed",
            FailureKind::TestCommand => "script command failed",
            FailureKind::Timeout => "job timed out",
            FailureKind::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}

/// Details of a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,

    /// Exit code the job reports
    pub exit_code: i32,

    /// The command that was running, if any
    pub command: Option<String>,

    /// Human-readable description
    pub message: String,
}

impl JobFailure {
    pub fn provision(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::EnvironmentProvision,
            exit_code: PROVISION_FAILURE_EXIT_CODE,
            command: None,
            message: message.into(),
        }
    }

    pub fn command(phase: ScriptPhase, command: &str, exit_code: i32) -> Self {
        Self {
            kind: FailureKind::for_phase(phase),
            exit_code,
            command: Some(command.to_string()),
            message: format!("`{}` exited with code {}", command, exit_code),
        }
    }

    pub fn timeout(command: Option<&str>, timeout_secs: u64) -> Self {
        Self {
            kind: FailureKind::Timeout,
            exit_code: TIMEOUT_EXIT_CODE,
            command: command.map(str::to_string),
            message: format!("Timeout after {} seconds", timeout_secs),
        }
    }

    pub fn interrupted(command: Option<&str>) -> Self {
        Self {
            kind: FailureKind::Interrupted,
            exit_code: INTERRUPTED_EXIT_CODE,
            command: command.map(str::to_string),
            message: "Interrupted".to_string(),
        }
    }
}

/// State of a single job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobState {
    /// Job has not been considered yet
    Pending,
    /// Job is currently running
    Running { started_at: DateTime<Utc> },
    /// Every command exited 0
    Succeeded {
        commands_run: usize,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// A command failed or the environment could not be provisioned
    Failed {
        failure: JobFailure,
        commands_run: usize,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Job was not run
    Skipped { reason: String },
}

impl JobState {
    /// Check if job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded { .. } | JobState::Failed { .. } | JobState::Skipped { .. }
        )
    }

    /// Exit code of a finished job
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            JobState::Succeeded { .. } => Some(0),
            JobState::Failed { failure, .. } => Some(failure.exit_code),
            _ => None,
        }
    }
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution finished
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of jobs
    pub total_jobs: usize,

    /// Number of succeeded jobs
    pub succeeded_jobs: usize,

    /// Number of failed jobs
    pub failed_jobs: usize,

    /// Number of skipped jobs
    pub skipped_jobs: usize,

    /// Exit code of the run, once finished
    pub exit_code: Option<i32>,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_jobs: 0,
            succeeded_jobs: 0,
            failed_jobs: 0,
            skipped_jobs: 0,
            exit_code: None,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_jobs: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_jobs = total_jobs;
    }

    /// Mark pipeline as succeeded
    pub fn succeed(&mut self) {
        self.finish(ExecutionStatus::Succeeded, 0);
    }

    /// Mark pipeline as failed with the exit code of the first failing job
    pub fn fail(&mut self, exit_code: i32) {
        self.finish(ExecutionStatus::Failed, exit_code);
    }

    /// Mark pipeline as interrupted
    pub fn cancel(&mut self) {
        self.finish(ExecutionStatus::Cancelled, INTERRUPTED_EXIT_CODE);
    }

    fn finish(&mut self, status: ExecutionStatus, exit_code: i32) {
        self.status = status;
        self.exit_code = Some(exit_code);
        self.completed_at = Some(Utc::now());
    }

    /// Update job counts
    pub fn update_counts(&mut self, succeeded: usize, failed: usize, skipped: usize) {
        self.succeeded_jobs = succeeded;
        self.failed_jobs = failed;
        self.skipped_jobs = skipped;
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        (self.succeeded_jobs + self.failed_jobs + self.skipped_jobs) as f64 / self.total_jobs as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_is_terminal() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running {
            started_at: Utc::now()
        }
        .is_terminal());
        assert!(JobState::Succeeded {
            commands_run: 2,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
        .is_terminal());
        assert!(JobState::Skipped {
            reason: "manual".to_string()
        }
        .is_terminal());
    }

    #[test]
    fn test_failed_job_exit_code() {
        let state = JobState::Failed {
            failure: JobFailure::command(ScriptPhase::BeforeScript, "apt-get install -y gcc", 100),
            commands_run: 2,
            started_at: Utc::now(),
            failed_at: Utc::now(),
        };
        assert_eq!(state.exit_code(), Some(100));
    }

    #[test]
    fn test_failure_kind_follows_phase() {
        let setup = JobFailure::command(ScriptPhase::BeforeScript, "apt-get update", 100);
        let test = JobFailure::command(ScriptPhase::Script, "pytest", 1);
        assert_eq!(setup.kind, FailureKind::SetupCommand);
        assert_eq!(test.kind, FailureKind::TestCommand);
        assert_eq!(test.message, "`pytest` exited with code 1");
    }

    #[test]
    fn test_pipeline_progress() {
        let mut state = PipelineState::new();
        state.start(4);
        assert_eq!(state.progress(), 0.0);

        state.update_counts(1, 1, 0);
        assert_eq!(state.progress(), 0.5);

        state.update_counts(2, 1, 1);
        assert_eq!(state.progress(), 1.0);
    }

    #[test]
    fn test_finish_records_exit_code() {
        let mut state = PipelineState::new();
        state.start(1);
        state.fail(100);
        assert_eq!(state.status, ExecutionStatus::Failed);
        assert_eq!(state.exit_code, Some(100));
        assert!(state.completed_at.is_some());
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Cancelled".parse::<ExecutionStatus>(), Ok(ExecutionStatus::Cancelled));
        assert!("Completed".parse::<ExecutionStatus>().is_err());
    }
}
