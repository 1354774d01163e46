//! Job executor - provisions one environment and runs a job's commands in it

use crate::{
    core::{FailureKind, Job, JobContext, JobFailure, ScriptPhase},
    environment::{CommandOutcome, Environment, EnvironmentError, EnvironmentSpec, Provisioner},
    execution::{
        events::{EventBus, EventSink, ExecutionEvent},
        Interrupt,
    },
};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Result of executing a job
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Every command exited 0
    Succeeded { commands_run: usize },
    /// The job stopped at its first failure
    Failed {
        failure: JobFailure,
        commands_run: usize,
    },
}

impl JobOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            JobOutcome::Succeeded { .. } => 0,
            JobOutcome::Failed { failure, .. } => failure.exit_code,
        }
    }
}

enum CommandResult {
    Finished(Result<CommandOutcome, EnvironmentError>),
    Interrupted,
    TimedOut,
}

/// Executes a single job
pub struct JobExecutor<P> {
    provisioner: P,
}

impl<P: Provisioner> JobExecutor<P> {
    pub fn new(provisioner: P) -> Self {
        Self { provisioner }
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    /// Execute a job
    ///
    /// The environment is provisioned exactly once. `before_script` then
    /// `script` run in order and the first non-zero exit stops the job. The
    /// environment is torn down whatever the outcome.
    ///
    /// The timeout covers the whole job, provisioning included.
    pub async fn execute(
        &self,
        job: &Job,
        context: &JobContext,
        events: &EventBus,
        interrupt: &Interrupt,
    ) -> JobOutcome {
        if interrupt.is_triggered() {
            info!("Job {} interrupted before provisioning", job.name);
            return JobOutcome::Failed {
                failure: JobFailure::interrupted(None),
                commands_run: 0,
            };
        }

        let spec = EnvironmentSpec {
            image: context.image.clone(),
            job_name: job.name.clone(),
            variables: context.variables.clone(),
        };

        let deadline = job
            .timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        info!("Provisioning {} for job {}", spec.image, job.name);
        let provisioned = tokio::select! {
            result = self.provisioner.provision(&spec) => Some(result),
            _ = interrupt.triggered() => None,
            _ = wait_until(deadline) => None,
        };

        let environment = match provisioned {
            Some(Ok(environment)) => environment,
            Some(Err(e)) => {
                error!("Failed to provision environment for job {}: {}", job.name, e);
                return JobOutcome::Failed {
                    failure: JobFailure::provision(e.to_string()),
                    commands_run: 0,
                };
            }
            None if interrupt.is_triggered() => {
                warn!("Job {} interrupted while provisioning", job.name);
                return JobOutcome::Failed {
                    failure: JobFailure::interrupted(None),
                    commands_run: 0,
                };
            }
            None => {
                let secs = job.timeout_secs.unwrap_or_default();
                error!("Timeout for job {} after {}s while provisioning", job.name, secs);
                return JobOutcome::Failed {
                    failure: JobFailure::timeout(None, secs),
                    commands_run: 0,
                };
            }
        };

        events.emit(ExecutionEvent::EnvironmentProvisioned {
            job_name: job.name.clone(),
            environment_id: environment.id().to_string(),
        });

        let outcome = self
            .run_commands(job, environment.as_ref(), events, interrupt, deadline)
            .await;

        if let Err(e) = environment.teardown().await {
            warn!("Teardown of {} failed: {}", environment.id(), e);
        } else {
            debug!("Tore down {}", environment.id());
        }

        outcome
    }

    async fn run_commands(
        &self,
        job: &Job,
        environment: &dyn Environment,
        events: &EventBus,
        interrupt: &Interrupt,
        deadline: Option<Instant>,
    ) -> JobOutcome {
        let sink = EventSink {
            events,
            job_name: &job.name,
        };
        let mut commands_run = 0;

        for (phase, command) in job.commands() {
            if interrupt.is_triggered() {
                return JobOutcome::Failed {
                    failure: JobFailure::interrupted(Some(command)),
                    commands_run,
                };
            }

            info!("[{}] {}: {}", job.name, phase, command);
            events.emit(ExecutionEvent::CommandStarted {
                job_name: job.name.clone(),
                phase,
                command: command.to_string(),
            });

            let result = tokio::select! {
                result = environment.run(command, Some(&sink)) => CommandResult::Finished(result),
                _ = interrupt.triggered() => CommandResult::Interrupted,
                _ = wait_until(deadline) => CommandResult::TimedOut,
            };

            let outcome = match result {
                CommandResult::Finished(Ok(outcome)) => outcome,
                CommandResult::Finished(Err(e)) => {
                    error!("Job {} could not run `{}`: {}", job.name, command, e);
                    return JobOutcome::Failed {
                        failure: command_error(phase, command, &e),
                        commands_run,
                    };
                }
                CommandResult::Interrupted => {
                    warn!("Job {} interrupted during `{}`", job.name, command);
                    return JobOutcome::Failed {
                        failure: JobFailure::interrupted(Some(command)),
                        commands_run,
                    };
                }
                CommandResult::TimedOut => {
                    let secs = job.timeout_secs.unwrap_or_default();
                    error!("Timeout for job {} after {}s", job.name, secs);
                    return JobOutcome::Failed {
                        failure: JobFailure::timeout(Some(command), secs),
                        commands_run,
                    };
                }
            };

            commands_run += 1;
            events.emit(ExecutionEvent::CommandFinished {
                job_name: job.name.clone(),
                command: command.to_string(),
                exit_code: outcome.exit_code,
                duration: outcome.duration,
            });

            if !outcome.success() {
                let failure = JobFailure::command(phase, command, outcome.exit_code);
                error!("Job {} failed: {}", job.name, failure.message);
                return JobOutcome::Failed {
                    failure,
                    commands_run,
                };
            }
        }

        JobOutcome::Succeeded { commands_run }
    }
}

/// A command that never produced an exit status
fn command_error(phase: ScriptPhase, command: &str, error: &EnvironmentError) -> JobFailure {
    JobFailure {
        kind: FailureKind::for_phase(phase),
        exit_code: 1,
        command: Some(command.to_string()),
        message: error.to_string(),
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
