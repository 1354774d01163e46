//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{state::INTERRUPTED_EXIT_CODE, Job, JobContext, JobState, Pipeline},
    environment::Provisioner,
    execution::{
        Decision, EventBus, ExecutionEvent, Interrupt, JobExecutor, JobOutcome, StageScheduler,
    },
};
use chrono::Utc;
use tracing::{error, info, warn};

/// Main pipeline execution engine
pub struct ExecutionEngine<P> {
    executor: JobExecutor<P>,
    scheduler: StageScheduler,
    events: EventBus,
    interrupt: Interrupt,
}

impl<P: Provisioner> ExecutionEngine<P> {
    pub fn new(provisioner: P, scheduler: StageScheduler) -> Self {
        Self {
            executor: JobExecutor::new(provisioner),
            scheduler,
            events: EventBus::new(),
            interrupt: Interrupt::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
    }

    /// Handle that interrupts this engine's run when triggered
    pub fn interrupt_handle(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Execute the entire pipeline and return its exit code
    ///
    /// The exit code is that of the first failed job, or 0.
    pub async fn execute(&self, pipeline: &mut Pipeline) -> i32 {
        let execution_id = pipeline.state.execution_id;
        info!("Starting pipeline execution: {} ({})", pipeline.name, execution_id);

        pipeline.state.start(pipeline.jobs.len());
        self.events.emit(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
            total_jobs: pipeline.jobs.len(),
        });

        for (stage, job_names) in self.scheduler.plan(pipeline) {
            info!("Stage {} ({} jobs)", stage, job_names.len());
            self.events.emit(ExecutionEvent::StageStarted {
                stage,
                jobs: job_names.len(),
            });

            for name in job_names {
                let Some(job) = pipeline.job(&name).cloned() else {
                    continue;
                };

                let decision = if self.interrupt.is_triggered() {
                    Decision::Skip("pipeline was interrupted".to_string())
                } else {
                    self.scheduler.decide(&job, pipeline.has_failed_job())
                };

                match decision {
                    Decision::Run => self.execute_job(pipeline, &job).await,
                    Decision::Skip(reason) => self.mark_job_skipped(pipeline, &name, reason),
                }

                pipeline.update_state_counts();
            }
        }

        let exit_code = self.finish(pipeline);
        info!(
            "Pipeline execution finished: {} - {} (exit code {})",
            pipeline.name, pipeline.state.status, exit_code
        );
        self.events.emit(ExecutionEvent::PipelineCompleted {
            execution_id,
            status: pipeline.state.status,
            exit_code,
        });

        exit_code
    }

    /// Execute a single job
    async fn execute_job(&self, pipeline: &mut Pipeline, job: &Job) {
        let started_at = Utc::now();
        if let Some(j) = pipeline.job_mut(&job.name) {
            j.state = JobState::Running { started_at };
        }

        let context = JobContext::for_job(pipeline, job, &self.executor.provisioner().project_dir());
        self.events.emit(ExecutionEvent::JobStarted {
            job_name: job.name.clone(),
            stage: job.stage.clone(),
            image: context.image.to_string(),
        });

        let outcome = self
            .executor
            .execute(job, &context, &self.events, &self.interrupt)
            .await;

        let state = match outcome {
            JobOutcome::Succeeded { commands_run } => {
                info!("Job {} succeeded", job.name);
                self.events.emit(ExecutionEvent::JobSucceeded {
                    job_name: job.name.clone(),
                    commands_run,
                });
                JobState::Succeeded {
                    commands_run,
                    started_at,
                    finished_at: Utc::now(),
                }
            }
            JobOutcome::Failed {
                failure,
                commands_run,
            } => {
                error!("Job {} failed: {} ({})", job.name, failure.message, failure.kind);
                self.events.emit(ExecutionEvent::JobFailed {
                    job_name: job.name.clone(),
                    failure: failure.clone(),
                });
                JobState::Failed {
                    failure,
                    commands_run,
                    started_at,
                    failed_at: Utc::now(),
                }
            }
        };

        if let Some(j) = pipeline.job_mut(&job.name) {
            j.state = state;
        }
    }

    fn mark_job_skipped(&self, pipeline: &mut Pipeline, name: &str, reason: String) {
        info!("Skipping job {}: {}", name, reason);
        if let Some(job) = pipeline.job_mut(name) {
            job.state = JobState::Skipped {
                reason: reason.clone(),
            };
        }
        self.events.emit(ExecutionEvent::JobSkipped {
            job_name: name.to_string(),
            reason,
        });
    }

    fn finish(&self, pipeline: &mut Pipeline) -> i32 {
        if self.interrupt.is_triggered() {
            warn!("Pipeline {} was interrupted", pipeline.name);
            pipeline.state.cancel();
            return INTERRUPTED_EXIT_CODE;
        }

        match pipeline.first_failure().and_then(|job| job.state.exit_code()) {
            Some(exit_code) => {
                pipeline.state.fail(exit_code);
                exit_code
            }
            None => {
                pipeline.state.succeed();
                0
            }
        }
    }
}
