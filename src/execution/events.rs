//! Execution events and their delivery to handlers

use crate::core::{ExecutionStatus, JobFailure, ScriptPhase};
use crate::environment::{OutputSink, OutputStream};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        total_jobs: usize,
    },
    StageStarted {
        stage: String,
        jobs: usize,
    },
    JobStarted {
        job_name: String,
        stage: String,
        image: String,
    },
    EnvironmentProvisioned {
        job_name: String,
        environment_id: String,
    },
    CommandStarted {
        job_name: String,
        phase: ScriptPhase,
        command: String,
    },
    CommandOutput {
        job_name: String,
        stream: OutputStream,
        line: String,
    },
    CommandFinished {
        job_name: String,
        command: String,
        exit_code: i32,
        duration: Duration,
    },
    JobSucceeded {
        job_name: String,
        commands_run: usize,
    },
    JobFailed {
        job_name: String,
        failure: JobFailure,
    },
    JobSkipped {
        job_name: String,
        reason: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
        exit_code: i32,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of events to every registered handler, in registration order
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.push(Arc::new(handler));
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Forwards a job's command output onto the bus as `CommandOutput` events
pub(crate) struct EventSink<'a> {
    pub(crate) events: &'a EventBus,
    pub(crate) job_name: &'a str,
}

impl OutputSink for EventSink<'_> {
    fn on_line(&self, stream: OutputStream, line: &str) {
        self.events.emit(ExecutionEvent::CommandOutput {
            job_name: self.job_name.to_string(),
            stream,
            line: line.to_string(),
        });
    }
}
