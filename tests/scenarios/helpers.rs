//! Test utilities for pipeline scenarios

use async_trait::async_trait;
use ci_runner::core::config::PipelineConfig;
use ci_runner::core::{FailureKind, JobState, Pipeline};
use ci_runner::environment::{
    CommandOutcome, Environment, EnvironmentError, EnvironmentSpec, OutputSink, OutputStream,
    Provisioner,
};
use ci_runner::execution::{ExecutionEngine, ExecutionEvent, StageScheduler};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Something that happened inside a mock environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Provision { job: String, image: String },
    Run { job: String, command: String },
    Teardown { job: String },
}

/// Provisioner whose environments answer commands with scripted exit codes
///
/// Commands not listed in `exit_codes` exit 0. Every call is recorded so
/// tests can check exactly what ran and in which order.
#[derive(Clone, Default)]
pub struct MockProvisioner {
    exit_codes: HashMap<String, i32>,
    failing_images: Vec<String>,
    calls: Arc<Mutex<Vec<Call>>>,
    variables: Arc<Mutex<HashMap<String, HashMap<String, String>>>>,
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `command` exit with `code`
    pub fn with_exit_code(mut self, command: &str, code: i32) -> Self {
        self.exit_codes.insert(command.to_string(), code);
        self
    }

    /// Make provisioning of `image` fail
    pub fn with_failing_image(mut self, image: &str) -> Self {
        self.failing_images.push(image.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Commands run by a job, in order
    pub fn commands_for(&self, job: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Run { job: j, command } if j == job => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Number of environments provisioned for a job
    pub fn provisions_for(&self, job: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Provision { job: j, .. } if j == job))
            .count()
    }

    /// Number of teardowns for a job
    pub fn teardowns_for(&self, job: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Teardown { job: j } if j == job))
            .count()
    }

    /// Images provisioned, in order
    pub fn images(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Provision { image, .. } => Some(image),
                _ => None,
            })
            .collect()
    }

    /// Variables exported to a job's environment
    pub fn variables_for(&self, job: &str) -> HashMap<String, String> {
        self.variables
            .lock()
            .unwrap()
            .get(job)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn provision(
        &self,
        spec: &EnvironmentSpec,
    ) -> Result<Box<dyn Environment>, EnvironmentError> {
        self.calls.lock().unwrap().push(Call::Provision {
            job: spec.job_name.clone(),
            image: spec.image.to_string(),
        });

        if self.failing_images.contains(&spec.image.to_string()) {
            return Err(EnvironmentError::Provision {
                image: spec.image.to_string(),
                reason: "pull access denied".to_string(),
            });
        }

        self.variables
            .lock()
            .unwrap()
            .insert(spec.job_name.clone(), spec.variables.clone());

        Ok(Box::new(MockEnvironment {
            job: spec.job_name.clone(),
            exit_codes: self.exit_codes.clone(),
            calls: self.calls.clone(),
        }))
    }

    fn project_dir(&self) -> String {
        "/builds/project".to_string()
    }
}

struct MockEnvironment {
    job: String,
    exit_codes: HashMap<String, i32>,
    calls: Arc<Mutex<Vec<Call>>>,
}

#[async_trait]
impl Environment for MockEnvironment {
    fn id(&self) -> &str {
        &self.job
    }

    async fn run(
        &self,
        command: &str,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutcome, EnvironmentError> {
        self.calls.lock().unwrap().push(Call::Run {
            job: self.job.clone(),
            command: command.to_string(),
        });

        let exit_code = self.exit_codes.get(command).copied().unwrap_or(0);
        if let Some(sink) = sink {
            sink.on_line(OutputStream::Stdout, &format!("ran {}", command));
        }

        Ok(CommandOutcome::new(exit_code, Duration::from_millis(1)))
    }

    async fn teardown(&self) -> Result<(), EnvironmentError> {
        self.calls.lock().unwrap().push(Call::Teardown {
            job: self.job.clone(),
        });
        Ok(())
    }
}

/// Result of a scenario run
pub struct PipelineTestResult {
    pub pipeline: Pipeline,
    pub exit_code: i32,
    pub events: Vec<ExecutionEvent>,
}

impl PipelineTestResult {
    pub fn job_state(&self, job: &str) -> &JobState {
        &self
            .pipeline
            .job(job)
            .unwrap_or_else(|| panic!("no job named {}", job))
            .state
    }

    /// Names of jobs that emitted `JobSkipped`
    pub fn skipped_jobs(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::JobSkipped { job_name, .. } => Some(job_name.clone()),
                _ => None,
            })
            .collect()
    }
}

pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    PipelineConfig::from_yaml(yaml)
        .expect("valid pipeline YAML")
        .to_pipeline()
        .expect("pipeline builds")
}

/// Run a pipeline against a mock provisioner, collecting every event
pub async fn run_with(
    mut pipeline: Pipeline,
    provisioner: MockProvisioner,
    scheduler: StageScheduler,
) -> PipelineTestResult {
    let engine = ExecutionEngine::new(provisioner, scheduler);
    let events = Arc::new(Mutex::new(Vec::new()));
    let captured = events.clone();
    engine.add_event_handler(move |event| captured.lock().unwrap().push(event));

    let exit_code = engine.execute(&mut pipeline).await;
    let events = events.lock().unwrap().clone();

    PipelineTestResult {
        pipeline,
        exit_code,
        events,
    }
}

pub async fn run(yaml: &str, provisioner: MockProvisioner) -> PipelineTestResult {
    run_with(pipeline_from_yaml(yaml), provisioner, StageScheduler::new()).await
}

pub fn assert_job_succeeded(result: &PipelineTestResult, job: &str) {
    assert!(
        matches!(result.job_state(job), JobState::Succeeded { .. }),
        "expected {} to succeed, got {:?}",
        job,
        result.job_state(job)
    );
}

pub fn assert_job_failed(result: &PipelineTestResult, job: &str, kind: FailureKind, exit_code: i32) {
    match result.job_state(job) {
        JobState::Failed { failure, .. } => {
            assert_eq!(failure.kind, kind, "failure kind of {}", job);
            assert_eq!(failure.exit_code, exit_code, "exit code of {}", job);
        }
        other => panic!("expected {} to fail, got {:?}", job, other),
    }
}

pub fn assert_job_skipped(result: &PipelineTestResult, job: &str) {
    assert!(
        matches!(result.job_state(job), JobState::Skipped { .. }),
        "expected {} to be skipped, got {:?}",
        job,
        result.job_state(job)
    );
}

/// One python job with three setup commands and one test command
pub const SH_INTEGRATION: &str = r#"
image: python:3.9

stages:
  - test

run_sh_integration_tests:
  stage: test
  when: always
  before_script:
    - apt-get update
    - apt-get install -y gcc libgdal-dev
    - pip install -e .[DEV]
  script:
    - pytest -m sh_integration
"#;
