//! Test: fail-fast execution of before_script and script

use crate::helpers::*;
use ci_runner::core::{ExecutionStatus, FailureKind, JobState};

const JOB: &str = "run_sh_integration_tests";

/// Every command exits 0: the job and the pipeline pass
#[tokio::test]
async fn test_all_commands_succeed() {
    let provisioner = MockProvisioner::new();
    let result = run(SH_INTEGRATION, provisioner.clone()).await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.pipeline.state.status, ExecutionStatus::Succeeded);
    assert_job_succeeded(&result, JOB);
    assert_eq!(
        provisioner.commands_for(JOB),
        vec![
            "apt-get update",
            "apt-get install -y gcc libgdal-dev",
            "pip install -e .[DEV]",
            "pytest -m sh_integration",
        ]
    );
}

/// A failing setup command stops the job before any later command
#[tokio::test]
async fn test_setup_failure_skips_remaining_commands() {
    let provisioner =
        MockProvisioner::new().with_exit_code("apt-get install -y gcc libgdal-dev", 100);
    let result = run(SH_INTEGRATION, provisioner.clone()).await;

    assert_eq!(result.exit_code, 100);
    assert_eq!(result.pipeline.state.status, ExecutionStatus::Failed);
    assert_job_failed(&result, JOB, FailureKind::SetupCommand, 100);
    assert_eq!(
        provisioner.commands_for(JOB),
        vec!["apt-get update", "apt-get install -y gcc libgdal-dev"]
    );
}

/// A failing test command fails the job with its exit code
#[tokio::test]
async fn test_script_failure_reports_exit_code() {
    let provisioner = MockProvisioner::new().with_exit_code("pytest -m sh_integration", 1);
    let result = run(SH_INTEGRATION, provisioner.clone()).await;

    assert_eq!(result.exit_code, 1);
    assert_job_failed(&result, JOB, FailureKind::TestCommand, 1);

    match result.job_state(JOB) {
        JobState::Failed {
            failure,
            commands_run,
            ..
        } => {
            assert_eq!(*commands_run, 4);
            assert_eq!(failure.command.as_deref(), Some("pytest -m sh_integration"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

/// The environment is provisioned once, from the declared image, and torn
/// down even when the job fails
#[tokio::test]
async fn test_single_environment_per_job() {
    let provisioner = MockProvisioner::new().with_exit_code("apt-get update", 2);
    run(SH_INTEGRATION, provisioner.clone()).await;

    assert_eq!(provisioner.provisions_for(JOB), 1);
    assert_eq!(provisioner.teardowns_for(JOB), 1);
    assert_eq!(provisioner.images(), vec!["python:3.9"]);
    assert_eq!(
        provisioner.calls().last(),
        Some(&Call::Teardown {
            job: JOB.to_string()
        })
    );
}

/// No command runs when the environment cannot be provisioned
#[tokio::test]
async fn test_provision_failure_runs_no_command() {
    let provisioner = MockProvisioner::new().with_failing_image("python:3.9");
    let result = run(SH_INTEGRATION, provisioner.clone()).await;

    assert_eq!(result.exit_code, 1);
    assert_job_failed(&result, JOB, FailureKind::EnvironmentProvision, 1);
    assert!(provisioner.commands_for(JOB).is_empty());
    assert_eq!(provisioner.teardowns_for(JOB), 0);
}

/// The pipeline exit code is the first failing job's, not a later one's
#[tokio::test]
async fn test_first_failure_determines_exit_code() {
    let yaml = r#"
image: alpine:3.19
lint:
  stage: build
  script: [ruff check .]
report:
  stage: deploy
  when: always
  script: [coverage report]
"#;
    let provisioner = MockProvisioner::new()
        .with_exit_code("ruff check .", 3)
        .with_exit_code("coverage report", 7);
    let result = run(yaml, provisioner).await;

    assert_job_failed(&result, "lint", FailureKind::TestCommand, 3);
    assert_job_failed(&result, "report", FailureKind::TestCommand, 7);
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.pipeline.state.exit_code, Some(3));
    assert_eq!(result.pipeline.state.failed_jobs, 2);
}
