//! Test: stage ordering and `when` triggers

use crate::helpers::*;
use ci_runner::execution::StageScheduler;

const PIPELINE: &str = r#"
image: alpine:3.19
stages: [build, test, deploy]
compile:
  stage: build
  script: [make]
unit:
  stage: test
  script: [make test]
cleanup:
  stage: deploy
  when: always
  script: [make clean]
publish:
  stage: deploy
  when: manual
  script: [make publish]
"#;

fn job_order(provisioner: &MockProvisioner) -> Vec<String> {
    provisioner
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Provision { job, .. } => Some(job),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_jobs_run_in_stage_order() {
    let provisioner = MockProvisioner::new();
    let result = run(PIPELINE, provisioner.clone()).await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(job_order(&provisioner), vec!["compile", "unit", "cleanup"]);
    assert_job_skipped(&result, "publish");
}

#[tokio::test]
async fn test_failure_stops_on_success_jobs_only() {
    let provisioner = MockProvisioner::new().with_exit_code("make", 2);
    let result = run(PIPELINE, provisioner.clone()).await;

    assert_eq!(result.exit_code, 2);
    assert_job_skipped(&result, "unit");
    assert_job_succeeded(&result, "cleanup");
    assert_eq!(job_order(&provisioner), vec!["compile", "cleanup"]);
    assert_eq!(result.skipped_jobs(), vec!["unit", "publish"]);
}

#[tokio::test]
async fn test_requested_manual_job_runs() {
    let provisioner = MockProvisioner::new();
    let scheduler = StageScheduler::new().with_manual_jobs(["publish".to_string()]);
    let result = run_with(pipeline_from_yaml(PIPELINE), provisioner.clone(), scheduler).await;

    assert_eq!(result.exit_code, 0);
    assert_job_succeeded(&result, "publish");
    assert_eq!(provisioner.commands_for("publish"), vec!["make publish"]);
}

#[tokio::test]
async fn test_selected_jobs_only() {
    let provisioner = MockProvisioner::new();
    let scheduler = StageScheduler::new().with_selected_jobs(["unit".to_string()]);
    let result = run_with(pipeline_from_yaml(PIPELINE), provisioner.clone(), scheduler).await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(job_order(&provisioner), vec!["unit"]);
    assert_eq!(result.pipeline.state.skipped_jobs, 3);
}

#[tokio::test]
async fn test_skipped_manual_job_does_not_fail_pipeline() {
    let result = run(PIPELINE, MockProvisioner::new()).await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.pipeline.state.succeeded_jobs, 3);
    assert_eq!(result.pipeline.state.skipped_jobs, 1);
}
