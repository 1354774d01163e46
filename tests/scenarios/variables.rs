//! Test: variables exported to job environments

use crate::helpers::*;

const PIPELINE: &str = r#"
image: python:${PYTHON_VERSION}
variables:
  PYTHON_VERSION: "3.9"
  PIP_CACHE_DIR:
    value: /cache/pip
    description: Where pip keeps downloads
  LOG_LEVEL: info
unit:
  variables:
    LOG_LEVEL: debug
  script: [pytest]
"#;

#[tokio::test]
async fn test_job_variables_override_globals() {
    let provisioner = MockProvisioner::new();
    run(PIPELINE, provisioner.clone()).await;

    let vars = provisioner.variables_for("unit");
    assert_eq!(vars.get("LOG_LEVEL").map(String::as_str), Some("debug"));
    assert_eq!(vars.get("PIP_CACHE_DIR").map(String::as_str), Some("/cache/pip"));
}

#[tokio::test]
async fn test_predefined_variables() {
    let provisioner = MockProvisioner::new();
    let result = run(PIPELINE, provisioner.clone()).await;

    let vars = provisioner.variables_for("unit");
    assert_eq!(vars.get("CI").map(String::as_str), Some("true"));
    assert_eq!(vars.get("CI_JOB_NAME").map(String::as_str), Some("unit"));
    assert_eq!(vars.get("CI_JOB_STAGE").map(String::as_str), Some("test"));
    assert_eq!(
        vars.get("CI_PROJECT_DIR").map(String::as_str),
        Some("/builds/project")
    );
    assert_eq!(
        vars.get("CI_PIPELINE_ID"),
        Some(&result.pipeline.state.execution_id.to_string())
    );
}

#[tokio::test]
async fn test_image_is_expanded_before_provisioning() {
    let provisioner = MockProvisioner::new();
    run(PIPELINE, provisioner.clone()).await;

    assert_eq!(provisioner.images(), vec!["python:3.9"]);
    assert_eq!(
        provisioner
            .variables_for("unit")
            .get("CI_JOB_IMAGE")
            .map(String::as_str),
        Some("python:3.9")
    );
}

#[tokio::test]
async fn test_command_line_overrides_win() {
    let provisioner = MockProvisioner::new();
    let mut pipeline = pipeline_from_yaml(PIPELINE);
    pipeline.set_variable("PYTHON_VERSION".to_string(), "3.12".to_string());
    pipeline.set_variable("LOG_LEVEL".to_string(), "warning".to_string());

    run_with(pipeline, provisioner.clone(), Default::default()).await;

    assert_eq!(provisioner.images(), vec!["python:3.12"]);
    assert_eq!(
        provisioner
            .variables_for("unit")
            .get("LOG_LEVEL")
            .map(String::as_str),
        Some("warning")
    );
}
