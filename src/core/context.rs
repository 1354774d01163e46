//! Job context - the variables a job's commands see

use crate::core::{image::ImageRef, job::Job, pipeline::Pipeline};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Execution context for one job
///
/// Variables are layered: predefined `CI_*` values, then global variables,
/// then job variables, then overrides given on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    /// Name of the job
    pub job_name: String,

    /// Image with variable references expanded
    pub image: ImageRef,

    /// Environment exported to every command
    pub variables: HashMap<String, String>,
}

impl JobContext {
    /// Build the context for a job of a pipeline
    pub fn for_job(pipeline: &Pipeline, job: &Job, project_dir: &str) -> Self {
        let mut variables = HashMap::new();

        variables.insert("CI".to_string(), "true".to_string());
        variables.insert(
            "CI_PIPELINE_ID".to_string(),
            pipeline.state.execution_id.to_string(),
        );
        variables.insert("CI_PIPELINE_NAME".to_string(), pipeline.name.clone());
        variables.insert("CI_JOB_NAME".to_string(), job.name.clone());
        variables.insert("CI_JOB_STAGE".to_string(), job.stage.clone());
        variables.insert("CI_PROJECT_DIR".to_string(), project_dir.to_string());

        variables.extend(pipeline.variables.clone());
        variables.extend(job.variables.clone());
        variables.extend(pipeline.overrides.clone());

        let image = job.image.expand(&variables);
        variables.insert("CI_JOB_IMAGE".to_string(), image.to_string());

        Self {
            job_name: job.name.clone(),
            image,
            variables,
        }
    }

    /// Get a variable
    pub fn get_variable(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }
}

fn variable_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("valid variable reference pattern")
    })
}

/// Replace `$VAR` and `${VAR}` with their values; undefined variables expand to nothing
pub fn expand_variables(input: &str, variables: &HashMap<String, String>) -> String {
    variable_reference_pattern()
        .replace_all(input, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            variables.get(name).cloned().unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PipelineConfig;

    fn pipeline(yaml: &str) -> Pipeline {
        PipelineConfig::from_yaml(yaml).unwrap().to_pipeline().unwrap()
    }

    #[test]
    fn test_expand_both_forms() {
        let mut vars = HashMap::new();
        vars.insert("REGISTRY".to_string(), "registry.example.com".to_string());
        vars.insert("TAG".to_string(), "3.9".to_string());

        assert_eq!(
            expand_variables("$REGISTRY/python:${TAG}", &vars),
            "registry.example.com/python:3.9"
        );
    }

    #[test]
    fn test_expand_undefined_is_empty() {
        let vars = HashMap::new();
        assert_eq!(expand_variables("python:${MISSING}3.9", &vars), "python:3.9");
        assert_eq!(expand_variables("no references", &vars), "no references");
    }

    #[test]
    fn test_variable_layering() {
        let mut pipeline = pipeline(
            r#"
image: python:3.9
variables:
  SHARED: global
  GLOBAL_ONLY: g
job:
  variables:
    SHARED: job
  script: [env]
"#,
        );
        pipeline.set_variable("GLOBAL_ONLY".to_string(), "cli".to_string());

        let job = pipeline.job("job").unwrap().clone();
        let ctx = JobContext::for_job(&pipeline, &job, "/builds/project");

        assert_eq!(ctx.get_variable("SHARED"), Some(&"job".to_string()));
        assert_eq!(ctx.get_variable("GLOBAL_ONLY"), Some(&"cli".to_string()));
        assert_eq!(ctx.get_variable("CI"), Some(&"true".to_string()));
        assert_eq!(ctx.get_variable("CI_JOB_NAME"), Some(&"job".to_string()));
        assert_eq!(ctx.get_variable("CI_JOB_STAGE"), Some(&"test".to_string()));
        assert_eq!(
            ctx.get_variable("CI_PROJECT_DIR"),
            Some(&"/builds/project".to_string())
        );
        assert_eq!(
            ctx.get_variable("CI_PIPELINE_ID"),
            Some(&pipeline.state.execution_id.to_string())
        );
    }

    #[test]
    fn test_image_expanded_from_variables() {
        let pipeline = pipeline(
            r#"
image: python:$PY_VERSION
variables:
  PY_VERSION: "3.9"
job:
  script: [python --version]
"#,
        );

        let job = pipeline.job("job").unwrap().clone();
        let ctx = JobContext::for_job(&pipeline, &job, ".");

        assert_eq!(ctx.image.as_str(), "python:3.9");
        assert_eq!(ctx.get_variable("CI_JOB_IMAGE"), Some(&"python:3.9".to_string()));
    }
}
