//! Pipeline configuration from YAML
//!
//! The format follows `.gitlab-ci.yml`: a handful of reserved top-level
//! keywords, and every other top-level key is a job.

use crate::core::{image::ImageRef, Pipeline};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

/// Stages used when the file does not declare `stages`
pub const DEFAULT_STAGES: &[&str] = &[".pre", "build", "test", "deploy", ".post"];

/// Stage a job lands in when it does not declare one
pub const DEFAULT_JOB_STAGE: &str = "test";

/// Top-level keywords that are recognised but have no effect here
const IGNORED_KEYWORDS: &[&str] = &["after_script", "cache", "include", "services"];

/// Variable definition - a plain value or a value with a description
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableDefinition {
    /// Plain value (`KEY: value`)
    Value(String),
    /// Documented value (`KEY: { value: ..., description: ... }`)
    Described { value: String, description: String },
}

impl VariableDefinition {
    /// Get the value exported to commands
    pub fn render_value(&self) -> String {
        match self {
            VariableDefinition::Value(value) => value.clone(),
            VariableDefinition::Described { value, .. } => value.clone(),
        }
    }

    fn from_yaml(value: &Value) -> Self {
        match value {
            Value::Mapping(map) => {
                let value = map
                    .get("value")
                    .map(scalar_to_string)
                    .unwrap_or_default();
                let description = map
                    .get("description")
                    .map(scalar_to_string)
                    .unwrap_or_default();
                VariableDefinition::Described { value, description }
            }
            other => VariableDefinition::Value(scalar_to_string(other)),
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// A command list may be written as a single string or as a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandList {
    One(String),
    Many(Vec<String>),
}

impl CommandList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            CommandList::One(command) => vec![command.clone()],
            CommandList::Many(commands) => commands.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CommandList::One(_) => false,
            CommandList::Many(commands) => commands.is_empty(),
        }
    }
}

/// When a job runs relative to the outcome of earlier jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum When {
    /// Run regardless of earlier failures
    Always,
    /// Run only while every earlier job has succeeded
    #[default]
    OnSuccess,
    /// Run only when explicitly requested
    Manual,
}

impl std::fmt::Display for When {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            When::Always => f.write_str("always"),
            When::OnSuccess => f.write_str("on_success"),
            When::Manual => f.write_str("manual"),
        }
    }
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Base image for every job lacking an override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,

    /// Ordered stage names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<String>>,

    /// Global variables exported to all jobs
    #[serde(default)]
    variables: HashMap<String, Value>,

    /// Setup commands for every job lacking its own `before_script`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_script: Option<CommandList>,

    /// Pipeline-wide settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowConfig>,

    /// Job defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultConfig>,

    /// Everything else: jobs, hidden templates and ignored keywords
    #[serde(flatten)]
    entries: Mapping,

    /// Jobs in declaration order (parsed from `entries`)
    #[serde(skip)]
    pub jobs: Vec<JobConfig>,

    /// Name derived from the file location, used when `workflow.name` is absent
    #[serde(skip)]
    source_name: Option<String>,
}

/// `workflow:` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Pipeline name shown in output and history
    #[serde(default)]
    pub name: Option<String>,
}

/// `default:` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultConfig {
    #[serde(default)]
    pub image: Option<ImageRef>,

    #[serde(default)]
    pub before_script: Option<CommandList>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job name (the top-level key)
    #[serde(skip)]
    pub name: String,

    /// Stage this job belongs to
    #[serde(default = "default_job_stage")]
    pub stage: String,

    /// Trigger condition
    #[serde(default)]
    pub when: When,

    /// Image override
    #[serde(default)]
    pub image: Option<ImageRef>,

    /// Setup commands (overrides the global ones; an empty list disables them)
    #[serde(default)]
    pub before_script: Option<CommandList>,

    /// Main commands
    pub script: CommandList,

    /// Job variables (override global ones)
    #[serde(default)]
    variables: HashMap<String, Value>,

    /// Job timeout in seconds (none by default)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_job_stage() -> String {
    DEFAULT_JOB_STAGE.to_string()
}

impl JobConfig {
    /// Get job variables as string map
    pub fn variables_as_string_map(&self) -> HashMap<String, String> {
        render_variables(&self.variables)
    }
}

fn variable_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid variable name pattern"))
}

fn parse_variables(raw: &HashMap<String, Value>) -> HashMap<String, VariableDefinition> {
    raw.iter()
        .map(|(key, value)| (key.clone(), VariableDefinition::from_yaml(value)))
        .collect()
}

fn render_variables(raw: &HashMap<String, Value>) -> HashMap<String, String> {
    parse_variables(raw)
        .iter()
        .map(|(k, v)| (k.clone(), v.render_value()))
        .collect()
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config = Self::from_yaml(&content)?;
        config.source_name = Self::name_from_path(path);
        Ok(config)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: PipelineConfig =
            serde_yaml::from_str(yaml).context("Invalid pipeline YAML")?;
        config.jobs = config.parse_jobs()?;
        config.validate()?;
        Ok(config)
    }

    /// The directory holding the pipeline file names the pipeline
    fn name_from_path(path: &Path) -> Option<String> {
        path.canonicalize()
            .ok()
            .and_then(|p| p.parent().and_then(|d| d.file_name()).map(|n| n.to_string_lossy().into_owned()))
            .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
    }

    fn parse_jobs(&self) -> Result<Vec<JobConfig>> {
        let mut jobs = Vec::new();

        for (key, value) in &self.entries {
            let name = key
                .as_str()
                .with_context(|| format!("Top-level key {:?} is not a string", key))?;

            // Hidden keys are templates
            if name.starts_with('.') {
                continue;
            }
            if IGNORED_KEYWORDS.contains(&name) {
                warn!("Keyword '{}' is not supported and will be ignored", name);
                continue;
            }

            let mut job: JobConfig = serde_yaml::from_value(value.clone())
                .with_context(|| format!("Invalid job '{}'", name))?;
            job.name = name.to_string();
            jobs.push(job);
        }

        Ok(jobs)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            anyhow::bail!("Pipeline defines no jobs");
        }

        if let Some(declared) = &self.stages {
            for (index, stage) in declared.iter().enumerate() {
                let misplaced = match stage.as_str() {
                    ".pre" => index != 0,
                    ".post" => index + 1 != declared.len(),
                    _ => false,
                };
                if misplaced {
                    anyhow::bail!(
                        "Reserved stage '{}' must be declared {}",
                        stage,
                        if stage == ".pre" { "first" } else { "last" }
                    );
                }
            }
        }

        let stages = self.effective_stages();
        let mut seen_stages = HashSet::new();
        for stage in &stages {
            if stage.trim().is_empty() {
                anyhow::bail!("Stage names must not be empty");
            }
            if !seen_stages.insert(stage) {
                anyhow::bail!("Duplicate stage: {}", stage);
            }
        }

        for (name, _) in self.get_variables() {
            if !variable_name_pattern().is_match(&name) {
                anyhow::bail!("Invalid variable name: '{}'", name);
            }
        }

        for job in &self.jobs {
            if !seen_stages.contains(&job.stage) {
                anyhow::bail!(
                    "Job '{}' references undeclared stage '{}'",
                    job.name,
                    job.stage
                );
            }

            if job.script.is_empty() {
                anyhow::bail!("Job '{}' has an empty script", job.name);
            }

            let image = self.image_for(job).with_context(|| {
                format!(
                    "Job '{}' has no image (set `image` on the job or at the top level)",
                    job.name
                )
            })?;
            image
                .validate()
                .with_context(|| format!("Job '{}' has an invalid image", job.name))?;

            for name in parse_variables(&job.variables).keys() {
                if !variable_name_pattern().is_match(name) {
                    anyhow::bail!("Job '{}' has invalid variable name: '{}'", job.name, name);
                }
            }

            if job.timeout_secs == Some(0) {
                anyhow::bail!("Job '{}' has a zero timeout", job.name);
            }
        }

        if let Some(default) = &self.default {
            if default.timeout_secs == Some(0) {
                anyhow::bail!("Default timeout must be greater than zero");
            }
        }

        Ok(())
    }

    /// Stage order with the implicit `.pre`/`.post` stages in place
    pub fn effective_stages(&self) -> Vec<String> {
        match &self.stages {
            None => DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
            Some(declared) => {
                let mut stages = Vec::with_capacity(declared.len() + 2);
                if !declared.iter().any(|s| s == ".pre") {
                    stages.push(".pre".to_string());
                }
                stages.extend(declared.iter().cloned());
                if !declared.iter().any(|s| s == ".post") {
                    stages.push(".post".to_string());
                }
                stages
            }
        }
    }

    /// Image a job runs in: job override, then `default:`, then top level
    pub fn image_for<'a>(&'a self, job: &'a JobConfig) -> Option<&'a ImageRef> {
        job.image
            .as_ref()
            .or_else(|| self.default.as_ref().and_then(|d| d.image.as_ref()))
            .or(self.image.as_ref())
    }

    /// Setup commands a job runs: job override, then `default:`, then top level
    pub fn before_script_for(&self, job: &JobConfig) -> Vec<String> {
        job.before_script
            .as_ref()
            .or_else(|| self.default.as_ref().and_then(|d| d.before_script.as_ref()))
            .or(self.before_script.as_ref())
            .map(CommandList::to_vec)
            .unwrap_or_default()
    }

    /// Timeout a job runs with: job override, then `default:`
    pub fn timeout_for(&self, job: &JobConfig) -> Option<u64> {
        job.timeout_secs
            .or_else(|| self.default.as_ref().and_then(|d| d.timeout_secs))
    }

    /// Pipeline name: `workflow.name`, then the project directory, then a fallback
    pub fn name(&self) -> String {
        self.workflow
            .as_ref()
            .and_then(|w| w.name.clone())
            .or_else(|| self.source_name.clone())
            .unwrap_or_else(|| "pipeline".to_string())
    }

    /// Find a job by name
    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Get global variables as parsed definitions
    pub fn get_variables(&self) -> HashMap<String, VariableDefinition> {
        parse_variables(&self.variables)
    }

    /// Get global variables as string map
    pub fn variables_as_string_map(&self) -> HashMap<String, String> {
        render_variables(&self.variables)
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        Pipeline::from_config(self)
    }
}
