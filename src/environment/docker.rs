//! Docker provisioner - one container per job, driven through the docker CLI

use crate::environment::{
    process, CommandOutcome, Environment, EnvironmentError, EnvironmentSpec, OutputSink,
    Provisioner, PullPolicy, RunnerConfig,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Provisioner that starts a long-lived container per job and runs each
/// command in it with `docker exec`
///
/// The project directory is bind-mounted at the builds directory, which is
/// also the working directory of every command.
#[derive(Debug, Clone)]
pub struct DockerProvisioner {
    docker_path: String,
    shell: String,
    pull_policy: PullPolicy,
    project_dir: PathBuf,
    builds_dir: String,
}

impl DockerProvisioner {
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            docker_path: config.docker_path.clone(),
            shell: config.shell.clone(),
            pull_policy: config.pull_policy,
            project_dir: config.project_dir.clone(),
            builds_dir: config.builds_dir.clone(),
        }
    }

    fn docker(&self) -> Command {
        Command::new(&self.docker_path)
    }

    /// Container names only allow `[a-zA-Z0-9_.-]`
    fn container_name(job_name: &str) -> String {
        let job: String = job_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' { c } else { '-' })
            .collect();
        format!("ci-runner-{}-{}", job, &Uuid::new_v4().simple().to_string()[..8])
    }

    async fn image_present(&self, image: &str) -> Result<bool, EnvironmentError> {
        let output =
            process::run_captured(self.docker().args(["image", "inspect", image])).await?;
        Ok(output.status.success())
    }

    async fn ensure_image(&self, image: &str) -> Result<(), EnvironmentError> {
        let pull = match self.pull_policy {
            PullPolicy::Always => true,
            PullPolicy::IfNotPresent => !self.image_present(image).await?,
            PullPolicy::Never => {
                if !self.image_present(image).await? {
                    return Err(EnvironmentError::Provision {
                        image: image.to_string(),
                        reason: "image is not present locally and pull policy is 'never'"
                            .to_string(),
                    });
                }
                false
            }
        };

        if !pull {
            debug!("Using local copy of image {}", image);
            return Ok(());
        }

        info!("Pulling image {}", image);
        let output = process::run_captured(self.docker().args(["pull", image])).await?;
        if !output.status.success() {
            return Err(EnvironmentError::Provision {
                image: image.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Provisioner for DockerProvisioner {
    async fn provision(&self, spec: &EnvironmentSpec) -> Result<Box<dyn Environment>, EnvironmentError> {
        let image = spec.image.as_str();
        self.ensure_image(image).await?;

        let project_dir = self.project_dir.canonicalize().map_err(|e| {
            EnvironmentError::Provision {
                image: image.to_string(),
                reason: format!("project directory {}: {}", self.project_dir.display(), e),
            }
        })?;

        let name = Self::container_name(&spec.job_name);
        let mut guard = ContainerGuard::new(&self.docker_path, &name);
        let volume = format!("{}:{}", project_dir.display(), self.builds_dir);
        let mut command = self.docker();
        command
            .args(["run", "--detach", "--interactive", "--entrypoint", ""])
            .args(["--name", name.as_str()])
            .args(["--volume", volume.as_str()])
            .args(["--workdir", self.builds_dir.as_str()]);

        let mut variables: Vec<_> = spec.variables.iter().collect();
        variables.sort();
        for (key, value) in variables {
            command.arg("--env").arg(format!("{}={}", key, value));
        }

        // An interactive shell with open stdin keeps the container alive
        command.arg(image).arg(&self.shell);

        let output = process::run_captured(&mut command).await?;
        if !output.status.success() {
            return Err(EnvironmentError::Provision {
                image: image.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        guard.release();
        info!("Started container {} from {}", name, image);

        Ok(Box::new(DockerEnvironment {
            docker_path: self.docker_path.clone(),
            shell: self.shell.clone(),
            container: name,
        }))
    }

    fn project_dir(&self) -> String {
        self.builds_dir.clone()
    }
}

/// Removes a container whose start was abandoned or failed
struct ContainerGuard {
    docker_path: String,
    name: Option<String>,
}

impl ContainerGuard {
    fn new(docker_path: &str, name: &str) -> Self {
        Self {
            docker_path: docker_path.to_string(),
            name: Some(name.to_string()),
        }
    }

    fn release(&mut self) {
        self.name = None;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };

        // Not awaited; may outlive the runtime
        let spawned = std::process::Command::new(&self.docker_path)
            .args(["rm", "--force", name.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(_) => debug!("Removing abandoned container {}", name),
            Err(e) => warn!("Failed to remove abandoned container {}: {}", name, e),
        }
    }
}

/// A running container owned by one job
#[derive(Debug)]
struct DockerEnvironment {
    docker_path: String,
    shell: String,
    container: String,
}

#[async_trait]
impl Environment for DockerEnvironment {
    fn id(&self) -> &str {
        &self.container
    }

    async fn run(
        &self,
        command: &str,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutcome, EnvironmentError> {
        let mut exec = Command::new(&self.docker_path);
        exec.arg("exec")
            .arg(&self.container)
            .arg(&self.shell)
            .arg("-c")
            .arg(command);

        process::run_streaming(exec, sink).await
    }

    async fn teardown(&self) -> Result<(), EnvironmentError> {
        let output = process::run_captured(
            Command::new(&self.docker_path).args(["rm", "--force", self.container.as_str()]),
        )
        .await?;

        if !output.status.success() {
            let reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("Failed to remove container {}: {}", self.container, reason);
            return Err(EnvironmentError::Teardown {
                id: self.container.clone(),
                reason,
            });
        }

        debug!("Removed container {}", self.container);
        Ok(())
    }
}
