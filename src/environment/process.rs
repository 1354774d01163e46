//! Subprocess execution with line-by-line output streaming

use crate::environment::{CommandOutcome, EnvironmentError, OutputSink, OutputStream};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Run a command to completion, forwarding each output line to `sink`
///
/// The child is killed if the returned future is dropped.
pub(crate) async fn run_streaming(
    mut command: Command,
    sink: Option<&dyn OutputSink>,
) -> Result<CommandOutcome, EnvironmentError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let started = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|source| EnvironmentError::Spawn { program, source })?;
    let mut group = ProcessGroup::new(child.id());

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("child stderr was not captured"))?;

    let mut stdout = BufReader::new(stdout).split(b'\n');
    let mut stderr = BufReader::new(stderr).split(b'\n');
    let mut stdout_open = true;
    let mut stderr_open = true;

    while stdout_open || stderr_open {
        tokio::select! {
            segment = stdout.next_segment(), if stdout_open => match segment? {
                Some(bytes) => emit(sink, OutputStream::Stdout, &bytes),
                None => stdout_open = false,
            },
            segment = stderr.next_segment(), if stderr_open => match segment? {
                Some(bytes) => emit(sink, OutputStream::Stderr, &bytes),
                None => stderr_open = false,
            },
        }
    }

    let status = child.wait().await?;
    group.release();
    let outcome = CommandOutcome::new(exit_code(status), started.elapsed());
    debug!(
        "Process exited with code {} after {:?}",
        outcome.exit_code, outcome.duration
    );

    Ok(outcome)
}

/// Run a command to completion and capture its output without streaming
pub(crate) async fn run_captured(
    command: &mut Command,
) -> Result<std::process::Output, EnvironmentError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    command
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| EnvironmentError::Spawn { program, source })
}

/// Kills every process in the child's group unless released first
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    id: Option<u32>,
}

impl ProcessGroup {
    fn new(id: Option<u32>) -> Self {
        Self { id }
    }

    fn release(&mut self) {
        self.id = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if let Some(id) = self.id.take() {
                debug!("Killing process group {}", id);
                // SAFETY: killpg has no memory-safety preconditions
                unsafe {
                    libc::killpg(id as libc::pid_t, libc::SIGKILL);
                }
            }
        }
    }
}

fn emit(sink: Option<&dyn OutputSink>, stream: OutputStream, bytes: &[u8]) {
    if let Some(sink) = sink {
        let line = String::from_utf8_lossy(bytes);
        sink.on_line(stream, line.trim_end_matches('\r'));
    }
}

/// Exit code of a finished process; signals map to `128 + signal`
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        lines: Mutex<Vec<(OutputStream, String)>>,
    }

    impl OutputSink for Collect {
        fn on_line(&self, stream: OutputStream, line: &str) {
            self.lines.lock().unwrap().push((stream, line.to_string()));
        }
    }

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[tokio::test]
    async fn test_streams_stdout_and_stderr() {
        let sink = Collect::default();
        let outcome = run_streaming(sh("echo out; echo err >&2; printf partial"), Some(&sink))
            .await
            .unwrap();

        assert!(outcome.success());
        let lines = sink.lines.lock().unwrap();
        assert!(lines.contains(&(OutputStream::Stdout, "out".to_string())));
        assert!(lines.contains(&(OutputStream::Stderr, "err".to_string())));
        assert!(lines.contains(&(OutputStream::Stdout, "partial".to_string())));
    }

    #[tokio::test]
    async fn test_reports_exit_code() {
        let outcome = run_streaming(sh("exit 100"), None).await.unwrap();
        assert_eq!(outcome.exit_code, 100);
    }

    #[tokio::test]
    async fn test_signal_maps_to_128_plus_signal() {
        let outcome = run_streaming(sh("kill -9 $$"), None).await.unwrap();
        assert_eq!(outcome.exit_code, 137);
    }

    #[tokio::test]
    async fn test_abandoned_command_kills_background_processes() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("after-abandon");
        let script = format!("(sleep 1; touch {}) & wait", marker.display());

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            run_streaming(sh(&script), None),
        )
        .await;
        assert!(result.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let result = run_streaming(Command::new("nonexistent-ci-runner-binary"), None).await;
        assert!(matches!(result, Err(EnvironmentError::Spawn { .. })));
    }
}
