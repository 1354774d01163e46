//! What running a command produces

use std::time::Duration;

/// Which stream an output line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Result of running one command to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit status of the command
    pub exit_code: i32,

    /// Wall-clock time the command took
    pub duration: Duration,
}

impl CommandOutcome {
    pub fn new(exit_code: i32, duration: Duration) -> Self {
        Self { exit_code, duration }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
