//! Live terminal reporting of a pipeline run
//!
//! [`TerminalReporter`] turns execution events into terminal output:
//!
//! - A separator and header per stage
//! - Job headers with progress: `[2/3] unit on python:3.9`
//! - Each command echoed as `$ command`, followed by its output as it arrives
//! - In quiet mode, a spinner per command instead of its output
//!
//! # Example
//!
//! ```no_run
//! use ci_runner::cli::terminal_output::TerminalReporter;
//! use ci_runner::execution::ExecutionEvent;
//! use std::sync::Arc;
//!
//! let reporter = Arc::new(TerminalReporter::new(false));
//! let handler = move |event: ExecutionEvent| reporter.handle(&event);
//! # let _ = handler;
//! ```

use crate::cli::output::{create_spinner, format_execution_event, style};
use crate::environment::OutputStream;
use crate::execution::ExecutionEvent;
use indicatif::ProgressBar;
use std::fmt::Display;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Prints execution events to the terminal as they happen
///
/// Write errors are ignored, so a closed stdout (`ci-runner run | head`)
/// never interrupts a running job.
pub struct TerminalReporter {
    quiet: bool,
    job_number: AtomicUsize,
    total_jobs: AtomicUsize,
    spinner: Mutex<Option<ProgressBar>>,
    out: Mutex<Box<dyn Write + Send>>,
    err: Mutex<Box<dyn Write + Send>>,
}

impl TerminalReporter {
    /// Create a reporter; `quiet` hides command output behind a spinner
    pub fn new(quiet: bool) -> Self {
        Self::with_writers(quiet, Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// Create a reporter writing to the given streams instead of stdout/stderr
    pub fn with_writers(
        quiet: bool,
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            quiet,
            job_number: AtomicUsize::new(0),
            total_jobs: AtomicUsize::new(0),
            spinner: Mutex::new(None),
            out: Mutex::new(out),
            err: Mutex::new(err),
        }
    }

    /// Handle one event
    pub fn handle(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::PipelineStarted { total_jobs, .. } => {
                self.total_jobs.store(*total_jobs, Ordering::SeqCst);
                self.job_number.store(0, Ordering::SeqCst);
                self.line(format_execution_event(event));
            }
            ExecutionEvent::StageStarted { .. } => {
                self.print_separator();
                self.line(format_execution_event(event));
            }
            ExecutionEvent::JobStarted { .. } => {
                let number = self.job_number.fetch_add(1, Ordering::SeqCst) + 1;
                self.line(format!(
                    "\n{} {}",
                    self.job_progress(number),
                    format_execution_event(event)
                ));
            }
            ExecutionEvent::JobSkipped { .. } => {
                self.job_number.fetch_add(1, Ordering::SeqCst);
                self.line(format_execution_event(event));
            }
            ExecutionEvent::CommandStarted { command, .. } => {
                self.line(format_execution_event(event));
                if self.quiet {
                    self.start_spinner(command.clone());
                }
            }
            ExecutionEvent::CommandOutput { stream, line, .. } => {
                if !self.quiet {
                    self.print_output(*stream, line);
                }
            }
            ExecutionEvent::CommandFinished { exit_code, .. } => {
                self.finish_spinner();
                if *exit_code != 0 || self.quiet {
                    self.line(format!("  {}", format_execution_event(event)));
                }
            }
            ExecutionEvent::PipelineCompleted { .. } => {
                self.finish_spinner();
                self.print_separator();
                self.line(format_execution_event(event));
            }
            _ => self.line(format_execution_event(event)),
        }
        self.flush_stdout();
    }

    fn job_progress(&self, number: usize) -> String {
        let total = self.total_jobs.load(Ordering::SeqCst);
        format!("[{}/{}]", style(number).cyan(), style(total).dim())
    }

    fn line(&self, text: impl Display) {
        write_line(&self.out, text);
    }

    fn print_output(&self, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => write_line(&self.out, line),
            OutputStream::Stderr => write_line(&self.err, line),
        }
    }

    fn start_spinner(&self, command: String) {
        let mut spinner = self.spinner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = spinner.take() {
            previous.finish_and_clear();
        }
        *spinner = Some(create_spinner(command));
    }

    fn finish_spinner(&self) {
        let mut spinner = self.spinner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(spinner) = spinner.take() {
            spinner.finish_and_clear();
        }
    }

    /// Horizontal rule spanning the terminal width
    fn print_separator(&self) {
        let width = term_size::dimensions_stdout()
            .map(|(w, _)| w)
            .unwrap_or(80);
        self.line(style("─".repeat(width)).dim());
    }

    fn flush_stdout(&self) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let _ = out.flush();
    }
}

fn write_line(writer: &Mutex<Box<dyn Write + Send>>, text: impl Display) {
    let mut writer = writer.lock().unwrap_or_else(|e| e.into_inner());
    let _ = writeln!(writer, "{}", text);
}
