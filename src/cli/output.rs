//! CLI output formatting

use crate::{
    core::{ExecutionStatus, JobState},
    execution::ExecutionEvent,
    persistence::ExecutionSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a spinner for a running command
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.green} [{elapsed}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a job state for display
pub fn format_job_state(state: &JobState) -> String {
    match state {
        JobState::Pending => style("PENDING").dim().to_string(),
        JobState::Running { .. } => style("RUNNING").yellow().to_string(),
        JobState::Succeeded { .. } => style("PASSED").green().to_string(),
        JobState::Failed { failure, .. } => {
            style(format!("FAILED ({})", failure.exit_code)).red().to_string()
        }
        JobState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("PASSED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Succeeded => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Cancelled => WARN,
        ExecutionStatus::Pending => INFO,
    };

    let exit_code = summary
        .exit_code
        .map(|code| format!("exit {}", code))
        .unwrap_or_else(|| "running".to_string());

    format!(
        "{}{} - {} - {} ({}/{} passed) - {} - {}",
        status_icon,
        style(short_id(&summary.execution_id.to_string())).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.succeeded_jobs,
        summary.total_jobs,
        style(exit_code).cyan(),
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

/// Format every recorded detail of an execution
pub fn format_execution_details(summary: &ExecutionSummary) -> String {
    let mut lines = vec![
        format_execution_summary(summary),
        format!("    execution id: {}", summary.execution_id),
        format!(
            "    jobs: {} passed, {} failed, {} skipped of {}",
            summary.succeeded_jobs, summary.failed_jobs, summary.skipped_jobs, summary.total_jobs
        ),
    ];

    if let Some(job) = &summary.failed_job {
        lines.push(format!("    first failure: {}", style(job).red()));
    }
    if let Some(completed_at) = summary.completed_at {
        let elapsed = completed_at - summary.started_at;
        lines.push(format!(
            "    duration: {:.1}s",
            elapsed.num_milliseconds() as f64 / 1000.0
        ));
    }

    lines.join("\n")
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            total_jobs,
        } => format!(
            "{}Starting pipeline {} ({}, {} jobs)",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(&execution_id.to_string())).dim(),
            total_jobs
        ),
        ExecutionEvent::StageStarted { stage, jobs } => format!(
            "Stage {} ({} {})",
            style(stage).bold().underlined(),
            jobs,
            if *jobs == 1 { "job" } else { "jobs" }
        ),
        ExecutionEvent::JobStarted {
            job_name, image, ..
        } => format!("{}{} on {}", SPINNER, style(job_name).cyan(), style(image).dim()),
        ExecutionEvent::EnvironmentProvisioned {
            environment_id, ..
        } => format!("{}Environment {}", INFO, style(environment_id).dim()),
        ExecutionEvent::CommandStarted { command, .. } => {
            format!("{} {}", style("$").green().bold(), style(command).bold())
        }
        ExecutionEvent::CommandOutput { line, .. } => line.clone(),
        ExecutionEvent::CommandFinished {
            exit_code,
            duration,
            ..
        } => {
            let text = format!("exit {} in {:.2}s", exit_code, duration.as_secs_f64());
            if *exit_code == 0 {
                style(text).dim().to_string()
            } else {
                style(text).red().to_string()
            }
        }
        ExecutionEvent::JobSucceeded {
            job_name,
            commands_run,
        } => format!(
            "{}{} passed ({} commands)",
            CHECK,
            style(job_name).green(),
            commands_run
        ),
        ExecutionEvent::JobFailed { job_name, failure } => format!(
            "{}{} failed: {} {}",
            CROSS,
            style(job_name).red(),
            failure.message,
            style(format!("[{}]", failure.kind)).dim()
        ),
        ExecutionEvent::JobSkipped { job_name, reason } => {
            format!("{}{} skipped: {}", SKIP, style(job_name).dim(), reason)
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
            exit_code,
        } => format!(
            "{}Pipeline ({}) {} with exit code {}",
            INFO,
            style(short_id(&execution_id.to_string())).dim(),
            format_status(*status),
            exit_code
        ),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
