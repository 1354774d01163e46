use anyhow::{Context, Result};
use ci_runner::cli::commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use ci_runner::cli::output::*;
use ci_runner::cli::terminal_output::TerminalReporter;
use ci_runner::cli::{Cli, Command};
use ci_runner::core::config::PipelineConfig;
use ci_runner::core::state::INTERRUPTED_EXIT_CODE;
use ci_runner::environment::{
    DockerProvisioner, LocalProvisioner, ProvisionerKind, Provisioner, RunnerConfig,
};
use ci_runner::execution::{ExecutionEngine, StageScheduler};
use ci_runner::persistence::{
    record_execution, ExecutionStatus, ExecutionSummary, PersistenceBackend,
};
use ci_runner::Pipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => {
            let exit_code = run_pipeline(cmd, cli.quiet).await?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::List(cmd) => list_pipelines(cmd).await?,
        Command::History(cmd) => show_history(cmd, cli.verbose).await?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand, quiet: bool) -> Result<i32> {
    // Load pipeline config
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let mut pipeline = config.to_pipeline()?;

    println!("{}Loaded pipeline: {}", INFO, style(&pipeline.name).bold());

    // Apply variable overrides
    for (key, value) in &cmd.variable {
        pipeline.set_variable(key.clone(), value.clone());
        println!(
            "{}Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let scheduler = StageScheduler::new()
        .with_manual_jobs(cmd.manual.iter().cloned())
        .with_selected_jobs(cmd.job.iter().cloned());
    scheduler.validate(&pipeline)?;

    let project_dir = cmd
        .project_dir
        .clone()
        .unwrap_or_else(|| default_project_dir(Path::new(&cmd.file)));
    let runner_config = RunnerConfig::new()
        .with_provisioner(cmd.provisioner.into())
        .with_pull_policy(cmd.pull_policy.into())
        .with_docker_path(cmd.docker.clone())
        .with_shell(cmd.shell.clone())
        .with_project_dir(project_dir);

    // Set up persistence; an unavailable history never fails the run
    let store = if cmd.no_history {
        None
    } else {
        match history_store().await {
            Ok(store) => Some(store),
            Err(e) => {
                warn!("History is unavailable, this run will not be recorded: {:#}", e);
                None
            }
        }
    };

    println!();
    let exit_code = match runner_config.provisioner {
        ProvisionerKind::Docker => {
            let provisioner = DockerProvisioner::from_config(&runner_config);
            execute_with(provisioner, scheduler, &mut pipeline, quiet).await
        }
        ProvisionerKind::Local => {
            let provisioner = LocalProvisioner::from_config(&runner_config);
            execute_with(provisioner, scheduler, &mut pipeline, quiet).await
        }
    };

    // Save to history
    if let Some(store) = &store {
        if let Some(summary) = record_execution(store.as_ref(), &pipeline).await {
            println!(
                "\n{}Execution saved to history (ID: {})",
                INFO,
                style(&summary.execution_id.to_string()[..8]).dim()
            );
        }
    }

    // Print final status
    match pipeline.state.status {
        ExecutionStatus::Succeeded => println!(
            "\n{}{} {}",
            CHECK,
            style(&pipeline.name).bold(),
            style("passed").green()
        ),
        ExecutionStatus::Cancelled => println!(
            "\n{}{} {}",
            WARN,
            style(&pipeline.name).bold(),
            style("was interrupted").yellow()
        ),
        _ => {
            let failed_job = pipeline
                .first_failure()
                .map(|job| job.name.clone())
                .unwrap_or_default();
            println!(
                "\n{}{} {} at job {} (exit code {})",
                CROSS,
                style(&pipeline.name).bold(),
                style("failed").red(),
                style(failed_job).bold(),
                exit_code
            );
        }
    }

    Ok(exit_code)
}

/// Run the pipeline with a concrete provisioner, reporting to the terminal
async fn execute_with<P: Provisioner>(
    provisioner: P,
    scheduler: StageScheduler,
    pipeline: &mut Pipeline,
    quiet: bool,
) -> i32 {
    let engine = ExecutionEngine::new(provisioner, scheduler);

    let reporter = Arc::new(TerminalReporter::new(quiet));
    engine.add_event_handler(move |event| reporter.handle(&event));

    let interrupt = engine.interrupt_handle();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, stopping pipeline");
        interrupt.trigger();

        // A second interrupt gives up on cleanup
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}Interrupted again, exiting without cleanup", WARN);
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    let exit_code = engine.execute(pipeline).await;
    signal_task.abort();

    exit_code
}

/// Commands run in the directory holding the pipeline file
fn default_project_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(feature = "sqlite")]
async fn history_store() -> Result<Arc<dyn PersistenceBackend>> {
    let store = ci_runner::persistence::SqliteExecutionStore::with_default_path().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn history_store() -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(ci_runner::persistence::InMemoryPersistence::new()))
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    if !cmd.json {
        println!("{}Validating pipeline...", INFO);
    }

    let result = PipelineConfig::from_file(&cmd.file).and_then(|config| config.to_pipeline());

    match result {
        Ok(pipeline) => {
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&pipeline_json(&pipeline))?);
                return Ok(());
            }

            println!("{}Pipeline definition is valid!", CHECK);
            println!("  Name: {}", style(&pipeline.name).bold());
            println!("  Stages: {}", style(pipeline.stages.join(" → ")).cyan());
            println!("  Jobs: {}", style(pipeline.jobs.len()).cyan());
            println!("  Variables: {}", style(pipeline.variables.len()).cyan());
            for job in &pipeline.jobs {
                println!(
                    "    {} [{}] {} on {} ({} commands)",
                    style(&job.name).bold(),
                    job.stage,
                    style(job.when).dim(),
                    job.image,
                    job.command_count()
                );
            }
            Ok(())
        }
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn pipeline_json(pipeline: &Pipeline) -> serde_json::Value {
    let jobs: Vec<_> = pipeline
        .jobs
        .iter()
        .map(|job| {
            serde_json::json!({
                "name": job.name,
                "stage": job.stage,
                "when": job.when,
                "image": job.image,
                "before_script": job.before_script,
                "script": job.script,
                "variables": job.variables,
                "timeout_secs": job.timeout_secs,
            })
        })
        .collect();

    serde_json::json!({
        "name": pipeline.name,
        "stages": pipeline.stages,
        "variables": pipeline.variables,
        "jobs": jobs,
    })
}

async fn list_pipelines(cmd: &ListCommand) -> Result<()> {
    let store = history_store().await?;
    let pipelines = store.list_pipelines().await?;

    if cmd.json {
        let mut json_data = Vec::new();
        for pipeline in &pipelines {
            let executions = store.list_executions(pipeline).await?;
            json_data.push(serde_json::json!({
                "name": pipeline,
                "execution_count": executions.len(),
            }));
        }
        let data = serde_json::json!({ "pipelines": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if pipelines.is_empty() {
        println!("{}No pipelines found in history", INFO);
        return Ok(());
    }

    println!("{}Pipelines in history:", INFO);

    for pipeline_name in &pipelines {
        if cmd.with_counts {
            let executions = store.list_executions(pipeline_name).await?;
            let passed = executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Succeeded)
                .count();
            let failed = executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Failed)
                .count();
            println!(
                "  {} ({} runs: {} passed, {} failed)",
                style(pipeline_name).bold(),
                style(executions.len()).cyan(),
                style(passed).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand, verbose: bool) -> Result<()> {
    let store = history_store().await?;

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id =
            uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        match store.load_execution(exec_id).await? {
            Some(summary) if cmd.json => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Some(summary) => print_execution_details(&summary, verbose)?,
            None => println!("{}Execution not found", WARN),
        }
        return Ok(());
    }

    // List executions for pipeline or all
    let mut executions = if let Some(pipeline_name) = &cmd.pipeline {
        store.list_executions(pipeline_name).await?
    } else {
        let mut all_execs = Vec::new();
        for pipeline in store.list_pipelines().await? {
            all_execs.extend(store.list_executions(&pipeline).await?);
        }
        all_execs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all_execs
    };
    executions.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!("{}No executions found", INFO);
        return Ok(());
    }

    println!("{}Execution history (showing latest {}):", INFO, cmd.limit);
    for summary in &executions {
        if verbose {
            println!("  {}", format_execution_details(summary));
        } else {
            println!("  {}", format_execution_summary(summary));
        }
    }

    Ok(())
}

fn print_execution_details(summary: &ExecutionSummary, verbose: bool) -> Result<()> {
    println!("{}Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    if let Some(exit_code) = summary.exit_code {
        println!("  Exit code: {}", style(exit_code).cyan());
    }
    if let Some(job) = &summary.failed_job {
        println!("  First failure: {}", style(job).red());
    }
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Jobs: {} passed, {} failed, {} skipped of {}",
        style(summary.succeeded_jobs).green(),
        style(summary.failed_jobs).red(),
        style(summary.skipped_jobs).dim(),
        summary.total_jobs
    );

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
