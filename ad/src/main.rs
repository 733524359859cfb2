//! ActionDispatch - capability-aware action scheduler
//!
//! CLI entry point for registering workers, submitting actions and operating
//! the dispatch queues.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use actiondispatch::balancer;
use actiondispatch::cli::{ActionCommand, Cli, Command, OutputFormat, QueueCommand, WorkerCommand, get_log_path};
use actiondispatch::config::Config;
use actiondispatch::domain::{Action, ActionState, ResourceRequirement, Worker};
use actiondispatch::matcher;
use actiondispatch::queue::{DispatchJob, JobLifecycle, JobState, StoreDispatchQueue};
use actiondispatch::scheduler::{ActionScheduler, ScheduleOutcome, WorkerDirectory};
use actiondispatch::state::StateManager;

fn setup_logging(level: tracing::Level) -> Result<()> {
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

/// CLI flag, then config, then INFO
fn resolve_log_level(cli: Option<&str>, config: Option<&str>) -> Result<tracing::Level> {
    match cli.or(config) {
        Some(level) => level
            .parse()
            .map_err(|_| eyre::eyre!("Unknown log level: {}", level)),
        None => Ok(tracing::Level::INFO),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Setup logging
    let level = resolve_log_level(cli.log_level.as_deref(), config.log_level.as_deref())?;
    setup_logging(level).context("Failed to setup logging")?;

    let store_path = cli.store.clone().unwrap_or_else(|| config.storage.expanded_path());
    info!(store = %store_path.display(), "ActionDispatch starting");

    let state = StateManager::spawn(&store_path)
        .with_context(|| format!("Failed to open store at {}", store_path.display()))?;
    let queue = StoreDispatchQueue::new(state.clone());

    let result = match cli.command {
        Command::Worker { command } => match command {
            WorkerCommand::Register {
                identifier,
                hostname,
                cpu_cores,
                cpu_memory,
                gpu_memory,
                unreachable,
            } => {
                let worker =
                    Worker::new(identifier, hostname, cpu_cores, cpu_memory, gpu_memory).with_reachable(!unreachable);
                cmd_worker_register(&state, worker).await
            }
            WorkerCommand::List { format } => cmd_worker_list(&state, format).await,
            WorkerCommand::Reachable { identifier, reachable } => {
                cmd_worker_reachable(&state, &identifier, reachable).await
            }
        },
        Command::Action { command } => match command {
            ActionCommand::Submit { requirements, template } => {
                let scheduler = ActionScheduler::new(
                    config.scheduler.clone(),
                    Arc::new(state.clone()),
                    Arc::new(state.clone()),
                    Arc::new(queue.clone()),
                );
                cmd_action_submit(&state, &scheduler, requirements.into(), template).await
            }
            ActionCommand::Show { uuid, format } => cmd_action_show(&state, &uuid, format).await,
            ActionCommand::List { state: filter, format } => cmd_action_list(&state, filter, format).await,
        },
        Command::Match { requirements } => {
            cmd_match(&state, &queue, requirements.into(), config.scheduler.depth_concurrency).await
        }
        Command::Queue { command } => match command {
            QueueCommand::List {
                worker,
                state: filter,
                format,
            } => cmd_queue_list(&queue, worker.as_deref(), filter, format).await,
            QueueCommand::Retry { worker, job_id } => cmd_queue_retry(&queue, &worker, &job_id).await,
            QueueCommand::Remove { worker, job_id } => cmd_queue_remove(&queue, &worker, &job_id).await,
        },
    };

    state.shutdown().await.ok();
    result
}

/// Register or refresh a worker
async fn cmd_worker_register(state: &StateManager, worker: Worker) -> Result<()> {
    let identifier = worker.identifier.clone();
    let reachable = worker.reachable;
    state.upsert_worker(worker).await.context("Failed to register worker")?;

    info!(%identifier, reachable, "Worker registered");
    println!("{} {}", "Registered worker".green(), identifier.bold());
    Ok(())
}

/// List workers
async fn cmd_worker_list(state: &StateManager, format: OutputFormat) -> Result<()> {
    let workers = state.list_workers(false).await.context("Failed to list workers")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&workers)?),
        OutputFormat::Table => {
            println!(
                "{:<16} {:<20} {:>6} {:>8} {:>8} {:<9} {}",
                "IDENTIFIER", "HOSTNAME", "CORES", "MEM(GB)", "GPU(GB)", "REACHABLE", "LAST SEEN"
            );
            for w in &workers {
                println!(
                    "{:<16} {:<20} {:>6} {:>8} {:>8} {:<9} {}",
                    w.identifier,
                    w.hostname,
                    w.cpu_cores,
                    w.cpu_memory_gb,
                    w.gpu_memory_gb,
                    w.reachable,
                    format_timestamp(w.last_seen)
                );
            }
        }
        OutputFormat::Text => {
            if workers.is_empty() {
                println!("No workers registered");
            }
            for w in &workers {
                let status = if w.reachable { "reachable".green() } else { "unreachable".red() };
                println!(
                    "{} ({}) {} cores, {}GB RAM, {}GB GPU [{}]",
                    w.identifier.bold(),
                    w.hostname,
                    w.cpu_cores,
                    w.cpu_memory_gb,
                    w.gpu_memory_gb,
                    status
                );
            }
        }
    }
    Ok(())
}

/// Flip a worker's reachability
async fn cmd_worker_reachable(state: &StateManager, identifier: &str, reachable: bool) -> Result<()> {
    state
        .set_reachable(identifier, reachable)
        .await
        .with_context(|| format!("Failed to update worker {}", identifier))?;

    println!("Worker {} reachable: {}", identifier.bold(), reachable);
    Ok(())
}

/// Create a pending action and schedule it
async fn cmd_action_submit(
    state: &StateManager,
    scheduler: &ActionScheduler,
    requirements: ResourceRequirement,
    template: Option<String>,
) -> Result<()> {
    let mut action = Action::new(requirements);
    if let Some(template) = template {
        action = action.with_template(template);
    }

    state
        .create_action(action.clone())
        .await
        .context("Failed to create action")?;
    println!("Created action {} ({})", action.uuid.bold(), requirements);

    let outcome = scheduler
        .schedule(&action)
        .await
        .with_context(|| format!("Failed to schedule action {}", action.uuid))?;

    match &outcome {
        ScheduleOutcome::Dispatched { .. } => println!("{}", outcome.to_string().green()),
        ScheduleOutcome::Unprocessable { .. } => println!("{}", outcome.to_string().yellow()),
        ScheduleOutcome::EnqueueFailed { .. } => println!("{}", outcome.to_string().red()),
    }
    Ok(())
}

/// Show one action
async fn cmd_action_show(state: &StateManager, uuid: &str, format: OutputFormat) -> Result<()> {
    let action = state.get_action_required(uuid).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&action)?),
        OutputFormat::Text | OutputFormat::Table => {
            println!("Action:       {}", action.uuid.bold());
            println!("State:        {}", colored_state(action.state));
            if let Some(cause) = &action.state_cause {
                println!("Cause:        {}", cause);
            }
            println!("Requirements: {}", action.requirements);
            println!("Template:     {}", action.template.as_deref().unwrap_or("-"));
            println!("Worker:       {}", action.worker.as_deref().unwrap_or("-"));
            println!("Created:      {}", format_timestamp(action.created_at));
            println!("Updated:      {}", format_timestamp(action.updated_at));
        }
    }
    Ok(())
}

/// List actions
async fn cmd_action_list(state: &StateManager, filter: Option<ActionState>, format: OutputFormat) -> Result<()> {
    let actions = state.list_actions(filter).await.context("Failed to list actions")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&actions)?),
        OutputFormat::Table => {
            println!("{:<38} {:<14} {:<16} {}", "UUID", "STATE", "WORKER", "REQUIREMENTS");
            for a in &actions {
                println!(
                    "{:<38} {:<14} {:<16} {}",
                    a.uuid,
                    a.state.to_string(),
                    a.worker.as_deref().unwrap_or("-"),
                    a.requirements
                );
            }
        }
        OutputFormat::Text => {
            if actions.is_empty() {
                println!("No actions");
            }
            for a in &actions {
                println!(
                    "{} [{}] {} -> {}",
                    a.uuid.bold(),
                    colored_state(a.state),
                    a.requirements,
                    a.worker.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

/// Format a timestamp as ISO date string
fn format_timestamp(timestamp_ms: i64) -> String {
    use chrono::{TimeZone, Utc};
    match Utc.timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => "unknown".to_string(),
    }
}

fn colored_state(state: ActionState) -> colored::ColoredString {
    let text = state.to_string();
    match state {
        ActionState::Done => text.green(),
        ActionState::Failed | ActionState::Unprocessable => text.red(),
        ActionState::Pending => text.normal(),
        ActionState::Processing | ActionState::Starting | ActionState::Stopping => text.cyan(),
    }
}

/// Dry run of the capability match and load balancing
async fn cmd_match(
    state: &StateManager,
    queue: &StoreDispatchQueue,
    requirements: ResourceRequirement,
    concurrency: usize,
) -> Result<()> {
    let workers = state.snapshot().await?;
    let candidates = matcher::match_workers(&requirements, &workers);

    println!("Requirements: {}", requirements);
    if candidates.is_empty() {
        println!("{}", "No worker available with the required hardware capabilities".yellow());
        return Ok(());
    }

    let ordered = balancer::order_by_hostname(candidates);
    let depths = balancer::queue_depths(&ordered, queue, concurrency).await?;
    for (worker, depth) in ordered.iter().zip(&depths) {
        println!("  {:<16} {:<20} depth {}", worker.identifier, worker.hostname, depth);
    }

    if let Some(chosen) = balancer::least_loaded(ordered, &depths) {
        println!("Would choose: {}", chosen.identifier.green().bold());
    }
    Ok(())
}

/// List dispatch jobs
async fn cmd_queue_list(
    queue: &StoreDispatchQueue,
    worker: Option<&str>,
    filter: Option<JobState>,
    format: OutputFormat,
) -> Result<()> {
    let jobs = queue.jobs(worker, filter).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&jobs)?),
        OutputFormat::Table => {
            println!("{:<16} {:<38} {:<10} {:>8}", "QUEUE", "JOB", "STATE", "ATTEMPTS");
            for j in &jobs {
                println!(
                    "{:<16} {:<38} {:<10} {:>8}",
                    j.queue,
                    j.job_id,
                    j.state.as_str(),
                    format!("{}/{}", j.attempts_made, j.options.max_attempts)
                );
            }
        }
        OutputFormat::Text => {
            if jobs.is_empty() {
                println!("No jobs");
            }
            for j in &jobs {
                print_job(j);
            }
        }
    }
    Ok(())
}

fn print_job(job: &DispatchJob) {
    let state = match job.state {
        JobState::Failed => job.state.as_str().red(),
        JobState::Active => job.state.as_str().cyan(),
        _ => job.state.as_str().normal(),
    };
    print!(
        "{}/{} [{}] attempts {}/{}",
        job.queue,
        job.job_id.bold(),
        state,
        job.attempts_made,
        job.options.max_attempts
    );
    match &job.failed_reason {
        Some(reason) => println!(" last error: {}", reason),
        None => println!(),
    }
}

/// Re-drive a failed job
async fn cmd_queue_retry(queue: &StoreDispatchQueue, worker: &str, job_id: &str) -> Result<()> {
    queue
        .retry(worker, job_id)
        .await
        .with_context(|| format!("Failed to retry {}/{}", worker, job_id))?;

    println!("Job {}/{} moved back to waiting", worker, job_id.bold());
    Ok(())
}

/// Remove a job
async fn cmd_queue_remove(queue: &StoreDispatchQueue, worker: &str, job_id: &str) -> Result<()> {
    let removed = queue
        .remove(worker, job_id)
        .await
        .with_context(|| format!("Failed to remove {}/{}", worker, job_id))?;

    if removed {
        println!("Removed job {}/{}", worker, job_id.bold());
    } else {
        println!("No job {}/{}", worker, job_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_timestamp(i64::MAX), "unknown");
    }

    #[test]
    fn test_log_level_precedence() {
        assert_eq!(resolve_log_level(Some("debug"), Some("warn")).unwrap(), tracing::Level::DEBUG);
        assert_eq!(resolve_log_level(None, Some("warn")).unwrap(), tracing::Level::WARN);
        assert_eq!(resolve_log_level(None, None).unwrap(), tracing::Level::INFO);
        assert!(resolve_log_level(Some("loud"), None).is_err());
    }
}
