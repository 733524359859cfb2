//! CLI command definitions and subcommands

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::{ActionState, ResourceRequirement};
use crate::queue::JobState;

/// ActionDispatch - capability-aware action scheduler
#[derive(Parser)]
#[command(
    name = "ad",
    about = "Match actions to workers and dispatch them onto per-worker queues",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/actiondispatch/logs/actiondispatch.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    /// Store path override
    #[arg(short, long, global = true, help = "Path to the SQLite store")]
    pub store: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Register and inspect workers
    Worker {
        #[command(subcommand)]
        command: WorkerCommand,
    },

    /// Submit and inspect actions
    Action {
        #[command(subcommand)]
        command: ActionCommand,
    },

    /// Show which workers could run a requirement and which would be chosen
    Match {
        #[command(flatten)]
        requirements: RequirementArgs,
    },

    /// Inspect and operate on dispatch queues
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
}

/// Worker subcommands
#[derive(Subcommand)]
pub enum WorkerCommand {
    /// Register a worker or refresh its declared capacity
    Register {
        /// Stable identifier, also the queue name
        identifier: String,

        #[arg(long)]
        hostname: String,

        #[arg(long)]
        cpu_cores: u32,

        /// System memory in GB
        #[arg(long)]
        cpu_memory: u32,

        /// GPU memory in GB (0 for none)
        #[arg(long, default_value = "0")]
        gpu_memory: u32,

        /// Register as not reachable
        #[arg(long)]
        unreachable: bool,
    },

    /// List registered workers
    List {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Set a worker's reachability
    Reachable {
        identifier: String,

        #[arg(action = clap::ArgAction::Set)]
        reachable: bool,
    },
}

/// Action subcommands
#[derive(Subcommand)]
pub enum ActionCommand {
    /// Create a pending action and schedule it
    Submit {
        #[command(flatten)]
        requirements: RequirementArgs,

        /// Template the action was created from
        #[arg(short, long)]
        template: Option<String>,
    },

    /// Show one action
    Show {
        uuid: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List actions
    List {
        /// Only actions in this state
        #[arg(long)]
        state: Option<ActionState>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Queue subcommands
#[derive(Subcommand)]
pub enum QueueCommand {
    /// List jobs
    List {
        /// Only this worker's queue
        #[arg(short, long)]
        worker: Option<String>,

        /// Only jobs in this state
        #[arg(long)]
        state: Option<JobState>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Re-drive a failed job with a fresh attempt budget
    Retry { worker: String, job_id: String },

    /// Remove a job that is not active
    Remove { worker: String, job_id: String },
}

/// Hardware requirement flags
#[derive(Args, Clone, Copy, Debug)]
pub struct RequirementArgs {
    #[arg(long)]
    pub cpu_cores: u32,

    /// System memory in GB
    #[arg(long)]
    pub cpu_memory: u32,

    /// GPU memory in GB (0 for none)
    #[arg(long, default_value = "0")]
    pub gpu_memory: u32,
}

impl From<RequirementArgs> for ResourceRequirement {
    fn from(args: RequirementArgs) -> Self {
        ResourceRequirement::new(args.cpu_cores, args.cpu_memory, args.gpu_memory)
    }
}

/// Output format for list/show commands
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => Err(format!("Unknown format: {}. Use: text, json, or table", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Table => write!(f, "table"),
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("actiondispatch")
        .join("logs")
        .join("actiondispatch.log")
}
