//! Lathe CLI - Command-line interface for the Lathe training job orchestrator
//!
//! This CLI provides a `lathe` command for starting training jobs, following
//! and stopping them, reading their logs, and running predictions.

mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use lathe_orchestrator::{Orchestrator, TrainingApi};
use lathe_training::{Principal, StaticPrincipal};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{datasets, list, logs, predict, recover, status, stop, train};

/// Lathe - Training job orchestrator
///
/// Lathe runs model training jobs in the background, checkpoints their
/// progress, and keeps a log per job.
#[derive(Parser, Debug)]
#[command(
    name = "lathe",
    author,
    version,
    about = "Lathe - Training job orchestrator",
    long_about = "Lathe starts training jobs on registered datasets, tracks their progress in a local SQLite store,\nand serves predictions from the models they produce."
)]
struct Args {
    /// Configuration file (defaults to ~/.lathe/config.toml merged with ./lathe.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Act as this user id
    #[arg(short, long, default_value_t = 1, global = true)]
    user: i64,

    /// Act with admin rights
    #[arg(long, global = true)]
    admin: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a training job and follow it until it finishes
    ///
    /// Press Ctrl-C to stop the job.
    Train {
        /// Dataset id
        #[arg(long)]
        dataset: i64,

        /// Number of epochs (1-50)
        #[arg(long, default_value_t = 3)]
        epochs: u32,

        /// Learning rate (0, 1]
        #[arg(long, default_value_t = 2e-5)]
        learning_rate: f64,

        /// Batch size (1-128)
        #[arg(long, default_value_t = 8)]
        batch_size: u32,

        /// Free-text description
        #[arg(long)]
        description: Option<String>,

        /// Output the final status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a job's status and most recent log lines
    Status {
        /// Job id
        job: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stop a pending or running job
    Stop {
        /// Job id
        job: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the last lines of a job's log
    Logs {
        /// Job id
        job: i64,

        /// Number of lines
        #[arg(short = 'n', long)]
        lines: Option<usize>,
    },

    /// List jobs, newest first
    List {
        /// Only jobs with this status (pending, running, completed, failed, stopped)
        #[arg(long)]
        status: Option<String>,

        /// Only jobs owned by this user (admins only)
        #[arg(long)]
        owner: Option<i64>,

        /// Page size
        #[arg(long)]
        limit: Option<usize>,

        /// Jobs to skip
        #[arg(long)]
        offset: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify text with the default model or a trained one
    Predict {
        /// Text to classify
        text: String,

        /// Use the model produced by this job
        #[arg(long)]
        model: Option<i64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the datasets available for training
    Datasets {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fail jobs left running by a crashed process and finish pending ones
    Recover,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config::load_config(args.config.as_deref())?;

    // Initialize tracing
    let level_name = args.log_level.as_deref().unwrap_or(&config.log_level);
    let level = match level_name.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // If no command provided, show help
    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    let principal = if args.admin { Principal::admin(args.user) } else { Principal::user(args.user) };
    let orchestrator = Arc::new(Orchestrator::open(config)?);
    let api = TrainingApi::new(Arc::clone(&orchestrator), Arc::new(StaticPrincipal(principal)));

    // Execute command
    let result = match command {
        Command::Train { dataset, epochs, learning_rate, batch_size, description, json } => {
            let options = train::TrainOptions { dataset, epochs, learning_rate, batch_size, description };
            train::execute(&api, options, json).await
        }
        Command::Status { job, json } => status::execute(&api, job, json),
        Command::Stop { job, json } => stop::execute(&api, job, json).await,
        Command::Logs { job, lines } => logs::execute(&api, job, lines),
        Command::List { status, owner, limit, offset, json } => {
            list::execute(&api, list::ListOptions { status, owner, limit, offset }, json)
        }
        Command::Predict { text, model, json } => predict::execute(&api, &text, model, json),
        Command::Datasets { json } => datasets::execute(&api, json),
        Command::Recover => recover::execute(&api).await,
    };

    orchestrator.scheduler().shutdown().await;
    result
}
