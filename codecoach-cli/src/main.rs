//! Codecoach CLI. Examines notebooks, shows hints and records experiments from
//! the terminal.

mod commands;

use clap::Parser;
use codecoach_core::ActivityId;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use uuid::Uuid;

/// Codecoach: hints and scores for notebook ML activities
#[derive(Parser, Debug)]
#[command(name = "codecoach", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List the available activities
    Activities,
    /// Show what the notebook's code currently does
    Examine {
        /// Path to the .ipynb file
        notebook: PathBuf,
        /// Activity the notebook belongs to (e.g., wine, fruit-picker)
        #[arg(short, long)]
        activity: ActivityId,
    },
    /// Print an activity's hint catalog in order
    Hints {
        /// Activity name
        activity: ActivityId,
    },
    /// Ask for the hint that applies to the notebook right now
    Hint {
        /// Path to the .ipynb file
        notebook: PathBuf,
        #[arg(short, long)]
        activity: ActivityId,
        /// Event that asks for the hint
        #[arg(short, long, value_enum, default_value = "button")]
        trigger: TriggerArg,
    },
    /// Record a run of the notebook as a scored experiment
    Submit {
        /// Path to the .ipynb file (with validation cell output)
        notebook: PathBuf,
        #[arg(short, long)]
        activity: ActivityId,
        /// Number of training instances used
        #[arg(long, default_value = "0")]
        train: usize,
        /// Number of test instances used
        #[arg(long, default_value = "0")]
        test: usize,
    },
    /// Inspect or clear recorded experiments
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TriggerArg {
    /// The hint button was clicked
    Button,
    /// The learner came back to the notebook
    Return,
}

#[derive(clap::Subcommand, Debug)]
enum HistoryAction {
    /// List experiments of an activity, oldest first
    List {
        #[arg(short, long)]
        activity: ActivityId,
    },
    /// Show one experiment in full
    Show {
        /// Experiment id
        id: Uuid,
    },
    /// Delete every experiment of an activity
    Clear {
        #[arg(short, long)]
        activity: ActivityId,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default workspace configuration file
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "codecoach", "codecoach")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "codecoach.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let output = if cli.json {
        commands::Output::Json
    } else {
        commands::Output::Text
    };
    commands::handle_command(cli.command, &workspace, output).await
}
