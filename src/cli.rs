//! Command-line interface based on clap.
//!
//! Subcommands: `run` (the batch), `check` (pre-flight only) and `summary`
//! (re-render a persisted report). Global flags: `--config`, `--verbose`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Submit verification tasks to a remote prover and record the outcome of each.
#[derive(Debug, Parser)]
#[command(name = "proofrun", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file (defaults to ./proofrun.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit every configured input file and write a run report.
    Run(RunArgs),

    /// Validate credentials and input files without submitting anything.
    Check,

    /// Print the summary table of a previously written run report.
    Summary {
        /// Path to a run_<timestamp>.json file.
        report: PathBuf,
    },
}

/// Overrides for the values in the configuration file.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Seconds between two status polls.
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Consecutive poll failures tolerated before a job is abandoned.
    #[arg(long)]
    pub max_polling_failures: Option<u32>,

    /// Seconds to wait between two submissions.
    #[arg(long)]
    pub submission_delay: Option<u64>,

    /// Maximum number of jobs in flight at once.
    #[arg(long)]
    pub concurrency: Option<usize>,
}
