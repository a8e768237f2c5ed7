mod cli;
mod config;
mod controller;
mod error;
mod orchestrator;
mod prover;
mod report;
mod state_machine;
mod ui;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command, RunArgs};
use config::RunnerConfig;
use controller::JobController;
use orchestrator::RunOrchestrator;
use prover::ProverClient;
use report::ReportWriter;
use state_machine::relative_display;
use ui::ConsoleUi;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Filter used when `RUST_LOG` is unset. Operator-facing progress goes through
/// [`ConsoleUi`], so plain runs only surface warnings on stderr.
fn default_filter(verbose: bool) -> &'static str {
    if verbose { "proofrun=debug" } else { "proofrun=warn" }
}

fn init_tracing(verbose: bool) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose).into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn execute(cli: Cli) -> Result<()> {
    let config = RunnerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run(args) => run(config, &args).await,
        Command::Check => check(&config),
        Command::Summary { report } => {
            let loaded = report::load(&report)
                .await
                .with_context(|| format!("failed to load {}", report.display()))?;
            ConsoleUi::new().print_summary(&loaded);
            Ok(())
        }
    }
}

fn check(config: &RunnerConfig) -> Result<()> {
    let preflight = config.preflight()?;
    println!(
        "Ready: {} job(s), {} context file(s), results in {}",
        preflight.descriptors.len(),
        preflight.context_files.len(),
        config.results_dir().display()
    );
    Ok(())
}

/// Pre-flight, then the whole batch. Individual job failures end up in the
/// report and never change the exit code.
async fn run(mut config: RunnerConfig, args: &RunArgs) -> Result<()> {
    config.apply_overrides(args);
    let preflight = config.preflight()?;

    let results_dir = config.results_dir();
    tokio::fs::create_dir_all(&results_dir)
        .await
        .with_context(|| format!("failed to create {}", results_dir.display()))?;

    let client = ProverClient::with_base_url(preflight.api_key, config.base_url.clone())?;
    let ui = ConsoleUi::new();
    ui.run_banner(
        &config.project_root,
        &preflight.context_files,
        &preflight.input_files,
    );

    let controller = JobController::new(
        client,
        config.poll_policy(),
        config.project_root.clone(),
        ui.clone(),
    )
    .validate_before_submit(config.validate_before_submit);
    let orchestrator = RunOrchestrator::new(
        controller,
        ReportWriter::new(&results_dir),
        config.submission_delay(),
    )
    .with_max_concurrency(config.max_concurrency);

    let completed = orchestrator.run_all(&preflight.descriptors).await?;
    info!(path = %completed.report_path.display(), "run complete");

    ui.print_summary(&completed.report);
    ui.report_saved(&relative_display(&completed.report_path, &config.project_root));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunnerError;

    #[test]
    fn verbose_raises_default_filter_to_debug() {
        assert_eq!(default_filter(false), "proofrun=warn");
        assert_eq!(default_filter(true), "proofrun=debug");
    }

    #[tokio::test]
    async fn run_without_credential_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig {
            api_key: String::new(),
            project_root: dir.path().to_path_buf(),
            ..RunnerConfig::default()
        };
        let results_dir = config.results_dir();

        let err = run(config, &RunArgs::default()).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RunnerError>(),
            Some(RunnerError::MissingApiKey)
        ));
        assert!(!results_dir.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
