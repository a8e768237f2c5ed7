//! Terminal output for the runner: banners, per-job spinners and the summary table.
//!
//! Uses `indicatif` for the spinners and `console` for colour. Everything here
//! is informational; the run report on disk is the data contract.

use std::path::{Path, PathBuf};
use std::time::Duration;

use console::Style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::report::RunReport;
use crate::state_machine::{JobOutcome, JobPhase, JobRecord, JobStatus};

const RULE_WIDTH: usize = 60;

/// Shared console sink. Cloning is cheap and every clone draws to the same terminal.
#[derive(Clone)]
pub struct ConsoleUi {
    multi: MultiProgress,
    quiet: bool,
    green: Style,
    red: Style,
    yellow: Style,
}

impl ConsoleUi {
    pub fn new() -> Self {
        Self::build(MultiProgress::new(), false)
    }

    /// A sink that prints nothing, for tests and embedding.
    pub fn hidden() -> Self {
        Self::build(
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            true,
        )
    }

    fn build(multi: MultiProgress, quiet: bool) -> Self {
        Self {
            multi,
            quiet,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    fn emit(&self, line: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        // A hidden draw target (stderr is not a terminal) swallows println.
        if self.multi.is_hidden() {
            println!("{}", line.as_ref());
        } else {
            let _ = self.multi.println(line.as_ref());
        }
    }

    /// Header printed once before the first submission.
    pub fn run_banner(&self, project_root: &Path, context: &[PathBuf], inputs: &[PathBuf]) {
        self.emit("Proof batch runner");
        self.emit(format!("Project root: {}", project_root.display()));
        self.emit(format!("Context files: {:?}", file_names(context)));
        self.emit(format!("Input files: {:?}", file_names(inputs)));
    }

    /// Print the start banner for a job and spin until [`JobProgress::finish`].
    pub fn start_job(&self, input_name: &str, output_display: &str) -> JobProgress {
        self.emit("");
        self.emit("=".repeat(RULE_WIDTH));
        self.emit(format!("  Submitting: {input_name}"));
        self.emit(format!("  Output:     {output_display}"));
        self.emit("=".repeat(RULE_WIDTH));

        let pb = if self.quiet {
            ProgressBar::hidden()
        } else {
            self.multi.add(ProgressBar::new_spinner())
        };
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("{input_name}: submitting"));
        pb.enable_steady_tick(Duration::from_millis(100));

        JobProgress {
            pb,
            ui: self.clone(),
            label: input_name.to_string(),
        }
    }

    pub fn print_summary(&self, report: &RunReport) {
        for line in self.render_summary(report).lines() {
            self.emit(line);
        }
    }

    /// Summary table: one row per record with module, status and duration.
    pub fn render_summary(&self, report: &RunReport) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = String::new();
        out.push_str(&format!("\n{rule}\n  RESULTS SUMMARY\n{rule}\n"));
        out.push_str(&format!("  {:<20} {:<12} {:>10}\n", "Module", "Status", "Duration"));
        out.push_str(&format!("  {} {} {}\n", "-".repeat(20), "-".repeat(12), "-".repeat(10)));
        for record in report.records() {
            let status = format!("{:<12}", record.status());
            let duration = format!("{}s", record.duration_seconds());
            out.push_str(&format!(
                "  {:<20} {} {:>10}\n",
                record.module(),
                self.status_style(record.status()).apply_to(status),
                duration
            ));
        }
        out.push_str(&rule);
        out.push('\n');
        out
    }

    pub fn report_saved(&self, path: &str) {
        self.emit(format!("Full results saved to: {path}"));
    }

    fn status_style(&self, status: JobStatus) -> &Style {
        match status {
            JobStatus::Complete => &self.green,
            JobStatus::Failed | JobStatus::Error => &self.red,
            JobStatus::Unknown => &self.yellow,
        }
    }
}

impl Default for ConsoleUi {
    fn default() -> Self {
        Self::new()
    }
}

/// Spinner for one in-flight job.
pub struct JobProgress {
    pb: ProgressBar,
    ui: ConsoleUi,
    label: String,
}

impl JobProgress {
    pub fn update_phase(&self, phase: JobPhase) {
        let text = match phase {
            JobPhase::Submitting => "submitting".to_string(),
            JobPhase::Polling => "waiting for the prover".to_string(),
            JobPhase::Resolved(status) => status.to_string(),
        };
        self.pb.set_message(format!("{}: {text}", self.label));
    }

    /// Clear the spinner and print the job's terminal line.
    pub fn finish(&self, record: &JobRecord) {
        self.pb.finish_and_clear();
        let elapsed = record.duration_seconds().round();
        let line = match record.outcome() {
            JobOutcome::Complete { .. } => format!(
                "  {} COMPLETE in {elapsed:.0}s → {}",
                self.ui.green.apply_to("✓"),
                record.output_file()
            ),
            JobOutcome::Failed { error, .. } => format!(
                "  {} FAILED after {elapsed:.0}s: {error}",
                self.ui.red.apply_to("✗")
            ),
            JobOutcome::Error { error, .. } => format!(
                "  {} ERROR after {elapsed:.0}s: {error}",
                self.ui.red.apply_to("✗")
            ),
        };
        self.ui.emit(line);
    }
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect()
}
