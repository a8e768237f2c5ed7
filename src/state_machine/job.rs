use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::RunnerError;

/// Suffix appended to the module name for the artifact the prover writes back.
const OUTPUT_SUFFIX: &str = "_proved.lean";

/// Immutable description of one submission.
///
/// The context set is shared by every descriptor of a run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    module: String,
    input_path: PathBuf,
    context_paths: Arc<[PathBuf]>,
    output_path: PathBuf,
}

impl JobDescriptor {
    /// Builds a descriptor whose module name is the input file's base name and
    /// whose output lands in `results_dir` as `<module>_proved.lean`.
    pub fn new(
        input_path: PathBuf,
        context_paths: Arc<[PathBuf]>,
        results_dir: &Path,
    ) -> Result<Self, RunnerError> {
        let module = input_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| RunnerError::InvalidInputName(input_path.clone()))?
            .to_string();
        let output_path = results_dir.join(format!("{module}{OUTPUT_SUFFIX}"));

        Ok(Self {
            module,
            input_path,
            context_paths,
            output_path,
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn context_paths(&self) -> &[PathBuf] {
        &self.context_paths
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

/// Fails with [`RunnerError::DuplicateModule`] on the first repeated module name.
pub fn ensure_unique_modules(descriptors: &[JobDescriptor]) -> Result<(), RunnerError> {
    let mut seen = HashSet::with_capacity(descriptors.len());
    for descriptor in descriptors {
        if !seen.insert(descriptor.module()) {
            return Err(RunnerError::DuplicateModule(descriptor.module().to_string()));
        }
    }
    Ok(())
}

/// Status column of a persisted record.
///
/// `Unknown` is the value a job holds before it is submitted; it never
/// appears in a finished report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Unknown,
    Complete,
    Failed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Unknown)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Unknown => write!(f, "UNKNOWN"),
            JobStatus::Complete => write!(f, "COMPLETE"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Terminal outcome of a job. Each case carries only what is meaningful for it.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The service produced a result artifact.
    Complete { duration_seconds: f64 },
    /// The service understood the request and explicitly failed it.
    Failed { error: String, duration_seconds: f64 },
    /// Anything else: transport, auth, local I/O, exhausted polling.
    Error { error: String, duration_seconds: f64 },
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Complete { .. } => JobStatus::Complete,
            JobOutcome::Failed { .. } => JobStatus::Failed,
            JobOutcome::Error { .. } => JobStatus::Error,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        match self {
            JobOutcome::Complete { duration_seconds }
            | JobOutcome::Failed { duration_seconds, .. }
            | JobOutcome::Error { duration_seconds, .. } => *duration_seconds,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobOutcome::Complete { .. } => None,
            JobOutcome::Failed { error, .. } | JobOutcome::Error { error, .. } => Some(error),
        }
    }
}

/// Polling discipline handed to the job controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Fixed wait between two status requests.
    pub interval: Duration,
    /// Consecutive transient poll failures tolerated before the job is abandoned.
    pub max_consecutive_failures: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_consecutive_failures: 5,
        }
    }
}

/// A job that has started submission but not yet resolved.
///
/// The only way out is one of the consuming resolvers, so a record can reach
/// a terminal status exactly once and always together with its duration.
#[derive(Debug)]
pub struct PendingRecord {
    module: String,
    input_file: String,
    output_file: String,
    project_id: Option<String>,
    submitted_at: DateTime<Utc>,
    started: Instant,
}

impl PendingRecord {
    /// Stamps the submission time. Paths are stored relative to `project_root`.
    pub fn begin(descriptor: &JobDescriptor, project_root: &Path) -> Self {
        Self {
            module: descriptor.module().to_string(),
            input_file: relative_display(descriptor.input_path(), project_root),
            output_file: relative_display(descriptor.output_path(), project_root),
            project_id: None,
            submitted_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Always `UNKNOWN`: a pending record has no terminal status yet.
    pub fn status(&self) -> JobStatus {
        JobStatus::Unknown
    }

    pub fn set_project_id(&mut self, project_id: impl Into<String>) {
        self.project_id = Some(project_id.into());
    }

    pub fn elapsed_seconds(&self) -> f64 {
        round_tenths(self.started.elapsed().as_secs_f64())
    }

    /// Resolves as `COMPLETE`; `output_file` is the location the client actually wrote.
    pub fn complete(mut self, output_file: String) -> JobRecord {
        let duration_seconds = self.elapsed_seconds();
        self.output_file = output_file;
        self.resolve(JobOutcome::Complete { duration_seconds })
    }

    pub fn fail(self, error: impl Into<String>) -> JobRecord {
        let duration_seconds = self.elapsed_seconds();
        self.resolve(JobOutcome::Failed {
            error: error.into(),
            duration_seconds,
        })
    }

    pub fn error(self, error: impl Into<String>) -> JobRecord {
        let duration_seconds = self.elapsed_seconds();
        self.resolve(JobOutcome::Error {
            error: error.into(),
            duration_seconds,
        })
    }

    fn resolve(self, outcome: JobOutcome) -> JobRecord {
        JobRecord {
            module: self.module,
            input_file: self.input_file,
            output_file: self.output_file,
            project_id: self.project_id,
            submitted_at: self.submitted_at,
            outcome,
        }
    }
}

/// Terminal, read-only outcome of one job, as persisted in the run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "JobRecordRow", try_from = "JobRecordRow")]
pub struct JobRecord {
    module: String,
    input_file: String,
    output_file: String,
    project_id: Option<String>,
    submitted_at: DateTime<Utc>,
    outcome: JobOutcome,
}

impl JobRecord {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn input_file(&self) -> &str {
        &self.input_file
    }

    pub fn output_file(&self) -> &str {
        &self.output_file
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn outcome(&self) -> &JobOutcome {
        &self.outcome
    }

    pub fn status(&self) -> JobStatus {
        self.outcome.status()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.outcome.duration_seconds()
    }

    pub fn error(&self) -> Option<&str> {
        self.outcome.error()
    }
}

/// Flat wire shape of a [`JobRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecordRow {
    module: String,
    input_file: String,
    output_file: String,
    status: JobStatus,
    project_id: Option<String>,
    duration_seconds: Option<f64>,
    error: Option<String>,
    submitted_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
#[error("record for {module} is inconsistent: {reason}")]
pub struct InvalidRecord {
    module: String,
    reason: &'static str,
}

impl From<JobRecord> for JobRecordRow {
    fn from(record: JobRecord) -> Self {
        let status = record.status();
        let duration_seconds = Some(record.duration_seconds());
        let error = record.error().map(str::to_string);
        Self {
            module: record.module,
            input_file: record.input_file,
            output_file: record.output_file,
            status,
            project_id: record.project_id,
            duration_seconds,
            error,
            submitted_at: record.submitted_at,
        }
    }
}

impl TryFrom<JobRecordRow> for JobRecord {
    type Error = InvalidRecord;

    fn try_from(row: JobRecordRow) -> Result<Self, Self::Error> {
        let invalid = |reason| InvalidRecord {
            module: row.module.clone(),
            reason,
        };
        let duration_seconds = match row.duration_seconds {
            Some(d) if d >= 0.0 => d,
            Some(_) => return Err(invalid("negative duration")),
            None => return Err(invalid("terminal status without duration")),
        };
        let outcome = match (row.status, row.error.clone()) {
            (JobStatus::Unknown, _) => return Err(invalid("status is not terminal")),
            (JobStatus::Complete, None) => JobOutcome::Complete { duration_seconds },
            (JobStatus::Complete, Some(_)) => return Err(invalid("COMPLETE with an error")),
            (JobStatus::Failed, Some(error)) => JobOutcome::Failed {
                error,
                duration_seconds,
            },
            (JobStatus::Error, Some(error)) => JobOutcome::Error {
                error,
                duration_seconds,
            },
            (_, None) => return Err(invalid("failure without an error message")),
        };

        Ok(Self {
            module: row.module,
            input_file: row.input_file,
            output_file: row.output_file,
            project_id: row.project_id,
            submitted_at: row.submitted_at,
            outcome,
        })
    }
}

/// Renders `path` relative to `root` when it lives underneath it.
pub fn relative_display(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn round_tenths(seconds: f64) -> f64 {
    (seconds * 10.0).round() / 10.0
}
