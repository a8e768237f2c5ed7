//! Run report: the ordered job records of one run and how they reach disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RunnerError;
use crate::state_machine::JobRecord;

/// All job records of one run, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunReport {
    records: Vec<JobRecord>,
}

impl RunReport {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn from_records(records: Vec<JobRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: JobRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[JobRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    fn ensure_unique_modules(&self) -> Result<(), RunnerError> {
        let mut seen = HashSet::with_capacity(self.records.len());
        for record in &self.records {
            if !seen.insert(record.module()) {
                return Err(RunnerError::InvalidReport(format!(
                    "module {} appears more than once",
                    record.module()
                )));
            }
        }
        Ok(())
    }
}

/// Writes each run's report into the results directory.
pub struct ReportWriter {
    results_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    /// `run_<YYYYMMDDTHHMMSSZ>.json`
    pub fn file_name(at: DateTime<Utc>) -> String {
        format!("run_{}.json", at.format("%Y%m%dT%H%M%SZ"))
    }

    /// Serialize the whole report and move it into place in one rename, so
    /// readers never see a partially written file.
    pub async fn persist(&self, report: &RunReport, at: DateTime<Utc>) -> Result<PathBuf, RunnerError> {
        tokio::fs::create_dir_all(&self.results_dir).await?;

        let name = Self::file_name(at);
        let path = self.results_dir.join(&name);
        let staging = self.results_dir.join(format!(".{name}.tmp"));

        let body = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&staging, body).await?;
        tokio::fs::rename(&staging, &path).await?;

        info!(path = %path.display(), records = report.len(), "run report written");
        Ok(path)
    }
}

/// Read a persisted report back, rejecting non-terminal or duplicated records.
pub async fn load(path: &Path) -> Result<RunReport, RunnerError> {
    let contents = tokio::fs::read_to_string(path).await?;
    let report: RunReport = serde_json::from_str(&contents)?;
    report.ensure_unique_modules()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{JobDescriptor, JobStatus, PendingRecord};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn record(module: &str) -> JobRecord {
        let context: Arc<[PathBuf]> = Vec::new().into();
        let d = JobDescriptor::new(
            PathBuf::from(format!("/p/properties/{module}.lean")),
            context,
            Path::new("/p/results"),
        )
        .unwrap();
        PendingRecord::begin(&d, Path::new("/p")).complete(format!("results/{module}_proved.lean"))
    }

    #[test]
    fn file_name_uses_utc_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(ReportWriter::file_name(at), "run_20260304T050607Z.json");
    }

    #[tokio::test]
    async fn persist_writes_full_report_and_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results");
        let writer = ReportWriter::new(&results);
        let report = RunReport::from_records(vec![record("Transfer"), record("Approve")]);

        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let path = writer.persist(&report, at).await.unwrap();

        assert_eq!(path, results.join("run_20260102T030405Z.json"));
        let entries: Vec<_> = std::fs::read_dir(&results).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["module"], "Transfer");
        assert_eq!(rows[1]["module"], "Approve");
        assert_eq!(rows[0]["status"], "COMPLETE");
        assert!(rows[0]["error"].is_null());
    }

    #[tokio::test]
    async fn load_reads_back_persisted_report() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path());
        let report = RunReport::from_records(vec![record("Transfer")]);
        let path = writer.persist(&report, Utc::now()).await.unwrap();

        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.records()[0].status(), JobStatus::Complete);
    }

    #[tokio::test]
    async fn load_rejects_duplicate_modules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let report = RunReport::from_records(vec![record("Transfer"), record("Transfer")]);
        std::fs::write(&path, serde_json::to_string(&report).unwrap()).unwrap();

        let err = load(&path).await.unwrap_err();
        assert!(matches!(err, RunnerError::InvalidReport(_)));
    }

    #[tokio::test]
    async fn load_rejects_unknown_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"[{"module":"Transfer","input_file":"a","output_file":"b","status":"UNKNOWN",
                "project_id":null,"duration_seconds":null,"error":null,
                "submitted_at":"2026-01-01T00:00:00Z"}]"#,
        )
        .unwrap();

        assert!(matches!(load(&path).await.unwrap_err(), RunnerError::Json(_)));
    }
}
