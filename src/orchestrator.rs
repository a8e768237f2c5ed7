use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::controller::JobController;
use crate::error::RunnerError;
use crate::prover::ProvingService;
use crate::report::{ReportWriter, RunReport};
use crate::state_machine::{JobDescriptor, RunStateMachine, ensure_unique_modules};

/// A finished run: the report and where it was written.
#[derive(Debug)]
pub struct CompletedRun {
    pub report: RunReport,
    pub report_path: PathBuf,
}

/// Sequences job controllers over the configured descriptors.
pub struct RunOrchestrator<S> {
    controller: JobController<S>,
    writer: ReportWriter,
    /// Pause between two consecutive submissions.
    submission_delay: Duration,
    /// Upper bound on jobs in flight at once. 1 means strictly sequential.
    max_concurrency: usize,
}

impl<S: ProvingService> RunOrchestrator<S> {
    pub fn new(controller: JobController<S>, writer: ReportWriter, submission_delay: Duration) -> Self {
        Self {
            controller,
            writer,
            submission_delay,
            max_concurrency: 1,
        }
    }

    /// Allow up to `limit` jobs in flight at once (clamped to at least 1).
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    #[cfg(test)]
    pub fn controller(&self) -> &JobController<S> {
        &self.controller
    }

    /// Run every descriptor and persist the report once, at the end.
    ///
    /// Job outcomes never abort the run. The only errors are duplicate module
    /// names (checked before anything is submitted) and failure to write the report.
    pub async fn run_all(&self, descriptors: &[JobDescriptor]) -> Result<CompletedRun, RunnerError> {
        ensure_unique_modules(descriptors)?;
        let report = self.collect(descriptors).await;
        let report_path = self.writer.persist(&report, Utc::now()).await?;
        Ok(CompletedRun {
            report,
            report_path,
        })
    }

    /// Run every descriptor and return the records in descriptor order, without persisting.
    pub async fn collect(&self, descriptors: &[JobDescriptor]) -> RunReport {
        info!(
            jobs = descriptors.len(),
            max_concurrency = self.max_concurrency,
            "starting run"
        );
        if self.max_concurrency > 1 && descriptors.len() > 1 {
            self.collect_concurrent(descriptors).await
        } else {
            self.collect_sequential(descriptors).await
        }
    }

    async fn collect_sequential(&self, descriptors: &[JobDescriptor]) -> RunReport {
        let total = descriptors.len();
        let mut machine = RunStateMachine::new(total);
        machine.start();
        let mut report = RunReport::with_capacity(total);

        for (index, descriptor) in descriptors.iter().enumerate() {
            let record = self
                .controller
                .run_observed(descriptor, |phase| match machine.observe(index, phase) {
                    Ok(state) => debug!(state = %state, "run state"),
                    Err(e) => warn!(error = %e, "unexpected run transition"),
                })
                .await;
            debug!(
                module = record.module(),
                input = record.input_file(),
                project_id = record.project_id(),
                status = %record.status(),
                "record appended"
            );
            report.push(record);

            if index + 1 < total {
                debug!(delay = ?self.submission_delay, "pausing before next submission");
                sleep(self.submission_delay).await;
            }
        }

        info!(state = %machine.state(), records = report.len(), "run finished");
        debug!(history = ?machine.history(), "run transitions");
        report
    }

    /// Bounded-concurrency variant. Submission starts are staggered by the
    /// submission delay and records come back in descriptor order.
    async fn collect_concurrent(&self, descriptors: &[JobDescriptor]) -> RunReport {
        let start = Instant::now();
        let records = stream::iter(descriptors.iter().enumerate())
            .map(|(index, descriptor)| async move {
                let offset = self.submission_delay.saturating_mul(index as u32);
                sleep_until(start + offset).await;
                self.controller.run(descriptor).await
            })
            .buffered(self.max_concurrency)
            .collect::<Vec<_>>()
            .await;

        info!(records = records.len(), "run finished");
        RunReport::from_records(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::{FakeService, Poll, Script, descriptors, fast_policy};
    use crate::state_machine::JobStatus;
    use crate::ui::ConsoleUi;
    use std::path::{Path, PathBuf};

    fn orchestrator(service: FakeService, results: &Path) -> RunOrchestrator<FakeService> {
        let controller = JobController::new(
            service,
            fast_policy(3),
            PathBuf::from("/proj"),
            ConsoleUi::hidden(),
        );
        RunOrchestrator::new(controller, ReportWriter::new(results), Duration::ZERO)
    }

    fn statuses(report: &RunReport) -> Vec<JobStatus> {
        report.records().iter().map(|r| r.status()).collect()
    }

    fn modules(report: &RunReport) -> Vec<&str> {
        report.records().iter().map(|r| r.module()).collect()
    }

    #[tokio::test]
    async fn rejected_middle_job_does_not_affect_neighbours() {
        let dir = tempfile::tempdir().unwrap();
        let service = FakeService::default().with("Approve", Script::RejectSubmit("allowance proof rejected"));
        let orch = orchestrator(service, dir.path());

        let run = orch
            .run_all(&descriptors(&["Transfer", "Approve", "TransferFrom"]))
            .await
            .unwrap();

        assert_eq!(
            statuses(&run.report),
            vec![JobStatus::Complete, JobStatus::Failed, JobStatus::Complete]
        );
        let approve = &run.report.records()[1];
        assert_eq!(approve.error(), Some("allowance proof rejected"));
        assert_eq!(approve.output_file(), "results/Approve_proved.lean");
    }

    #[tokio::test]
    async fn fault_mid_poll_is_isolated_to_its_job() {
        let dir = tempfile::tempdir().unwrap();
        let service = FakeService::default()
            .with("Approve", Script::Polls(vec![Poll::Processing, Poll::Fatal]));
        let orch = orchestrator(service, dir.path());

        let run = orch
            .run_all(&descriptors(&["Transfer", "Approve", "TransferFrom"]))
            .await
            .unwrap();

        assert_eq!(
            statuses(&run.report),
            vec![JobStatus::Complete, JobStatus::Error, JobStatus::Complete]
        );
        assert!(run.report.records()[1].error().unwrap().contains("unexpected body"));
        assert_eq!(
            orch.controller().service().submitted(),
            vec!["Transfer", "Approve", "TransferFrom"]
        );
    }

    #[tokio::test]
    async fn every_job_gets_one_terminal_record_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["A", "B", "C", "D", "E"];
        let service = FakeService::default()
            .with("B", Script::FaultOnSubmit)
            .with("D", Script::Polls(vec![Poll::Transient, Poll::Transient, Poll::Transient]));
        let orch = orchestrator(service, dir.path());

        let run = orch.run_all(&descriptors(&names)).await.unwrap();

        assert_eq!(run.report.len(), names.len());
        assert_eq!(modules(&run.report), names.to_vec());
        for record in run.report.records() {
            assert!(record.status().is_terminal());
            assert!(record.duration_seconds() >= 0.0);
        }
    }

    #[tokio::test]
    async fn report_is_persisted_once_with_all_records() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(FakeService::default(), dir.path());

        let run = orch
            .run_all(&descriptors(&["Transfer", "Approve"]))
            .await
            .unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let name = run.report_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("run_") && name.ends_with("Z.json"), "{name}");

        let loaded = crate::report::load(&run.report_path).await.unwrap();
        assert_eq!(loaded, run.report);
    }

    #[tokio::test]
    async fn duplicate_modules_abort_before_submission() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(FakeService::default(), dir.path());

        let err = orch
            .run_all(&descriptors(&["Transfer", "Transfer"]))
            .await
            .unwrap_err();

        assert!(matches!(err, RunnerError::DuplicateModule(_)));
        assert!(orch.controller().service().submitted().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn reruns_with_always_succeeding_service_match_except_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = descriptors(&["Transfer", "Approve", "TransferFrom"]);

        let first = orchestrator(FakeService::default(), dir.path()).collect(&jobs).await;
        let second = orchestrator(FakeService::default(), dir.path()).collect(&jobs).await;

        let strip = |report: &RunReport| {
            report
                .records()
                .iter()
                .map(|r| {
                    let mut value = serde_json::to_value(r).unwrap();
                    let obj = value.as_object_mut().unwrap();
                    obj.remove("submitted_at");
                    obj.remove("duration_seconds");
                    value
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(&first), strip(&second));
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_run_paces_between_jobs_only() {
        let dir = tempfile::tempdir().unwrap();
        let controller = JobController::new(
            FakeService::default(),
            fast_policy(3),
            PathBuf::from("/proj"),
            ConsoleUi::hidden(),
        );
        let orch = RunOrchestrator::new(controller, ReportWriter::new(dir.path()), Duration::from_secs(5));

        let start = Instant::now();
        let report = orch.collect(&descriptors(&["Transfer", "Approve", "TransferFrom"])).await;

        assert_eq!(report.len(), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(11), "{elapsed:?}");
    }

    #[tokio::test]
    async fn concurrent_run_keeps_descriptor_order_and_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let service = FakeService::default()
            .with("A", Script::Polls(vec![Poll::Processing, Poll::Processing, Poll::Done]))
            .with("B", Script::RejectSubmit("nope"))
            .with("C", Script::Polls(vec![Poll::Fatal]));
        let orch = orchestrator(service, dir.path()).with_max_concurrency(2);

        let run = orch.run_all(&descriptors(&["A", "B", "C", "D"])).await.unwrap();

        assert_eq!(modules(&run.report), vec!["A", "B", "C", "D"]);
        assert_eq!(
            statuses(&run.report),
            vec![
                JobStatus::Complete,
                JobStatus::Failed,
                JobStatus::Error,
                JobStatus::Complete
            ]
        );
    }

    #[tokio::test]
    async fn empty_run_still_writes_a_report() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(FakeService::default(), dir.path());

        let run = orch.run_all(&[]).await.unwrap();

        assert_eq!(run.report.len(), 0);
        assert!(run.report_path.exists());
    }
}
