use std::path::PathBuf;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::prover::{ProofTask, ProverError, ProvingService, TaskStatus};
use crate::state_machine::{
    JobDescriptor, JobPhase, JobRecord, PendingRecord, PollPolicy, relative_display,
};
use crate::ui::ConsoleUi;

/// Drives one job descriptor from submission to a terminal record.
pub struct JobController<S> {
    service: S,
    policy: PollPolicy,
    project_root: PathBuf,
    validate: bool,
    ui: ConsoleUi,
}

impl<S: ProvingService> JobController<S> {
    pub fn new(service: S, policy: PollPolicy, project_root: PathBuf, ui: ConsoleUi) -> Self {
        Self {
            service,
            policy,
            project_root,
            validate: true,
            ui,
        }
    }

    /// Toggle local validation of sources before they are submitted.
    pub fn validate_before_submit(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    #[cfg(test)]
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Run a job to completion. Never fails: every error becomes part of the record.
    pub async fn run(&self, descriptor: &JobDescriptor) -> JobRecord {
        self.run_observed(descriptor, |_| {}).await
    }

    /// Like [`run`](Self::run), reporting each phase change to `on_phase`.
    pub async fn run_observed(
        &self,
        descriptor: &JobDescriptor,
        mut on_phase: impl FnMut(JobPhase),
    ) -> JobRecord {
        let module = descriptor.module();
        let input_name = descriptor
            .input_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| module.to_string());
        let progress = self.ui.start_job(
            &input_name,
            &relative_display(descriptor.output_path(), &self.project_root),
        );

        let mut pending = PendingRecord::begin(descriptor, &self.project_root);
        info!(module, status = %pending.status(), "submitting");
        on_phase(JobPhase::Submitting);

        let result = self
            .drive(descriptor, &mut pending, |phase| {
                progress.update_phase(phase);
                on_phase(phase);
            })
            .await;

        let record = match result {
            Ok(written) => {
                let output = relative_display(&written, &self.project_root);
                info!(module, output = %output, elapsed = pending.elapsed_seconds(), "complete");
                pending.complete(output)
            }
            Err(e) => match e.service_message() {
                Some(message) => {
                    warn!(module, error = %e, "service failed the job");
                    pending.fail(message)
                }
                None => {
                    error!(module, category = e.category(), error = %e, "job errored");
                    pending.error(format!("{}: {e}", e.category()))
                }
            },
        };

        on_phase(JobPhase::Resolved(record.status()));
        progress.finish(&record);
        record
    }

    async fn drive(
        &self,
        descriptor: &JobDescriptor,
        pending: &mut PendingRecord,
        mut on_phase: impl FnMut(JobPhase),
    ) -> Result<PathBuf, ProverError> {
        let task = ProofTask {
            input: descriptor.input_path(),
            context: descriptor.context_paths(),
            validate: self.validate,
        };

        let project_id = self.service.submit(&task).await?;
        info!(module = descriptor.module(), project_id = %project_id, "submission accepted");
        pending.set_project_id(project_id.clone());
        on_phase(JobPhase::Polling);

        self.poll_until_terminal(descriptor.module(), &project_id).await?;
        self.service
            .download(&project_id, descriptor.output_path())
            .await
    }

    /// Poll at a fixed interval until the service reports a terminal status.
    ///
    /// Only transient errors count toward the cap, and any successful poll
    /// resets the count. Reaching the cap is an infrastructure fault.
    async fn poll_until_terminal(&self, module: &str, project_id: &str) -> Result<(), ProverError> {
        let mut consecutive_failures: u32 = 0;
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            match self.service.status(project_id).await {
                Ok(TaskStatus::Succeeded) => return Ok(()),
                Ok(TaskStatus::Failed(message)) => return Err(ProverError::ExecutionFailed(message)),
                Ok(TaskStatus::Processing) => {
                    consecutive_failures = 0;
                    debug!(module, project_id, attempt, "still processing");
                }
                Err(e) if e.is_transient() => {
                    consecutive_failures += 1;
                    warn!(
                        module,
                        project_id,
                        attempt,
                        consecutive_failures,
                        max = self.policy.max_consecutive_failures,
                        error = %e,
                        "poll failed"
                    );
                    if consecutive_failures >= self.policy.max_consecutive_failures {
                        return Err(ProverError::PollingExhausted {
                            attempts: consecutive_failures,
                            last_error: e.to_string(),
                        });
                    }
                }
                Err(e) => return Err(e),
            }
            sleep(self.policy.interval).await;
        }
    }
}
