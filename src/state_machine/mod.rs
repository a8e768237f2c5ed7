mod job;
mod state;

pub use job::{
    JobDescriptor, JobOutcome, JobRecord, JobStatus, PendingRecord, PollPolicy,
    ensure_unique_modules, relative_display,
};
pub use state::{JobPhase, RunStateMachine};
