use std::fmt;

use thiserror::Error;

use super::job::JobStatus;

/// Where a run currently is.
///
/// A run flows through: NOT_STARTED → SUBMITTING[i] → POLLING[i] → SUBMITTING[i+1] … → DONE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Submitting(usize),
    Polling(usize),
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::NotStarted => write!(f, "NOT_STARTED"),
            RunState::Submitting(i) => write!(f, "SUBMITTING[{i}]"),
            RunState::Polling(i) => write!(f, "POLLING[{i}]"),
            RunState::Done => write!(f, "DONE"),
        }
    }
}

/// Progress of a single job as reported by the job controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// The submission request is in flight.
    Submitting,
    /// The service accepted the job; its status is being polled.
    Polling,
    /// The job reached a terminal status.
    Resolved(JobStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid run transition from {from} on job {index} entering {phase:?}")]
pub struct InvalidTransition {
    pub from: RunState,
    pub index: usize,
    pub phase: JobPhase,
}

/// Tracks a sequential run of `total` jobs.
pub struct RunStateMachine {
    total: usize,
    state: RunState,
    history: Vec<RunState>,
}

impl RunStateMachine {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            state: RunState::NotStarted,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state visited before the current one.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// An empty run has nothing to submit and is done as soon as it starts.
    pub fn start(&mut self) -> RunState {
        if self.state == RunState::NotStarted && self.total == 0 {
            self.move_to(RunState::Done);
        }
        self.state
    }

    /// Apply a phase change reported for job `index` and return the new state.
    ///
    /// - `Submitting` is accepted only for the next job in order.
    /// - `Polling` is accepted only for the job currently submitting.
    /// - `Resolved` advances to the next job's submission, or to `Done` after the last.
    pub fn observe(&mut self, index: usize, phase: JobPhase) -> Result<RunState, InvalidTransition> {
        let next = match (self.state, phase) {
            (RunState::NotStarted, JobPhase::Submitting) if index == 0 && self.total > 0 => {
                RunState::Submitting(0)
            }
            (RunState::Submitting(i), JobPhase::Submitting) if i == index => return Ok(self.state),
            (RunState::Submitting(i), JobPhase::Polling) if i == index => RunState::Polling(i),
            (RunState::Submitting(i) | RunState::Polling(i), JobPhase::Resolved(status))
                if i == index && status.is_terminal() =>
            {
                if i + 1 < self.total {
                    RunState::Submitting(i + 1)
                } else {
                    RunState::Done
                }
            }
            (from, phase) => return Err(InvalidTransition { from, index, phase }),
        };
        self.move_to(next);
        Ok(next)
    }

    fn move_to(&mut self, next: RunState) {
        self.history.push(self.state);
        self.state = next;
    }
}
