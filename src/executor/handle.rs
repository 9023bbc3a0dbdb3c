use crate::core::{FitError, JobId, Outcome, Result};
use crate::optimization::AbortSignal;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Lifecycle of a fit job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    Created = 0,
    Running = 1,
    Completed = 2,
    Aborted = 3,
    Failed = 4,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => JobState::Created,
            1 => JobState::Running,
            2 => JobState::Completed,
            3 => JobState::Aborted,
            _ => JobState::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Aborted | JobState::Failed
        )
    }
}

impl From<&Outcome> for JobState {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Completed => JobState::Completed,
            Outcome::Aborted => JobState::Aborted,
            Outcome::Failed { .. } => JobState::Failed,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JobState::Created => "created",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Aborted => "aborted",
            JobState::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Job state shared between the worker and its handle.
#[derive(Clone, Debug)]
pub(crate) struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(JobState::Created as u8)))
    }

    pub(crate) fn set(&self, state: JobState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub(crate) fn get(&self) -> JobState {
        JobState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move a running job to its terminal state. Only the first call wins.
    pub(crate) fn finish(&self, state: JobState) -> bool {
        self.0
            .compare_exchange(
                JobState::Running as u8,
                state as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// What a finished job hands back through [`FitHandle::join`].
#[derive(Clone, Debug, PartialEq)]
pub struct FitResult {
    pub job: JobId,
    pub outcome: Outcome,
    pub steps: usize,
    pub point: Vec<f64>,
    pub value: f64,
    pub report: String,
}

/// Caller's view of a started job.
#[derive(Debug)]
pub struct FitHandle {
    job: JobId,
    state: SharedState,
    abort: AbortSignal,
    thread: JoinHandle<Result<FitResult>>,
}

impl FitHandle {
    pub(crate) fn new(
        job: JobId,
        state: SharedState,
        abort: AbortSignal,
        thread: JoinHandle<Result<FitResult>>,
    ) -> Self {
        Self {
            job,
            state,
            abort,
            thread,
        }
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    /// Running until the worker knows whether its completion was delivered,
    /// then the terminal state, which never changes again.
    pub fn state(&self) -> JobState {
        self.state.get()
    }

    /// Ask the job to stop at its next evaluation boundary.
    pub fn abort(&self) {
        self.abort.request_abort();
    }

    /// True once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker. Errors only if events could not be delivered.
    pub fn join(self) -> Result<FitResult> {
        match self.thread.join() {
            Ok(result) => result,
            Err(payload) => {
                self.state.finish(JobState::Failed);
                Err(FitError::Panicked(panic_message(payload.as_ref())))
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
