use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifies one fit job on a shared bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Snapshot of a sampler's posterior state.
///
/// Always an owned copy: the sampler keeps mutating its own buffers after a
/// snapshot has been queued.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyState {
    pub generation: usize,
    /// Retained draws, one row per draw
    pub draws: Vec<Vec<f64>>,
    /// Log-probability of each retained draw
    pub logp: Vec<f64>,
    pub acceptance_rate: f64,
}

impl UncertaintyState {
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// Draw with the highest log-probability.
    pub fn best(&self) -> Option<(&[f64], f64)> {
        self.logp
            .iter()
            .enumerate()
            .filter(|(_, lp)| !lp.is_nan())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, &lp)| (self.draws[i].as_slice(), lp))
    }
}

/// Population spread markers for one convergence sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopulationQuantiles {
    pub min: f64,
    pub q20: f64,
    pub median: f64,
    pub q80: f64,
    pub max: f64,
}

/// One convergence sample; `quantiles` is absent for single-point methods.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceRow {
    pub best: f64,
    pub quantiles: Option<PopulationQuantiles>,
}

impl ConvergenceRow {
    /// Flatten to `[best, min, q20, median, q80, max]` or `[best]`.
    pub fn to_vec(&self) -> Vec<f64> {
        match self.quantiles {
            Some(q) => vec![self.best, q.min, q.q20, q.median, q.q80, q.max],
            None => vec![self.best],
        }
    }
}

/// How a job reached its terminal state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Aborted,
    Failed { error: String },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

/// Payload of the terminal `complete` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub outcome: Outcome,
    pub steps: usize,
    pub point: Vec<f64>,
    pub value: f64,
    /// Captured text report of the fit
    pub info: String,
    /// Consumer should shut down after handling this event
    pub terminate: bool,
}

/// Messages emitted by a fit job, tagged by kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum Message {
    Progress {
        step: usize,
        value: f64,
        chisq: String,
        point: Vec<f64>,
    },
    Improvement {
        step: usize,
        value: f64,
        point: Vec<f64>,
    },
    ConvergenceUpdate {
        pop: Vec<ConvergenceRow>,
    },
    UncertaintyUpdate {
        uncertainty_state: UncertaintyState,
    },
    UncertaintyFinal {
        uncertainty_state: UncertaintyState,
    },
    Complete(Completion),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Progress { .. } => "progress",
            Message::Improvement { .. } => "improvement",
            Message::ConvergenceUpdate { .. } => "convergence_update",
            Message::UncertaintyUpdate { .. } => "uncertainty_update",
            Message::UncertaintyFinal { .. } => "uncertainty_final",
            Message::Complete(_) => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Message::Complete(_))
    }
}

/// A message stamped with the job that produced it and the caller's original
/// problem, so consumers can match events against the object they track.
pub struct FitEvent<P> {
    pub job: JobId,
    pub problem: Arc<P>,
    pub message: Message,
}

impl<P> FitEvent<P> {
    pub fn kind(&self) -> &'static str {
        self.message.kind()
    }

    /// True if this event belongs to the given problem instance.
    pub fn is_for(&self, problem: &Arc<P>) -> bool {
        Arc::ptr_eq(&self.problem, problem)
    }

    /// Render as JSON for forwarding to a client; the problem is not included.
    pub fn to_json(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Envelope<'a> {
            job: JobId,
            #[serde(flatten)]
            message: &'a Message,
        }
        serde_json::to_string(&Envelope {
            job: self.job,
            message: &self.message,
        })
    }
}

impl<P> Clone for FitEvent<P> {
    fn clone(&self) -> Self {
        Self {
            job: self.job,
            problem: Arc::clone(&self.problem),
            message: self.message.clone(),
        }
    }
}

impl<P> fmt::Debug for FitEvent<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitEvent")
            .field("job", &self.job)
            .field("message", &self.message)
            .finish()
    }
}
