use crate::core::UncertaintyState;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

#[derive(Debug, Default)]
struct Samples {
    draws: Vec<Vec<f64>>,
    logp: Vec<f64>,
}

/// Append-only store of sampler draws.
///
/// The sampler appends after every generation. Snapshots share the store and
/// only remember how long it was when they were taken, so retaining one per
/// iteration never copies draws; [`DrawSnapshot::to_state`] does.
#[derive(Default)]
pub struct DrawLog {
    samples: Arc<RwLock<Samples>>,
    len: usize,
    generation: usize,
    acceptance_rate: f64,
}

impl DrawLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add one generation of draws with their log-probabilities.
    pub fn append(
        &mut self,
        generation: usize,
        acceptance_rate: f64,
        draws: &[Vec<f64>],
        logp: impl IntoIterator<Item = f64>,
    ) {
        let mut samples = self.samples.write().unwrap_or_else(PoisonError::into_inner);
        samples.draws.extend(draws.iter().cloned());
        samples.logp.extend(logp);
        // Keep the two columns the same length whatever the caller passed
        let len = samples.draws.len().min(samples.logp.len());
        samples.draws.truncate(len);
        samples.logp.truncate(len);
        self.len = len;
        self.generation = generation;
        self.acceptance_rate = acceptance_rate;
    }

    pub fn snapshot(&self) -> DrawSnapshot {
        DrawSnapshot {
            samples: Arc::clone(&self.samples),
            len: self.len,
            generation: self.generation,
            acceptance_rate: self.acceptance_rate,
        }
    }
}

impl fmt::Debug for DrawLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawLog")
            .field("len", &self.len)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Prefix of a [`DrawLog`] as it stood at one generation.
#[derive(Clone)]
pub struct DrawSnapshot {
    samples: Arc<RwLock<Samples>>,
    len: usize,
    generation: usize,
    acceptance_rate: f64,
}

impl DrawSnapshot {
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn acceptance_rate(&self) -> f64 {
        self.acceptance_rate
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Owned copy of the draws this snapshot covers.
    pub fn to_state(&self) -> UncertaintyState {
        let samples = self.read();
        UncertaintyState {
            generation: self.generation,
            draws: samples.draws[..self.len].to_vec(),
            logp: samples.logp[..self.len].to_vec(),
            acceptance_rate: self.acceptance_rate,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Samples> {
        self.samples.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DrawSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawSnapshot")
            .field("len", &self.len)
            .field("generation", &self.generation)
            .field("acceptance_rate", &self.acceptance_rate)
            .finish()
    }
}
