//! Runs fits on dedicated worker threads.
//!
//! The executor takes the caller's `Arc<P>`, deep-copies it when the job
//! starts and hands the copy to the worker. Events carry the original `Arc`
//! so the consumer can tell which of its problems they belong to; the abort
//! flag is the only state the caller and the worker share.

mod handle;
mod job;

pub use handle::{FitHandle, FitResult, JobState};

use crate::bridge::{Emitter, EventBridge};
use crate::core::{ExecutorConfig, FitError, FitOptions, JobId, Result};
use crate::optimization::{
    check_bounds, select_fitter, select_mapper, AbortSignal, FitDriver, Fitter, FitterKind,
    MonitorChain, Problem,
};
use handle::SharedState;
use job::FitJob;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

static NEXT_JOB: AtomicU64 = AtomicU64::new(1);

enum FitterChoice {
    Named(String),
    Custom(Box<dyn Fitter>),
}

/// One configured fit, ready to [`start`](FitExecutor::start).
pub struct FitExecutor<P> {
    problem: Arc<P>,
    fitter: FitterChoice,
    options: FitOptions,
    config: ExecutorConfig,
    monitors: Option<MonitorChain>,
    bridge: EventBridge<P>,
    abort: AbortSignal,
}

impl<P: Problem + Clone + 'static> FitExecutor<P> {
    /// `fitter` is resolved at start: `"newton"`, `"pso"`, `"dream"`/`"mcmc"`
    /// or `"auto"`.
    pub fn new(
        problem: Arc<P>,
        fitter: &str,
        bridge: EventBridge<P>,
        abort: AbortSignal,
    ) -> Self {
        Self {
            problem,
            fitter: FitterChoice::Named(fitter.to_string()),
            options: FitOptions::default(),
            config: ExecutorConfig::default(),
            monitors: None,
            bridge,
            abort,
        }
    }

    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this fitter instead of one chosen by name.
    pub fn with_fitter(mut self, fitter: Box<dyn Fitter>) -> Self {
        self.fitter = FitterChoice::Custom(fitter);
        self
    }

    /// Replace the standard monitor chain.
    pub fn with_monitors(mut self, monitors: MonitorChain) -> Self {
        self.monitors = Some(monitors);
        self
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    /// Validate, snapshot the problem and spawn the worker.
    ///
    /// Setup errors are returned here, before any thread exists; after that
    /// every outcome arrives as exactly one `complete` event.
    pub fn start(self) -> Result<FitHandle> {
        self.config.validate()?;
        self.options.validate()?;

        let snapshot: P = (*self.problem).clone();
        check_bounds(&snapshot)?;
        let (fitter, reason) = match self.fitter {
            FitterChoice::Named(name) => {
                let kind: FitterKind = name.parse()?;
                select_fitter(kind, &snapshot, &self.options)
            }
            FitterChoice::Custom(fitter) => {
                let reason = format!("Custom fitter: {}", fitter.name());
                (fitter, reason)
            }
        };
        log::info!("{}", reason);

        let mapper = select_mapper(&snapshot, self.options.workers)?;
        let monitors = self
            .monitors
            .unwrap_or_else(|| MonitorChain::standard(&self.config, &snapshot));
        let driver = FitDriver::new(fitter, mapper, monitors, self.abort.clone())?;

        let job = JobId(NEXT_JOB.fetch_add(1, Ordering::Relaxed));
        let state = SharedState::new();
        let fit_job = FitJob {
            job,
            snapshot,
            driver,
            emitter: Emitter::new(job, Arc::clone(&self.problem), self.bridge),
            state: state.clone(),
            terminate: self.config.terminate_on_finish,
        };
        log::debug!("Prepared {:?}", fit_job);

        state.set(JobState::Running);
        let thread = thread::Builder::new()
            .name(format!("fit-{}", job))
            .spawn(move || fit_job.run())
            .map_err(|e| {
                state.finish(JobState::Failed);
                FitError::Spawn(e)
            })?;

        log::info!("{} started", job);
        Ok(FitHandle::new(job, state, self.abort, thread))
    }
}

impl<P> std::fmt::Debug for FitExecutor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fitter = match &self.fitter {
            FitterChoice::Named(name) => name.as_str(),
            FitterChoice::Custom(fitter) => fitter.name(),
        };
        f.debug_struct("FitExecutor")
            .field("fitter", &fitter)
            .field("options", &self.options)
            .field("config", &self.config)
            .finish()
    }
}
