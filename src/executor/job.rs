use super::handle::{panic_message, FitResult, JobState, SharedState};
use crate::bridge::Emitter;
use crate::core::{Completion, FitError, JobId, Message, Outcome, Result};
use crate::optimization::{FitDriver, MessageSink, Problem};
use std::panic::{self, AssertUnwindSafe};

/// Everything a worker thread needs, moved in at spawn.
pub(crate) struct FitJob<P> {
    pub(crate) job: JobId,
    /// The job's private copy
    pub(crate) snapshot: P,
    pub(crate) driver: FitDriver,
    /// Stamps events with the caller's instance
    pub(crate) emitter: Emitter<P>,
    pub(crate) state: SharedState,
    pub(crate) terminate: bool,
}

impl<P: Problem> FitJob<P> {
    /// Worker body: fit, finalize, publish exactly one completion.
    pub(crate) fn run(mut self) -> Result<FitResult> {
        log::info!(
            "{} running {} on {} parameters",
            self.job,
            self.driver.fitter_name(),
            self.snapshot.num_params()
        );

        let fitted = panic::catch_unwind(AssertUnwindSafe(|| {
            self.driver.fit(&mut self.snapshot, &mut self.emitter)
        }));

        // First delivery failure is kept and surfaces from join()
        let mut delivery: Option<FitError> = None;
        let mut outcome = match fitted {
            Ok(Ok(_)) if self.driver.aborted() => {
                log::info!("{} aborted after {} steps", self.job, self.driver.steps());
                Outcome::Aborted
            }
            Ok(Ok(_)) => Outcome::Completed,
            Ok(Err(e)) => {
                log::error!("{} failed: {}", self.job, e);
                let error = e.to_string();
                if e.is_delivery_failure() {
                    delivery = Some(e);
                }
                Outcome::Failed { error }
            }
            Err(payload) => {
                let e = FitError::Panicked(panic_message(payload.as_ref()));
                log::error!("{} failed: {}", self.job, e);
                Outcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let finalized = panic::catch_unwind(AssertUnwindSafe(|| {
            self.driver.finalize(&mut self.emitter)
        }));
        let finalize_error = match finalized {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(payload) => Some(FitError::Panicked(panic_message(payload.as_ref()))),
        };
        if let Some(e) = finalize_error {
            log::error!("{} monitor finalize failed: {}", self.job, e);
            if !outcome.is_failure() {
                outcome = Outcome::Failed {
                    error: e.to_string(),
                };
            }
            if e.is_delivery_failure() && delivery.is_none() {
                delivery = Some(e);
            }
        }

        let (point, value) = self.best();
        let report = self.driver.report(&self.snapshot, &outcome);
        let result = FitResult {
            job: self.job,
            outcome: outcome.clone(),
            steps: self.driver.steps(),
            point: point.clone(),
            value,
            report: report.clone(),
        };

        let completion = Message::Complete(Completion {
            outcome,
            steps: result.steps,
            point,
            value,
            info: report,
            terminate: self.terminate,
        });
        if let Err(e) = self.emitter.emit(completion) {
            log::error!("{} could not publish completion: {}", self.job, e);
            delivery.get_or_insert(e);
        }

        // Single transition out of Running, once delivery is known
        let terminal = match delivery {
            Some(_) => JobState::Failed,
            None => JobState::from(&result.outcome),
        };
        self.state.finish(terminal);
        log::info!(
            "{} finished ({}), {} events published",
            self.job,
            terminal,
            self.emitter.published()
        );

        match delivery {
            Some(e) => Err(e),
            None => Ok(result),
        }
    }

    /// Fitter result if there is one, else the newest recorded point, else
    /// where the problem started.
    fn best(&self) -> (Vec<f64>, f64) {
        if let Some(result) = self.driver.result() {
            return (result.point.clone(), result.value);
        }
        let history = self.driver.history();
        let point = history.point().ok().and_then(|t| t.latest().cloned());
        let value = history.value().ok().and_then(|t| t.latest().copied());
        match (point, value) {
            (Some(point), Some(value)) => (point, value),
            _ => (self.snapshot.initial_point(), f64::NAN),
        }
    }
}

impl<P> std::fmt::Debug for FitJob<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitJob")
            .field("job", &self.job)
            .field("driver", &self.driver)
            .field("state", &self.state.get())
            .finish()
    }
}
