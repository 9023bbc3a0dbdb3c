use super::abort::AbortSignal;
use super::history::{History, Iteration};
use super::monitor::{MessageSink, MonitorChain};
use super::solvers::traits::OptimizationCallback;
use crate::core::Result;
use std::cell::Cell;
use std::time::Instant;

/// Callback handed to the fitter by the driver: records each iteration into
/// the history, runs the monitor chain over it and relays the abort flag.
pub struct MonitorCallback<'a> {
    history: &'a mut History,
    monitors: &'a mut MonitorChain,
    sink: &'a mut dyn MessageSink,
    abort: &'a AbortSignal,
    started: Instant,
    steps: usize,
    abort_seen: Cell<bool>,
}

impl<'a> MonitorCallback<'a> {
    pub fn new(
        history: &'a mut History,
        monitors: &'a mut MonitorChain,
        sink: &'a mut dyn MessageSink,
        abort: &'a AbortSignal,
    ) -> Self {
        Self {
            history,
            monitors,
            sink,
            abort,
            started: Instant::now(),
            steps: 0,
            abort_seen: Cell::new(false),
        }
    }

    /// Last step reported by the fitter
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// True once the fitter has been told to stop
    pub fn abort_seen(&self) -> bool {
        self.abort_seen.get()
    }
}

impl OptimizationCallback for MonitorCallback<'_> {
    fn on_iteration(&mut self, iteration: Iteration<'_>) -> Result<()> {
        let time = self.started.elapsed().as_secs_f64();
        self.steps = iteration.step;

        self.history.record(&iteration, time);
        self.monitors.observe(&*self.history, &mut *self.sink)
    }

    fn should_stop(&self) -> bool {
        let aborted = self.abort.is_aborted();
        if aborted && !self.abort_seen.replace(true) {
            log::info!("Abort observed after step {}", self.steps);
        }
        aborted
    }
}
