use super::{
    ConvergenceMonitor, ImprovementMonitor, MessageSink, Monitor, ProgressMonitor,
    UncertaintyMonitor,
};
use crate::core::{ExecutorConfig, Result};
use crate::optimization::history::History;
use crate::optimization::problem::{nllf_scale, Problem};

/// Ordered set of monitors invoked every iteration and finalized once.
#[derive(Default)]
pub struct MonitorChain {
    monitors: Vec<Box<dyn Monitor>>,
    finalized: bool,
}

impl std::fmt::Debug for MonitorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorChain")
            .field("monitors", &self.names())
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl MonitorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(monitors: Vec<Box<dyn Monitor>>) -> Self {
        Self {
            monitors,
            finalized: false,
        }
    }

    /// Progress, improvement, convergence and uncertainty monitors, cheapest
    /// first.
    pub fn standard(config: &ExecutorConfig, problem: &dyn Problem) -> Self {
        let (scale, err) = nllf_scale(problem);
        Self::new()
            .with(ProgressMonitor::new(config.progress_delay, scale, err))
            .with(ImprovementMonitor::new(config.improvement_delay))
            .with(ConvergenceMonitor::new(config.convergence_update))
            .with(UncertaintyMonitor::new(config.uncertainty_update))
    }

    pub fn with<M: Monitor + 'static>(mut self, monitor: M) -> Self {
        self.push(Box::new(monitor));
        self
    }

    pub fn push(&mut self, monitor: Box<dyn Monitor>) {
        self.monitors.push(monitor);
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.monitors.iter().map(|m| m.name()).collect()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Collect every monitor's history requirements.
    pub fn config_history(&self, history: &mut History) -> Result<()> {
        for monitor in &self.monitors {
            monitor.config_history(history)?;
        }
        Ok(())
    }

    pub fn observe(&mut self, history: &History, sink: &mut dyn MessageSink) -> Result<()> {
        for monitor in self.monitors.iter_mut() {
            monitor.observe(history, sink)?;
        }
        Ok(())
    }

    /// Finalize every monitor exactly once, in declaration order.
    ///
    /// Later calls are no-ops. A failing monitor does not stop the rest from
    /// being finalized; the first error is returned.
    pub fn finalize(&mut self, history: &History, sink: &mut dyn MessageSink) -> Result<()> {
        if self.finalized {
            log::warn!("Monitor chain already finalized; ignoring repeated call");
            return Ok(());
        }
        self.finalized = true;

        let mut first_error = None;
        for monitor in self.monitors.iter_mut() {
            if let Err(e) = monitor.finalize(history, sink) {
                log::error!("{} failed to finalize: {}", monitor.name(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
