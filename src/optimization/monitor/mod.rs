//! Observers sampling the optimization trajectory.
//!
//! Each monitor owns its own rate gate and decides independently whether an
//! iteration is worth reporting. Monitors only read the [`History`] and push
//! owned [`Message`]s into a [`MessageSink`]; they never block.

mod chain;
mod convergence;
mod gate;
mod progress;
mod uncertainty;

pub use chain::MonitorChain;
pub use convergence::{population_quantiles, ConvergenceMonitor};
pub use gate::RateGate;
pub use progress::{ImprovementMonitor, ProgressMonitor};
pub use uncertainty::UncertaintyMonitor;

use super::history::History;
use crate::core::{Message, Result};

/// Destination for messages produced by monitors.
pub trait MessageSink {
    fn emit(&mut self, message: Message) -> Result<()>;
}

impl MessageSink for Vec<Message> {
    fn emit(&mut self, message: Message) -> Result<()> {
        self.push(message);
        Ok(())
    }
}

/// An observer invoked once per iteration and finalized once at job end.
pub trait Monitor: Send {
    fn name(&self) -> &str;

    /// Declare the history fields this monitor reads.
    fn config_history(&self, history: &mut History) -> Result<()>;

    fn observe(&mut self, history: &History, sink: &mut dyn MessageSink) -> Result<()>;

    /// Close out the monitor after the loop has ended, for any reason.
    fn finalize(&mut self, _history: &History, _sink: &mut dyn MessageSink) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Monitor({})", self.name())
    }
}

/// Newest trajectory time, or `None` before the first sample.
fn current_time(history: &History) -> Result<Option<f64>> {
    Ok(history.time()?.latest().copied())
}
