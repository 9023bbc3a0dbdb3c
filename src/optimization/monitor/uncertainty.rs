use super::{current_time, MessageSink, Monitor, RateGate};
use crate::core::{Message, Result};
use crate::optimization::history::{Field, History};

/// Publishes copies of the sampler's uncertainty state.
///
/// The history only holds draw snapshots; the copy is made when a message
/// goes out. Silent for fitters that never produce one.
pub struct UncertaintyMonitor {
    gate: RateGate,
}

impl UncertaintyMonitor {
    pub fn new(rate: f64) -> Self {
        Self {
            gate: RateGate::trailing(rate),
        }
    }
}

impl Monitor for UncertaintyMonitor {
    fn name(&self) -> &str {
        "UncertaintyMonitor"
    }

    fn config_history(&self, history: &mut History) -> Result<()> {
        history.requires(Field::Time, 1)?;
        history.requires(Field::UncertaintyState, 1)
    }

    fn observe(&mut self, history: &History, sink: &mut dyn MessageSink) -> Result<()> {
        if self.gate.rate() <= 0.0 {
            return Ok(());
        }
        let (Some(time), Some(state)) = (
            current_time(history)?,
            history.uncertainty_state()?.latest(),
        ) else {
            return Ok(());
        };

        if self.gate.try_pass(time) {
            sink.emit(Message::UncertaintyUpdate {
                uncertainty_state: state.to_state(),
            })?;
        }
        Ok(())
    }

    fn finalize(&mut self, history: &History, sink: &mut dyn MessageSink) -> Result<()> {
        match history.uncertainty_state()?.latest() {
            Some(state) => sink.emit(Message::UncertaintyFinal {
                uncertainty_state: state.to_state(),
            }),
            None => Ok(()),
        }
    }
}
