use super::{current_time, MessageSink, Monitor, RateGate};
use crate::core::{ConvergenceRow, Message, PopulationQuantiles, Result};
use crate::optimization::history::{Field, History};

/// Population spread for the convergence plot.
///
/// With `n` values sorted ascending and `k = floor(0.2 n)`:
/// `min = s[0]`, `q20 = s[k]`, `median = s[floor(0.5 n)]`,
/// `q80 = s[n-1-k]`, `max = s[n-1]`. Returns `None` for an empty population.
pub fn population_quantiles(values: &[f64]) -> Option<PopulationQuantiles> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let k = n / 5;
    Some(PopulationQuantiles {
        min: sorted[0],
        q20: sorted[k],
        median: sorted[n / 2],
        q80: sorted[n - 1 - k],
        max: sorted[n - 1],
    })
}

/// Accumulates one convergence row per iteration and publishes the whole
/// sequence every `rate` seconds and once more at finalize.
///
/// A rate of zero disables the periodic updates.
pub struct ConvergenceMonitor {
    gate: RateGate,
    rows: Vec<ConvergenceRow>,
}

impl ConvergenceMonitor {
    pub fn new(rate: f64) -> Self {
        Self {
            gate: RateGate::trailing(rate),
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[ConvergenceRow] {
        &self.rows
    }

    fn snapshot(&self) -> Message {
        Message::ConvergenceUpdate {
            pop: self.rows.clone(),
        }
    }
}

impl Monitor for ConvergenceMonitor {
    fn name(&self) -> &str {
        "ConvergenceMonitor"
    }

    fn config_history(&self, history: &mut History) -> Result<()> {
        history.requires(Field::PopulationValues, 1)?;
        history.requires(Field::Value, 1)?;
        history.requires(Field::Time, 1)
    }

    fn observe(&mut self, history: &History, sink: &mut dyn MessageSink) -> Result<()> {
        let (Some(time), Some(&best)) = (current_time(history)?, history.value()?.latest()) else {
            return Ok(());
        };

        let quantiles = history
            .population_values()?
            .latest()
            .and_then(|pop| population_quantiles(pop));
        self.rows.push(ConvergenceRow { best, quantiles });

        if self.gate.rate() > 0.0 && self.gate.try_pass(time) {
            sink.emit(self.snapshot())?;
        }
        Ok(())
    }

    fn finalize(&mut self, _history: &History, sink: &mut dyn MessageSink) -> Result<()> {
        sink.emit(self.snapshot())
    }
}
