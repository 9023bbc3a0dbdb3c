use super::{current_time, MessageSink, Monitor, RateGate};
use crate::core::{Message, Result};
use crate::optimization::history::{Field, History};
use crate::optimization::problem::format_uncertainty;

/// Periodic report of the best value and point so far.
pub struct ProgressMonitor {
    gate: RateGate,
    scale: f64,
    err: f64,
}

impl ProgressMonitor {
    /// `scale`/`err` convert nllf into reduced chi-square (see `nllf_scale`).
    pub fn new(delay: f64, scale: f64, err: f64) -> Self {
        Self {
            gate: RateGate::leading(delay),
            scale,
            err,
        }
    }
}

impl Monitor for ProgressMonitor {
    fn name(&self) -> &str {
        "ProgressMonitor"
    }

    fn config_history(&self, history: &mut History) -> Result<()> {
        history.requires(Field::Time, 1)?;
        history.requires(Field::Step, 1)?;
        history.requires(Field::Value, 1)?;
        history.requires(Field::Point, 1)
    }

    fn observe(&mut self, history: &History, sink: &mut dyn MessageSink) -> Result<()> {
        let Some(time) = current_time(history)? else {
            return Ok(());
        };
        if !self.gate.try_pass(time) {
            return Ok(());
        }

        let (Some(&step), Some(&value), Some(point)) = (
            history.step()?.latest(),
            history.value()?.latest(),
            history.point()?.latest(),
        ) else {
            return Ok(());
        };

        sink.emit(Message::Progress {
            step,
            value,
            chisq: format_uncertainty(self.scale * value, self.err),
            point: point.clone(),
        })
    }
}

/// Reports new best values.
///
/// A new best is emitted right away unless the previous improvement was
/// reported less than `delay` ago; in that case it stays pending and goes out
/// on the first iteration after the gate reopens, carrying the best value and
/// point tracked so far (not whatever the fitter reported last).
pub struct ImprovementMonitor {
    gate: RateGate,
    best: f64,
    best_point: Vec<f64>,
    pending: bool,
}

impl ImprovementMonitor {
    pub fn new(delay: f64) -> Self {
        Self {
            gate: RateGate::leading(delay),
            best: f64::INFINITY,
            best_point: Vec::new(),
            pending: false,
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }
}

impl Monitor for ImprovementMonitor {
    fn name(&self) -> &str {
        "ImprovementMonitor"
    }

    fn config_history(&self, history: &mut History) -> Result<()> {
        history.requires(Field::Time, 1)?;
        history.requires(Field::Step, 1)?;
        history.requires(Field::Value, 1)?;
        history.requires(Field::Point, 1)
    }

    fn observe(&mut self, history: &History, sink: &mut dyn MessageSink) -> Result<()> {
        let (Some(time), Some(&step), Some(&value), Some(point)) = (
            current_time(history)?,
            history.step()?.latest(),
            history.value()?.latest(),
            history.point()?.latest(),
        ) else {
            return Ok(());
        };

        if value < self.best {
            self.best = value;
            self.best_point.clone_from(point);
            self.pending = true;
        }
        if self.pending && self.gate.try_pass(time) {
            self.pending = false;
            sink.emit(Message::Improvement {
                step,
                value: self.best,
                point: self.best_point.clone(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::history::Iteration;

    fn history_for(monitor: &dyn Monitor) -> History {
        let mut history = History::new();
        monitor.config_history(&mut history).unwrap();
        history
    }

    #[test]
    fn progress_is_rate_gated_on_trajectory_time() {
        let mut monitor = ProgressMonitor::new(5.0, 1.0, 0.0);
        let mut history = history_for(&monitor);
        let mut sink = Vec::new();

        for (step, time) in [(1, 0.0), (2, 1.0), (3, 4.9), (4, 5.0), (5, 6.0), (6, 12.0)] {
            history.record(&Iteration::new(step, 1.0, &[0.0]), time);
            monitor.observe(&history, &mut sink).unwrap();
        }

        let steps: Vec<usize> = sink
            .iter()
            .map(|m| match m {
                Message::Progress { step, .. } => *step,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(steps, vec![1, 4, 6]);
    }

    #[test]
    fn progress_formats_scaled_value_and_copies_point() {
        let mut monitor = ProgressMonitor::new(0.0, 0.5, 0.25);
        let mut history = history_for(&monitor);
        let mut sink = Vec::new();

        let mut point = vec![1.0, 2.0];
        history.record(&Iteration::new(1, 1.0, &point), 0.0);
        monitor.observe(&history, &mut sink).unwrap();
        point[0] = 99.0;

        match &sink[0] {
            Message::Progress { chisq, point, .. } => {
                assert_eq!(chisq, "0.50(25)");
                assert_eq!(point, &vec![1.0, 2.0]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn improvement_emits_only_new_best() {
        let mut monitor = ImprovementMonitor::new(0.0);
        let mut history = history_for(&monitor);
        let mut sink = Vec::new();

        for (step, value) in [(1, 5.0), (2, 5.0), (3, 4.0), (4, 4.5), (5, 3.0)] {
            history.record(&Iteration::new(step, value, &[0.0]), step as f64);
            monitor.observe(&history, &mut sink).unwrap();
        }

        let values: Vec<f64> = sink
            .iter()
            .map(|m| match m {
                Message::Improvement { value, .. } => *value,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(values, vec![5.0, 4.0, 3.0]);
        assert_eq!(monitor.best(), 3.0);
    }

    #[test]
    fn pending_improvement_waits_for_gate() {
        let mut monitor = ImprovementMonitor::new(5.0);
        let mut history = history_for(&monitor);
        let mut sink = Vec::new();

        for (step, value, time) in [(1, 5.0, 0.0), (2, 4.0, 1.0), (3, 3.0, 2.0), (4, 3.0, 6.0)] {
            history.record(&Iteration::new(step, value, &[0.0]), time);
            monitor.observe(&history, &mut sink).unwrap();
        }

        assert_eq!(sink.len(), 2);
        match &sink[1] {
            Message::Improvement { step, value, .. } => {
                assert_eq!(*step, 4);
                assert_eq!(*value, 3.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pending_improvement_reports_tracked_best_not_latest() {
        let mut monitor = ImprovementMonitor::new(5.0);
        let mut history = history_for(&monitor);
        let mut sink = Vec::new();

        // Step 3 reports a worse value than step 2 while the gate is closed
        for (step, value, point, time) in [
            (1, 5.0, 1.0, 0.0),
            (2, 3.0, 2.0, 1.0),
            (3, 4.0, 9.0, 6.0),
        ] {
            history.record(&Iteration::new(step, value, &[point]), time);
            monitor.observe(&history, &mut sink).unwrap();
        }

        assert_eq!(sink.len(), 2);
        match &sink[1] {
            Message::Improvement { step, value, point } => {
                assert_eq!(*step, 3);
                assert_eq!(*value, 3.0);
                assert_eq!(point, &vec![2.0]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
