use super::abort::AbortSignal;
use super::callback::MonitorCallback;
use super::history::History;
use super::mapper::Mapper;
use super::monitor::{MessageSink, MonitorChain};
use super::problem::{format_uncertainty, nllf_scale, Problem};
use super::solvers::traits::{Fitter, SolverResult, StopReason};
use crate::core::{Outcome, Result};
use std::fmt::Write;

/// Runs one fitter against one problem with monitors and abort wired in.
///
/// Everything here lives on the fit thread.
pub struct FitDriver {
    fitter: Box<dyn Fitter>,
    mapper: Box<dyn Mapper>,
    monitors: MonitorChain,
    history: History,
    abort: AbortSignal,
    result: Option<SolverResult>,
    steps: usize,
    abort_seen: bool,
}

impl FitDriver {
    /// Collects the monitors' history requirements; fails on a bad declaration.
    pub fn new(
        fitter: Box<dyn Fitter>,
        mapper: Box<dyn Mapper>,
        monitors: MonitorChain,
        abort: AbortSignal,
    ) -> Result<Self> {
        let mut history = History::new();
        monitors.config_history(&mut history)?;
        log::debug!(
            "History requirements: {:?}",
            history
                .requirements()
                .iter()
                .map(|(f, d)| format!("{}={}", f, d))
                .collect::<Vec<_>>()
        );

        Ok(Self {
            fitter,
            mapper,
            monitors,
            history,
            abort,
            result: None,
            steps: 0,
            abort_seen: false,
        })
    }

    pub fn fitter_name(&self) -> &str {
        self.fitter.name()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn monitors(&self) -> &MonitorChain {
        &self.monitors
    }

    pub fn result(&self) -> Option<&SolverResult> {
        self.result.as_ref()
    }

    /// Last step the fitter reported. Read from the history when it keeps
    /// steps, so it survives a fitter that unwinds mid-run.
    pub fn steps(&self) -> usize {
        self.history
            .step()
            .ok()
            .and_then(|trace| trace.latest().copied())
            .unwrap_or(self.steps)
    }

    /// True if the fitter stopped because of an abort request.
    pub fn aborted(&self) -> bool {
        self.abort_seen
            || self
                .result
                .as_ref()
                .is_some_and(|r| r.stop == StopReason::Aborted)
    }

    /// Run the fitter, then move `problem` to the best point found.
    pub fn fit(
        &mut self,
        problem: &mut dyn Problem,
        sink: &mut dyn MessageSink,
    ) -> Result<(Vec<f64>, f64)> {
        log::info!(
            "Starting {} on {} parameters ({} mapper)",
            self.fitter.name(),
            problem.num_params(),
            self.mapper.name()
        );

        let mut callback =
            MonitorCallback::new(&mut self.history, &mut self.monitors, sink, &self.abort);
        let outcome = self
            .fitter
            .solve(&*problem, self.mapper.as_ref(), &mut callback);
        self.steps = callback.steps();
        self.abort_seen = callback.abort_seen();
        let result = outcome?;

        problem.set_point(&result.point);
        log::info!(
            "{} finished: {} after {} steps, value {:.6e}, {} evaluations",
            self.fitter.name(),
            result.stop,
            result.steps,
            result.value,
            result.evaluations
        );

        let best = (result.point.clone(), result.value);
        self.result = Some(result);
        Ok(best)
    }

    /// Give every monitor its final call. Safe to call more than once.
    pub fn finalize(&mut self, sink: &mut dyn MessageSink) -> Result<()> {
        self.monitors.finalize(&self.history, sink)
    }

    /// Text summary of the fit.
    pub fn report(&self, problem: &dyn Problem, outcome: &Outcome) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_report(&mut out, problem, outcome);
        out
    }

    fn write_report(
        &self,
        out: &mut String,
        problem: &dyn Problem,
        outcome: &Outcome,
    ) -> std::fmt::Result {
        writeln!(out, "{}", "=".repeat(80))?;
        writeln!(out, "FIT SUMMARY")?;
        writeln!(out, "{}", "=".repeat(80))?;
        writeln!(out, "Fitter: {}", self.fitter.name())?;
        writeln!(out, "Mapper: {}", self.mapper.name())?;

        let status = match outcome {
            Outcome::Completed => "✓ COMPLETED".to_string(),
            Outcome::Aborted => "✗ ABORTED".to_string(),
            Outcome::Failed { error } => format!("✗ FAILED ({})", error),
        };
        writeln!(out, "Status: {}", status)?;
        writeln!(out, "Steps: {}", self.steps())?;

        if let Some(result) = &self.result {
            let (scale, err) = nllf_scale(problem);
            writeln!(out, "Stop Reason: {}", result.stop)?;
            writeln!(out, "Evaluations: {}", result.evaluations)?;
            writeln!(out, "\nBest Value: {:.6e}", result.value)?;
            writeln!(out, "Chisq: {}", format_uncertainty(scale * result.value, err))?;
            writeln!(out, "\nBest Point:")?;
            for (label, value) in problem.labels().iter().zip(&result.point) {
                writeln!(out, "  {:<20} = {:.6e}", label, value)?;
            }
        }
        writeln!(out, "{}", "=".repeat(80))
    }
}

impl std::fmt::Debug for FitDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitDriver")
            .field("fitter", &self.fitter.name())
            .field("mapper", &self.mapper.name())
            .field("monitors", &self.monitors)
            .field("steps", &self.steps)
            .finish()
    }
}
