use crate::core::Result;
use crate::optimization::history::Iteration;
use crate::optimization::mapper::Mapper;
use crate::optimization::problem::Problem;
use std::fmt;

/// Why a fitter left its loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Converged,
    MaxSteps,
    Stagnated,
    Aborted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::Converged => "Converged",
            StopReason::MaxSteps => "Max steps reached",
            StopReason::Stagnated => "Stagnated",
            StopReason::Aborted => "Aborted",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug)]
pub struct SolverResult {
    pub stop: StopReason,
    pub value: f64,
    pub steps: usize,
    pub point: Vec<f64>,
    pub evaluations: usize,
}

impl SolverResult {
    pub fn success(&self) -> bool {
        self.stop == StopReason::Converged
    }
}

/// Hooks the fitter calls while it runs.
pub trait OptimizationCallback {
    /// Called once per iteration with the best-so-far state
    fn on_iteration(&mut self, iteration: Iteration<'_>) -> Result<()>;

    /// Checked before every evaluation batch; true means leave the loop now
    fn should_stop(&self) -> bool {
        false
    }
}

/// Optimization algorithm driven on the fit thread.
pub trait Fitter: Send {
    fn name(&self) -> &str;

    /// Run to convergence, budget exhaustion, or until the callback asks to stop.
    fn solve(
        &mut self,
        problem: &dyn Problem,
        mapper: &dyn Mapper,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<SolverResult>;
}

impl fmt::Debug for dyn Fitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fitter({})", self.name())
    }
}

// ============================================================================
// GUIDE: WRITING A FITTER
// ============================================================================
//
// 1. LOOP PATTERN
//
//    for step in 1..=self.steps {
//        // Step 1: Leave BEFORE starting the next batch if asked to
//        if callback.should_stop() {
//            return Ok(SolverResult { stop: StopReason::Aborted, .. });
//        }
//
//        // Step 2: Evaluate the whole batch through the mapper
//        //         (may run on a parallel pool)
//        let values = mapper.map(problem, &candidates)?;
//
//        // Step 3: Update best-so-far, then report it
//        callback.on_iteration(
//            Iteration::new(step, best_value, &best_point)
//                .with_population(&values),
//        )?;
//
//        // Step 4: Convergence checks
//    }
//
// 2. RULES
//    - problem.nllf() is EXPENSIVE; go through the mapper for batches
//    - report exactly once per iteration, after the batch is evaluated
//    - pass borrowed views of your buffers; the history copies what it keeps
//    - population methods attach `with_population`, samplers keep their draws
//      in a `DrawLog` and attach a `with_uncertainty` snapshot of it;
//      single-point methods attach neither
//    - never block on anything but your own evaluations
//
// ============================================================================
