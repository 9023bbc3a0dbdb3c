#![allow(dead_code)]

use fitrunner::{
    AbortSignal, FitError, Fitter, Iteration, Mapper, OptimizationCallback, Problem, Result,
    SolverResult, StopReason,
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Quadratic bowl whose parameters live in atomics, so the type is `Sync`
/// yet mutable through `&self`. `Clone` copies the values, never the cells.
pub struct Tracked {
    point: Vec<AtomicU64>,
    bounds: Vec<(f64, f64)>,
    pub evaluations: Arc<AtomicUsize>,
    /// Raise this abort once `evaluations` reaches the given count
    pub abort_at: Option<(usize, AbortSignal)>,
}

impl Tracked {
    pub fn new(point: &[f64]) -> Self {
        Self {
            point: point.iter().map(|x| AtomicU64::new(x.to_bits())).collect(),
            bounds: vec![(-10.0, 10.0); point.len()],
            evaluations: Arc::new(AtomicUsize::new(0)),
            abort_at: None,
        }
    }

    pub fn with_abort_at(mut self, count: usize, abort: AbortSignal) -> Self {
        self.abort_at = Some((count, abort));
        self
    }

    pub fn point(&self) -> Vec<f64> {
        self.point
            .iter()
            .map(|x| f64::from_bits(x.load(Ordering::SeqCst)))
            .collect()
    }

    /// Change the parameters in place; visible to every holder of this instance.
    pub fn poke(&self, point: &[f64]) {
        for (cell, x) in self.point.iter().zip(point) {
            cell.store(x.to_bits(), Ordering::SeqCst);
        }
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        Self {
            point: self
                .point
                .iter()
                .map(|x| AtomicU64::new(x.load(Ordering::SeqCst)))
                .collect(),
            bounds: self.bounds.clone(),
            evaluations: Arc::clone(&self.evaluations),
            abort_at: self.abort_at.clone(),
        }
    }
}

impl Problem for Tracked {
    fn nllf(&self, point: &[f64]) -> Result<f64> {
        let count = self.evaluations.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, abort)) = &self.abort_at {
            if count >= *at {
                abort.request_abort();
            }
        }
        Ok(point.iter().map(|x| x * x).sum())
    }

    fn initial_point(&self) -> Vec<f64> {
        self.point()
    }

    fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    fn set_point(&mut self, point: &[f64]) {
        self.poke(point);
    }

    fn dof(&self) -> f64 {
        4.0
    }
}

/// What a scripted fitter does at a given step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Script {
    Run,
    FailAt(usize),
    PanicAt(usize),
}

/// Deterministic fitter: step k evaluates the point `[x0 / k]` as a batch of
/// one and reports it.
pub struct Scripted {
    pub steps: usize,
    pub script: Script,
    /// Wait for a message here before reading the problem
    pub gate: Option<mpsc::Receiver<()>>,
}

impl Scripted {
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            script: Script::Run,
            gate: None,
        }
    }

    pub fn with_script(mut self, script: Script) -> Self {
        self.script = script;
        self
    }

    pub fn gated(mut self, gate: mpsc::Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl Fitter for Scripted {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn solve(
        &mut self,
        problem: &dyn Problem,
        mapper: &dyn Mapper,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<SolverResult> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        let start = problem.initial_point();
        let mut best = (start.clone(), f64::INFINITY);
        let mut evaluations = 0;

        for step in 1..=self.steps {
            if callback.should_stop() {
                return Ok(SolverResult {
                    stop: StopReason::Aborted,
                    value: best.1,
                    steps: step - 1,
                    point: best.0,
                    evaluations,
                });
            }
            match self.script {
                Script::FailAt(at) if at == step => {
                    return Err(FitError::Algorithm(format!("scripted failure at {}", step)));
                }
                Script::PanicAt(at) if at == step => panic!("scripted panic at {}", step),
                _ => {}
            }

            let point: Vec<f64> = start.iter().map(|x| x / step as f64).collect();
            let value = mapper.map(problem, std::slice::from_ref(&point))?[0];
            evaluations += 1;
            if value < best.1 {
                best = (point, value);
            }
            callback.on_iteration(Iteration::new(step, best.1, &best.0))?;
        }

        Ok(SolverResult {
            stop: StopReason::MaxSteps,
            value: best.1,
            steps: self.steps,
            point: best.0,
            evaluations,
        })
    }
}
