use super::traits::{Fitter, OptimizationCallback, SolverResult, StopReason};
use crate::core::{FitError, Result};
use crate::optimization::history::Iteration;
use crate::optimization::mapper::Mapper;
use crate::optimization::problem::Problem;

/// Backtracking trials evaluated together in one line-search batch
const LINE_SEARCH_TRIALS: usize = 10;

/// Adaptive gradient descent with a batched Armijo line search.
///
/// Single-point method: reports neither population values nor uncertainty.
/// Each step costs two evaluation batches, the central-difference gradient
/// and the line search.
pub struct NewtonOptimizer {
    max_steps: u32,
    ftol: f64,
    learning_rate: f64,
    min_learning_rate: f64,
    max_learning_rate: f64,
    armijo_c: f64,         // Armijo condition parameter
    backtrack_factor: f64, // Line search backtracking
    increase_factor: f64,  // Learning rate increase when successful
    relative_step: f64,    // Finite difference step relative to |x|
}

impl NewtonOptimizer {
    pub fn new(max_steps: u32, ftol: f64) -> Self {
        Self {
            max_steps,
            ftol,
            learning_rate: 0.1,
            min_learning_rate: 1e-6,
            max_learning_rate: 1.0,
            armijo_c: 1e-4,
            backtrack_factor: 0.5,
            increase_factor: 1.2,
            relative_step: 1e-6,
        }
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate.clamp(self.min_learning_rate, self.max_learning_rate);
        self
    }

    /// Centre point followed by (x + h e_i, x - h e_i) pairs.
    fn gradient_batch(&self, problem: &dyn Problem, point: &[f64]) -> Vec<Vec<f64>> {
        let mut batch = Vec::with_capacity(2 * point.len() + 1);
        batch.push(point.to_vec());
        for i in 0..point.len() {
            let h = self.relative_step * point[i].abs().max(1.0);
            let mut plus = point.to_vec();
            let mut minus = point.to_vec();
            plus[i] += h;
            minus[i] -= h;
            problem.clamp(&mut plus);
            problem.clamp(&mut minus);
            batch.push(plus);
            batch.push(minus);
        }
        batch
    }

    fn gradient(batch: &[Vec<f64>], values: &[f64], gradient: &mut [f64]) {
        for (i, g) in gradient.iter_mut().enumerate() {
            let (plus, minus) = (2 * i + 1, 2 * i + 2);
            // Clamping at a bound can shrink the stencil to one side
            let width = batch[plus][i] - batch[minus][i];
            *g = if width > 0.0 {
                (values[plus] - values[minus]) / width
            } else {
                0.0
            };
        }
    }
}

impl Fitter for NewtonOptimizer {
    fn name(&self) -> &str {
        "AdaptiveNewton"
    }

    fn solve(
        &mut self,
        problem: &dyn Problem,
        mapper: &dyn Mapper,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<SolverResult> {
        let n = problem.num_params();
        let mut point = problem.initial_point();
        problem.clamp(&mut point);

        let mut gradient = vec![0.0; n];
        let mut value = f64::INFINITY;
        let mut learning_rate = self.learning_rate;
        let mut consecutive_improvements = 0;
        let mut evaluations = 0;

        let finish = |stop, point: Vec<f64>, value, steps, evaluations| SolverResult {
            stop,
            value,
            steps,
            point,
            evaluations,
        };

        for step in 1..=self.max_steps as usize {
            // Gradient batch
            if callback.should_stop() {
                return Ok(finish(StopReason::Aborted, point, value, step - 1, evaluations));
            }
            let batch = self.gradient_batch(problem, &point);
            let values = mapper.map(problem, &batch)?;
            evaluations += batch.len();

            let current = values[0];
            if current.is_nan() {
                return Err(FitError::Evaluation(format!(
                    "nllf is NaN at step {} ({:?})",
                    step, point
                )));
            }
            value = current;
            Self::gradient(&batch, &values, &mut gradient);
            let grad_norm_sq: f64 = gradient.iter().map(|g| g * g).sum();

            if grad_norm_sq == 0.0 {
                callback.on_iteration(Iteration::new(step, value, &point))?;
                return Ok(finish(StopReason::Converged, point, value, step, evaluations));
            }

            // Line search batch: alpha, alpha*b, alpha*b^2, ...
            if callback.should_stop() {
                return Ok(finish(StopReason::Aborted, point, value, step - 1, evaluations));
            }
            let alphas: Vec<f64> = (0..LINE_SEARCH_TRIALS)
                .map(|k| learning_rate * self.backtrack_factor.powi(k as i32))
                .collect();
            let trials: Vec<Vec<f64>> = alphas
                .iter()
                .map(|alpha| {
                    let mut trial: Vec<f64> = point
                        .iter()
                        .zip(&gradient)
                        .map(|(x, g)| x - alpha * g)
                        .collect();
                    problem.clamp(&mut trial);
                    trial
                })
                .collect();
            let trial_values = mapper.map(problem, &trials)?;
            evaluations += trials.len();

            // First trial meeting the Armijo condition, else the best improving one
            let accepted = trial_values
                .iter()
                .zip(&alphas)
                .position(|(&v, &alpha)| v <= value - self.armijo_c * alpha * grad_norm_sq)
                .or_else(|| {
                    trial_values
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| **v < value)
                        .min_by(|a, b| a.1.total_cmp(b.1))
                        .map(|(k, _)| k)
                });

            let improvement = match accepted {
                Some(k) => {
                    let gain = value - trial_values[k];
                    point.clone_from(&trials[k]);
                    value = trial_values[k];

                    // Adapt learning rate based on progress
                    if k == 0 {
                        consecutive_improvements += 1;
                        if consecutive_improvements >= 3 {
                            learning_rate =
                                (learning_rate * self.increase_factor).min(self.max_learning_rate);
                        }
                    } else {
                        consecutive_improvements = 0;
                        learning_rate = alphas[k].max(self.min_learning_rate);
                    }
                    gain
                }
                None => {
                    consecutive_improvements = 0;
                    learning_rate = (learning_rate * self.backtrack_factor.powi(LINE_SEARCH_TRIALS as i32))
                        .max(self.min_learning_rate);
                    0.0
                }
            };

            callback.on_iteration(Iteration::new(step, value, &point))?;

            if value < self.ftol {
                return Ok(finish(StopReason::Converged, point, value, step, evaluations));
            }
            if accepted.is_none() && learning_rate <= self.min_learning_rate {
                log::debug!("Line search exhausted at step {}", step);
                return Ok(finish(StopReason::Stagnated, point, value, step, evaluations));
            }
            log::trace!(
                "step {}: value {:.6e}, gain {:.3e}, lr {:.3e}",
                step,
                value,
                improvement,
                learning_rate
            );
        }

        Ok(finish(
            StopReason::MaxSteps,
            point,
            value,
            self.max_steps as usize,
            evaluations,
        ))
    }
}
