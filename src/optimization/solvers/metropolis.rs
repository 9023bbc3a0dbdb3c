use super::traits::{Fitter, OptimizationCallback, SolverResult, StopReason};
use super::{seeded_rng, span};
use crate::core::Result;
use crate::optimization::draws::DrawLog;
use crate::optimization::history::Iteration;
use crate::optimization::mapper::Mapper;
use crate::optimization::problem::Problem;
use rand::Rng;
use rand_distr::StandardNormal;

/// Acceptance window the proposal width is tuned towards during burn-in
const TARGET_ACCEPTANCE: (f64, f64) = (0.2, 0.5);

/// Random-walk Metropolis sampler over a set of independent walkers.
///
/// Every step proposes one move per walker and evaluates all proposals as a
/// single batch. Draws are retained after burn-in and reported as the
/// uncertainty state; the best draw is the fit result.
pub struct MetropolisSampler {
    steps: u32,
    burn: u32,
    walkers: usize,
    /// Proposal width as a fraction of each parameter's span
    scale: f64,
    seed: Option<u64>,
}

impl MetropolisSampler {
    pub fn new(steps: u32, burn: u32) -> Self {
        Self {
            steps,
            burn,
            walkers: 10,
            scale: 0.05,
            seed: None,
        }
    }

    pub fn with_walkers(mut self, walkers: usize) -> Self {
        self.walkers = walkers.max(2);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn walkers(&self) -> usize {
        self.walkers
    }
}

impl Fitter for MetropolisSampler {
    fn name(&self) -> &str {
        "Metropolis"
    }

    fn solve(
        &mut self,
        problem: &dyn Problem,
        mapper: &dyn Mapper,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<SolverResult> {
        let mut rng = seeded_rng(self.seed);
        let mut start = problem.initial_point();
        problem.clamp(&mut start);
        let widths: Vec<f64> = problem
            .bounds()
            .iter()
            .zip(&start)
            .map(|(&bound, &center)| span(bound, center) * self.scale)
            .collect();
        let mut scale = 1.0;

        let mut draws = DrawLog::new();
        let mut best_point = start.clone();
        let mut best_value = f64::INFINITY;
        let mut evaluations = 0;
        let mut accepted_total = 0usize;
        let mut proposed_total = 0usize;

        let finish = |stop, steps, value, point: Vec<f64>, evaluations| SolverResult {
            stop,
            value,
            steps,
            point,
            evaluations,
        };

        // Walkers start in a small ball around the starting point
        if callback.should_stop() {
            return Ok(finish(StopReason::Aborted, 0, best_value, best_point, 0));
        }
        let mut walkers: Vec<Vec<f64>> = (0..self.walkers)
            .map(|w| {
                let mut walker = start.clone();
                if w > 0 {
                    jitter(&mut walker, &widths, 1.0, &mut rng);
                    problem.clamp(&mut walker);
                }
                walker
            })
            .collect();
        let mut nllf = mapper.map(problem, &walkers)?;
        evaluations += walkers.len();
        for (walker, &value) in walkers.iter().zip(&nllf) {
            if value < best_value {
                best_value = value;
                best_point.clone_from(walker);
            }
        }

        for step in 1..=self.steps as usize {
            if callback.should_stop() {
                return Ok(finish(
                    StopReason::Aborted,
                    step - 1,
                    best_value,
                    best_point,
                    evaluations,
                ));
            }

            let proposals: Vec<Vec<f64>> = walkers
                .iter()
                .map(|walker| {
                    let mut proposal = walker.clone();
                    jitter(&mut proposal, &widths, scale, &mut rng);
                    problem.clamp(&mut proposal);
                    proposal
                })
                .collect();
            let proposed = mapper.map(problem, &proposals)?;
            evaluations += proposals.len();

            let mut accepted = 0;
            for (w, proposal) in proposals.into_iter().enumerate() {
                let delta = proposed[w] - nllf[w];
                // NaN proposals are always rejected; a NaN walker takes any move
                let accept = nllf[w].is_nan() || delta <= 0.0 || rng.random::<f64>() < (-delta).exp();
                if accept && !proposed[w].is_nan() {
                    walkers[w] = proposal;
                    nllf[w] = proposed[w];
                    accepted += 1;
                }
                if nllf[w] < best_value {
                    best_value = nllf[w];
                    best_point.clone_from(&walkers[w]);
                }
            }
            let rate = accepted as f64 / self.walkers as f64;

            if step as u32 <= self.burn {
                // Tune the proposal width while burning in
                if rate < TARGET_ACCEPTANCE.0 {
                    scale *= 0.8;
                } else if rate > TARGET_ACCEPTANCE.1 {
                    scale *= 1.25;
                }
            } else {
                accepted_total += accepted;
                proposed_total += self.walkers;
                draws.append(
                    step,
                    accepted_total as f64 / proposed_total as f64,
                    &walkers,
                    nllf.iter().map(|v| -v),
                );
            }

            let iteration = Iteration::new(step, best_value, &best_point).with_population(&nllf);
            if draws.is_empty() {
                callback.on_iteration(iteration)?;
            } else {
                let snapshot = draws.snapshot();
                callback.on_iteration(iteration.with_uncertainty(&snapshot))?;
            }
        }

        log::debug!(
            "Metropolis retained {} draws over {} steps",
            draws.len(),
            self.steps
        );
        Ok(finish(
            StopReason::MaxSteps,
            self.steps as usize,
            best_value,
            best_point,
            evaluations,
        ))
    }
}

fn jitter<R: Rng>(point: &mut [f64], widths: &[f64], scale: f64, rng: &mut R) {
    for (x, width) in point.iter_mut().zip(widths) {
        let z: f64 = rng.sample(StandardNormal);
        *x += z * width * scale;
    }
}
