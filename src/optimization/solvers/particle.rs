use super::traits::{Fitter, OptimizationCallback, SolverResult, StopReason};
use super::{sample_within, seeded_rng, span};
use crate::core::Result;
use crate::optimization::history::Iteration;
use crate::optimization::mapper::Mapper;
use crate::optimization::problem::Problem;
use rand::Rng;

const MAX_STAGNATION: u32 = 5;

/// Particle Swarm Optimization - often outperforms gradient-based methods
/// for noisy, non-convex problems with fewer cost evaluations
pub struct ParticleOptimizer {
    max_steps: u32,
    ftol: f64,
    population_size: usize,
    inertia: f64,   // w - velocity inertia weight
    cognitive: f64, // c1 - personal best influence
    social: f64,    // c2 - global best influence
    seed: Option<u64>,
}

impl ParticleOptimizer {
    pub fn new(max_steps: u32, ftol: f64) -> Self {
        Self {
            max_steps,
            ftol,
            population_size: 20,
            inertia: 0.7,
            cognitive: 1.5,
            social: 1.5,
            seed: None,
        }
    }

    /// Configure swarm size (default: 20, at least 2)
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size.max(2);
        self
    }

    /// Configure PSO parameters (defaults: w=0.7, c1=1.5, c2=1.5)
    pub fn with_pso_params(mut self, inertia: f64, cognitive: f64, social: f64) -> Self {
        self.inertia = inertia;
        self.cognitive = cognitive;
        self.social = social;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn population_size(&self) -> usize {
        self.population_size
    }

    /// First particle is the problem's starting point, the rest are spread
    /// over the bounds.
    fn initialize_particles<R: Rng>(
        &self,
        problem: &dyn Problem,
        start: &[f64],
        rng: &mut R,
    ) -> Vec<Vec<f64>> {
        let bounds = problem.bounds();
        let mut particles = Vec::with_capacity(self.population_size);
        particles.push(start.to_vec());

        for _ in 1..self.population_size {
            let particle = bounds
                .iter()
                .zip(start)
                .map(|(&bound, &center)| sample_within(bound, center, rng))
                .collect();
            particles.push(particle);
        }
        particles
    }

    /// Small random velocities, a tenth of each parameter's span
    fn initialize_velocities<R: Rng>(
        &self,
        problem: &dyn Problem,
        start: &[f64],
        rng: &mut R,
    ) -> Vec<Vec<f64>> {
        let bounds = problem.bounds();
        (0..self.population_size)
            .map(|_| {
                bounds
                    .iter()
                    .zip(start)
                    .map(|(&bound, &center)| {
                        let range = span(bound, center) * 0.1;
                        rng.random_range(-range..=range)
                    })
                    .collect()
            })
            .collect()
    }
}

impl Fitter for ParticleOptimizer {
    fn name(&self) -> &str {
        "PSO"
    }

    fn solve(
        &mut self,
        problem: &dyn Problem,
        mapper: &dyn Mapper,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<SolverResult> {
        let n = problem.num_params();
        let bounds = problem.bounds();
        let mut rng = seeded_rng(self.seed);

        let mut start = problem.initial_point();
        problem.clamp(&mut start);

        // Initialize swarm
        let mut particles = self.initialize_particles(problem, &start, &mut rng);
        let mut velocities = self.initialize_velocities(problem, &start, &mut rng);
        let mut personal_best_positions = particles.clone();
        let mut personal_best_values = vec![f64::INFINITY; self.population_size];

        let mut global_best_idx = 0;
        let mut global_best_value = f64::INFINITY;

        let mut evaluations = 0;
        let mut stagnation_counter = 0;

        let finish = |stop, step, value, point: &[f64], evaluations| SolverResult {
            stop,
            value,
            steps: step,
            point: point.to_vec(),
            evaluations,
        };

        for step in 1..=self.max_steps as usize {
            if callback.should_stop() {
                return Ok(finish(
                    StopReason::Aborted,
                    step - 1,
                    global_best_value,
                    &personal_best_positions[global_best_idx],
                    evaluations,
                ));
            }
            let prev_global_best = global_best_value;

            // Evaluate the whole swarm as one batch
            for particle in particles.iter_mut() {
                problem.clamp(particle);
            }
            let values = mapper.map(problem, &particles)?;
            evaluations += particles.len();

            for (p, &value) in values.iter().enumerate() {
                // NaN never becomes a best
                if value < personal_best_values[p] {
                    personal_best_values[p] = value;
                    personal_best_positions[p].copy_from_slice(&particles[p]);
                }
                if value < global_best_value {
                    global_best_value = value;
                    global_best_idx = p;
                }
            }

            callback.on_iteration(
                Iteration::new(
                    step,
                    global_best_value,
                    &personal_best_positions[global_best_idx],
                )
                .with_population(&values),
            )?;

            if global_best_value < self.ftol {
                return Ok(finish(
                    StopReason::Converged,
                    step,
                    global_best_value,
                    &personal_best_positions[global_best_idx],
                    evaluations,
                ));
            }

            if (prev_global_best - global_best_value).abs() < self.ftol * 0.01 {
                stagnation_counter += 1;
                if stagnation_counter >= MAX_STAGNATION {
                    return Ok(finish(
                        StopReason::Stagnated,
                        step,
                        global_best_value,
                        &personal_best_positions[global_best_idx],
                        evaluations,
                    ));
                }
            } else {
                stagnation_counter = 0;
            }

            // Update velocities and positions for all particles
            for p in 0..self.population_size {
                for i in 0..n {
                    let r1 = rng.random::<f64>();
                    let r2 = rng.random::<f64>();

                    // PSO velocity update equation
                    velocities[p][i] = self.inertia * velocities[p][i]
                        + self.cognitive * r1 * (personal_best_positions[p][i] - particles[p][i])
                        + self.social
                            * r2
                            * (personal_best_positions[global_best_idx][i] - particles[p][i]);

                    // Clamp velocity to fraction of search space
                    let v_max = span(bounds[i], start[i]) * 0.2;
                    velocities[p][i] = velocities[p][i].clamp(-v_max, v_max);

                    particles[p][i] += velocities[p][i];
                }
            }
        }

        Ok(finish(
            StopReason::MaxSteps,
            self.max_steps as usize,
            global_best_value,
            &personal_best_positions[global_best_idx],
            evaluations,
        ))
    }
}
