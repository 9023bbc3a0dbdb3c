mod metropolis;
mod newton;
mod particle;
pub mod traits;

pub use metropolis::MetropolisSampler;
pub use newton::NewtonOptimizer;
pub use particle::ParticleOptimizer;
pub use traits::{Fitter, OptimizationCallback, SolverResult, StopReason};

use crate::core::{FitError, FitOptions, Result};
use crate::optimization::problem::Problem;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::fmt;
use std::str::FromStr;

/// Fitter requested by name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FitterKind {
    /// Pick from the problem's shape
    #[default]
    Auto,
    Newton,
    Pso,
    Dream,
}

impl FitterKind {
    pub fn name(&self) -> &'static str {
        match self {
            FitterKind::Auto => "auto",
            FitterKind::Newton => "newton",
            FitterKind::Pso => "pso",
            FitterKind::Dream => "dream",
        }
    }
}

impl fmt::Display for FitterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FitterKind {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(FitterKind::Auto),
            "newton" | "gradient" => Ok(FitterKind::Newton),
            "pso" | "particle" => Ok(FitterKind::Pso),
            "dream" | "mcmc" | "metropolis" => Ok(FitterKind::Dream),
            _ => Err(FitError::UnknownFitter(s.to_string())),
        }
    }
}

/// Build the fitter for `kind`, resolving `Auto` from the problem shape.
///
/// Returns the fitter and a one-line reason for the choice.
pub fn select_fitter(
    kind: FitterKind,
    problem: &dyn Problem,
    options: &FitOptions,
) -> (Box<dyn Fitter>, String) {
    let steps = options.steps;
    let ftol = options.ftol;

    match kind {
        FitterKind::Newton => (
            Box::new(
                NewtonOptimizer::new(steps, ftol)
                    .with_learning_rate(options.extra_or("learning_rate", 0.1)),
            ),
            "Requested: Newton".into(),
        ),
        FitterKind::Pso => {
            let pop = options.pop.unwrap_or(20);
            (
                Box::new(
                    ParticleOptimizer::new(steps, ftol)
                        .with_population_size(pop)
                        .with_seed(options.seed),
                ),
                format!("Requested: PSO (pop={})", pop),
            )
        }
        FitterKind::Dream => {
            let walkers = options.pop.unwrap_or(10);
            (
                Box::new(
                    MetropolisSampler::new(steps, options.burn)
                        .with_walkers(walkers)
                        .with_scale(options.extra_or("scale", 0.05))
                        .with_seed(options.seed),
                ),
                format!(
                    "Requested: Metropolis sampler (walkers={}, burn={})",
                    walkers, options.burn
                ),
            )
        }
        FitterKind::Auto => select_auto(problem, options),
    }
}

fn select_auto(problem: &dyn Problem, options: &FitOptions) -> (Box<dyn Fitter>, String) {
    let num_params = problem.num_params();
    let bounds = problem.bounds();

    // Analyze parameter ranges; unbounded parameters count as wide
    let ranges: Vec<f64> = bounds
        .iter()
        .map(|&(min, max)| if (max - min).is_finite() { max - min } else { f64::MAX })
        .collect();
    let avg_range = if ranges.is_empty() {
        0.0
    } else {
        ranges.iter().map(|r| r / ranges.len() as f64).sum::<f64>()
    };
    let has_tight_bounds = avg_range < 1.0;

    match (num_params, has_tight_bounds) {
        // Small problems with very tight bounds -> Newton
        (n, true) if n <= 2 && avg_range < 0.1 => (
            Box::new(NewtonOptimizer::new(options.steps, options.ftol)),
            format!(
                "Auto: Tiny problem ({} params, range {:.3}) → Newton (fast for smooth functions)",
                n, avg_range
            ),
        ),

        // Everything else -> PSO, population scaled with dimension
        (n, _) => {
            let pop = options.pop.unwrap_or_else(|| (10 + n * 3).min(30));
            (
                Box::new(
                    ParticleOptimizer::new(options.steps, options.ftol)
                        .with_population_size(pop)
                        .with_seed(options.seed),
                ),
                format!("Auto: {} params → PSO (pop={})", n, pop),
            )
        }
    }
}

/// RNG for a fitter run: reproducible when seeded, OS entropy otherwise.
pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Width of a parameter's search range; falls back to the magnitude of
/// `center` when the bounds are open or degenerate.
pub(crate) fn span((min, max): (f64, f64), center: f64) -> f64 {
    let width = max - min;
    if width.is_finite() && width > 0.0 {
        width
    } else {
        center.abs().max(1.0)
    }
}

/// Uniform within finite bounds, Gaussian around `center` otherwise.
pub(crate) fn sample_within<R: Rng>(bound: (f64, f64), center: f64, rng: &mut R) -> f64 {
    let (min, max) = bound;
    if min.is_finite() && max.is_finite() && max >= min {
        rng.random_range(min..=max)
    } else {
        let z: f64 = rng.sample(StandardNormal);
        (center + z * span(bound, center)).clamp(min, max)
    }
}
