use super::error::{FitError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const PROGRESS_DELAY: f64 = 5.0;
pub const IMPROVEMENT_DELAY: f64 = 5.0;
pub const CONVERGENCE_UPDATE: f64 = 5.0;
pub const UNCERTAINTY_UPDATE: f64 = 300.0;

/// Reporting cadences for a fit job, in seconds of trajectory time.
///
/// A cadence of zero on the convergence or uncertainty monitor disables the
/// periodic updates and leaves only the final report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub convergence_update: f64,
    pub uncertainty_update: f64,
    pub progress_delay: f64,
    pub improvement_delay: f64,
    pub terminate_on_finish: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            convergence_update: CONVERGENCE_UPDATE,
            uncertainty_update: UNCERTAINTY_UPDATE,
            progress_delay: PROGRESS_DELAY,
            improvement_delay: IMPROVEMENT_DELAY,
            terminate_on_finish: false,
        }
    }
}

impl ExecutorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| FitError::InvalidConfig(format!("executor config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_convergence_update(mut self, rate: f64) -> Self {
        self.convergence_update = rate;
        self
    }

    pub fn with_uncertainty_update(mut self, rate: f64) -> Self {
        self.uncertainty_update = rate;
        self
    }

    pub fn with_progress_delay(mut self, delay: f64) -> Self {
        self.progress_delay = delay;
        self
    }

    pub fn with_improvement_delay(mut self, delay: f64) -> Self {
        self.improvement_delay = delay;
        self
    }

    pub fn with_terminate_on_finish(mut self, terminate: bool) -> Self {
        self.terminate_on_finish = terminate;
        self
    }

    /// Reject negative or non-finite cadences.
    pub fn validate(&self) -> Result<()> {
        let cadences = [
            ("convergence_update", self.convergence_update),
            ("uncertainty_update", self.uncertainty_update),
            ("progress_delay", self.progress_delay),
            ("improvement_delay", self.improvement_delay),
        ];
        for (name, value) in cadences {
            if !value.is_finite() || value < 0.0 {
                return Err(FitError::InvalidConfig(format!(
                    "{} must be a finite, non-negative number of seconds (got {})",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Options handed to the fitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Iteration budget
    pub steps: u32,
    /// Stop once the best value falls below this
    pub ftol: f64,
    /// Population size for population methods (None = fitter default)
    pub pop: Option<usize>,
    /// Burn-in iterations for samplers
    pub burn: u32,
    /// Evaluation workers; 0 means one per core, 1 forces same-thread evaluation
    pub workers: usize,
    pub seed: Option<u64>,
    /// Fitter-specific extras, kept in insertion order for reports
    pub extra: IndexMap<String, f64>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            steps: 100,
            ftol: 1e-6,
            pop: None,
            burn: 0,
            workers: 0,
            seed: None,
            extra: IndexMap::new(),
        }
    }
}

impl FitOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| FitError::InvalidConfig(format!("fit options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    pub fn with_pop(mut self, pop: usize) -> Self {
        self.pop = Some(pop);
        self
    }

    pub fn with_burn(mut self, burn: u32) -> Self {
        self.burn = burn;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: f64) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Look up a fitter-specific extra, falling back to `default`.
    pub fn extra_or(&self, key: &str, default: f64) -> f64 {
        self.extra.get(key).copied().unwrap_or(default)
    }

    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            return Err(FitError::InvalidConfig("steps must be at least 1".into()));
        }
        if !self.ftol.is_finite() || self.ftol < 0.0 {
            return Err(FitError::InvalidConfig(format!(
                "ftol must be finite and non-negative (got {})",
                self.ftol
            )));
        }
        if let Some(pop) = self.pop {
            if pop < 2 {
                return Err(FitError::InvalidConfig(format!(
                    "pop must be at least 2 (got {})",
                    pop
                )));
            }
        }
        if let Some((key, value)) = self.extra.iter().find(|(_, v)| !v.is_finite()) {
            return Err(FitError::InvalidConfig(format!(
                "option '{}' is not finite ({})",
                key, value
            )));
        }
        Ok(())
    }
}
