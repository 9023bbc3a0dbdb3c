use crate::core::{FitError, Result};

/// Optimization target handed to a fit job.
///
/// Implementors must be cheap to evaluate concurrently (`Sync`) if they
/// report [`Problem::parallel_safe`]; the executor deep-copies the caller's
/// instance before a job starts, so `Clone` must not share mutable state.
pub trait Problem: Send + Sync {
    /// Negative log-likelihood at `point` (THIS IS THE EXPENSIVE CALL)
    fn nllf(&self, point: &[f64]) -> Result<f64>;

    /// Current parameter values
    fn initial_point(&self) -> Vec<f64>;

    /// Parameter bounds (min, max) for each parameter
    fn bounds(&self) -> &[(f64, f64)];

    /// Move the problem to `point` (used once the fit has finished)
    fn set_point(&mut self, point: &[f64]);

    fn num_params(&self) -> usize {
        self.bounds().len()
    }

    fn labels(&self) -> Vec<String> {
        (0..self.num_params()).map(|i| format!("p{}", i)).collect()
    }

    /// Degrees of freedom used to scale nllf into a reduced chi-square.
    fn dof(&self) -> f64 {
        0.0
    }

    /// Whether evaluations may run on a parallel pool. Problems wrapping a
    /// non-reentrant external resource should return false.
    fn parallel_safe(&self) -> bool {
        true
    }

    /// Clamp `point` into the bounds in place.
    fn clamp(&self, point: &mut [f64]) {
        for (x, &(min, max)) in point.iter_mut().zip(self.bounds()) {
            *x = x.max(min).min(max);
        }
    }
}

/// Reject bounds no fitter can work inside: NaN limits, `min > max`, or a
/// bound count that differs from the parameter count.
pub fn check_bounds(problem: &dyn Problem) -> Result<()> {
    let bounds = problem.bounds();
    let params = problem.initial_point().len();
    if bounds.len() != params {
        return Err(FitError::InvalidConfig(format!(
            "{} bounds for {} parameters",
            bounds.len(),
            params
        )));
    }
    let labels = problem.labels();
    for (i, &(min, max)) in bounds.iter().enumerate() {
        if min.is_nan() || max.is_nan() || min > max {
            let label = labels.get(i).map_or("?", String::as_str);
            return Err(FitError::InvalidConfig(format!(
                "bounds for {} are ({}, {})",
                label, min, max
            )));
        }
    }
    Ok(())
}

/// Scale and uncertainty for converting nllf into reduced chi-square.
///
/// Returns `(1, 0)` when the problem has no usable degrees of freedom.
pub fn nllf_scale(problem: &dyn Problem) -> (f64, f64) {
    let dof = problem.dof();
    if dof.is_finite() && dof > 0.0 {
        (2.0 / dof, 1.0 / dof)
    } else {
        (1.0, 0.0)
    }
}

/// Compact `value(err)` notation with two significant digits of uncertainty.
///
/// `format_uncertainty(12.3456, 0.0123) == "12.346(12)"`.
pub fn format_uncertainty(value: f64, err: f64) -> String {
    if !value.is_finite() {
        return format!("{}", value);
    }
    if !err.is_finite() || err <= 0.0 {
        return format_value(value);
    }

    let mut place = err.log10().floor() as i32 - 1;
    let mut digits = (err / 10f64.powi(place)).round() as u64;
    if digits >= 100 {
        place += 1;
        digits = (err / 10f64.powi(place)).round() as u64;
    }

    if place < 0 {
        let decimals = (-place) as usize;
        format!("{:.*}({})", decimals, value, digits)
    } else {
        let unit = 10f64.powi(place);
        let rounded = (value / unit).round() * unit;
        format!("{:.0}({})", rounded, digits * unit as u64)
    }
}

fn format_value(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-3..1e6).contains(&magnitude) {
        return format!("{:.5e}", value);
    }
    let text = format!("{:.6}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}
