use super::draws::DrawSnapshot;
use crate::core::{FitError, Result};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::fmt;

/// Trajectory series a monitor can ask the history to retain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Step,
    Value,
    Point,
    PopulationValues,
    Time,
    UncertaintyState,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Step,
        Field::Value,
        Field::Point,
        Field::PopulationValues,
        Field::Time,
        Field::UncertaintyState,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Step => "step",
            Field::Value => "value",
            Field::Point => "point",
            Field::PopulationValues => "population_values",
            Field::Time => "time",
            Field::UncertaintyState => "uncertainty_state",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bounded series of samples, newest first.
#[derive(Clone, Debug)]
pub struct Trace<T> {
    depth: usize,
    samples: VecDeque<T>,
}

impl<T> Default for Trace<T> {
    fn default() -> Self {
        Self {
            depth: 0,
            samples: VecDeque::new(),
        }
    }
}

impl<T> Trace<T> {
    /// Number of samples retained (0 = not declared).
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample `age` steps back; 0 is the most recent.
    pub fn get(&self, age: usize) -> Option<&T> {
        self.samples.get(age)
    }

    pub fn latest(&self) -> Option<&T> {
        self.samples.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }

    fn require(&mut self, depth: usize) {
        self.depth = self.depth.max(depth);
    }

    fn put(&mut self, sample: T) {
        if self.depth == 0 {
            return;
        }
        self.samples.push_front(sample);
        self.samples.truncate(self.depth);
    }
}

/// One optimizer iteration as reported by a fitter.
///
/// Borrowed views into the fitter's working buffers; the history copies what
/// it retains, except draw snapshots, which share the sampler's store.
#[derive(Clone, Copy, Debug)]
pub struct Iteration<'a> {
    pub step: usize,
    /// Best value so far
    pub value: f64,
    /// Best point so far
    pub point: &'a [f64],
    pub population_values: Option<&'a [f64]>,
    pub uncertainty_state: Option<&'a DrawSnapshot>,
}

impl<'a> Iteration<'a> {
    pub fn new(step: usize, value: f64, point: &'a [f64]) -> Self {
        Self {
            step,
            value,
            point,
            population_values: None,
            uncertainty_state: None,
        }
    }

    pub fn with_population(mut self, values: &'a [f64]) -> Self {
        self.population_values = Some(values);
        self
    }

    pub fn with_uncertainty(mut self, state: &'a DrawSnapshot) -> Self {
        self.uncertainty_state = Some(state);
        self
    }
}

/// Rolling, field-selective record of the optimization trajectory.
///
/// Monitors declare what they need with [`History::requires`] before the
/// loop starts; only declared fields are retained, each bounded by the
/// largest depth requested for it.
#[derive(Clone, Debug, Default)]
pub struct History {
    step: Trace<usize>,
    value: Trace<f64>,
    point: Trace<Vec<f64>>,
    population_values: Trace<Vec<f64>>,
    time: Trace<f64>,
    uncertainty_state: Trace<DrawSnapshot>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `field` must keep at least `depth` trailing samples.
    pub fn requires(&mut self, field: Field, depth: usize) -> Result<()> {
        if depth == 0 {
            return Err(FitError::InvalidDepth { field });
        }
        match field {
            Field::Step => self.step.require(depth),
            Field::Value => self.value.require(depth),
            Field::Point => self.point.require(depth),
            Field::PopulationValues => self.population_values.require(depth),
            Field::Time => self.time.require(depth),
            Field::UncertaintyState => self.uncertainty_state.require(depth),
        }
        Ok(())
    }

    pub fn depth(&self, field: Field) -> usize {
        match field {
            Field::Step => self.step.depth(),
            Field::Value => self.value.depth(),
            Field::Point => self.point.depth(),
            Field::PopulationValues => self.population_values.depth(),
            Field::Time => self.time.depth(),
            Field::UncertaintyState => self.uncertainty_state.depth(),
        }
    }

    pub fn is_declared(&self, field: Field) -> bool {
        self.depth(field) > 0
    }

    /// Declared fields and their depths.
    pub fn requirements(&self) -> IndexMap<Field, usize> {
        Field::ALL
            .iter()
            .filter(|f| self.is_declared(**f))
            .map(|&f| (f, self.depth(f)))
            .collect()
    }

    /// Append one iteration at trajectory time `time`.
    ///
    /// Undeclared fields are dropped without copying.
    pub fn record(&mut self, iteration: &Iteration<'_>, time: f64) {
        self.step.put(iteration.step);
        self.value.put(iteration.value);
        self.time.put(time);
        if self.point.depth() > 0 {
            self.point.put(iteration.point.to_vec());
        }
        if let Some(values) = iteration.population_values {
            if self.population_values.depth() > 0 {
                self.population_values.put(values.to_vec());
            }
        }
        if let Some(state) = iteration.uncertainty_state {
            if self.uncertainty_state.depth() > 0 {
                self.uncertainty_state.put(state.clone());
            }
        }
    }

    pub fn step(&self) -> Result<&Trace<usize>> {
        declared(Field::Step, &self.step)
    }

    pub fn value(&self) -> Result<&Trace<f64>> {
        declared(Field::Value, &self.value)
    }

    pub fn point(&self) -> Result<&Trace<Vec<f64>>> {
        declared(Field::Point, &self.point)
    }

    pub fn population_values(&self) -> Result<&Trace<Vec<f64>>> {
        declared(Field::PopulationValues, &self.population_values)
    }

    pub fn time(&self) -> Result<&Trace<f64>> {
        declared(Field::Time, &self.time)
    }

    pub fn uncertainty_state(&self) -> Result<&Trace<DrawSnapshot>> {
        declared(Field::UncertaintyState, &self.uncertainty_state)
    }
}

fn declared<T>(field: Field, trace: &Trace<T>) -> Result<&Trace<T>> {
    if trace.depth() == 0 {
        Err(FitError::UndeclaredField(field))
    } else {
        Ok(trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undeclared_field_is_an_error() {
        let mut history = History::new();
        history.requires(Field::Value, 1).unwrap();

        assert!(history.value().is_ok());
        match history.point() {
            Err(FitError::UndeclaredField(Field::Point)) => {}
            other => panic!("expected UndeclaredField, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn zero_depth_is_rejected() {
        let mut history = History::new();
        assert!(matches!(
            history.requires(Field::Time, 0),
            Err(FitError::InvalidDepth { field: Field::Time })
        ));
    }

    #[test]
    fn depth_is_max_of_requests() {
        let mut history = History::new();
        history.requires(Field::Value, 2).unwrap();
        history.requires(Field::Value, 1).unwrap();
        assert_eq!(history.depth(Field::Value), 2);

        let reqs = history.requirements();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[&Field::Value], 2);
    }

    #[test]
    fn traces_behave_as_ring_buffers() {
        let mut history = History::new();
        history.requires(Field::Step, 2).unwrap();
        history.requires(Field::Point, 1).unwrap();

        let mut point = vec![0.0, 0.0];
        for step in 1..=5 {
            point[0] = step as f64;
            history.record(&Iteration::new(step, 10.0 - step as f64, &point), step as f64);
        }

        let steps = history.step().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps.get(0), Some(&5));
        assert_eq!(steps.get(1), Some(&4));
        assert_eq!(steps.get(2), None);

        // Retained point is a copy, not a view of the live buffer
        point[0] = -1.0;
        assert_eq!(history.point().unwrap().latest(), Some(&vec![5.0, 0.0]));
    }

    #[test]
    fn missing_optional_fields_leave_trace_empty() {
        let mut history = History::new();
        history.requires(Field::PopulationValues, 1).unwrap();
        history.requires(Field::UncertaintyState, 1).unwrap();
        history.record(&Iteration::new(1, 1.0, &[0.0]), 0.0);

        assert!(history.population_values().unwrap().is_empty());
        assert!(history.uncertainty_state().unwrap().latest().is_none());

        let pop = [3.0, 1.0];
        history.record(&Iteration::new(2, 1.0, &[0.0]).with_population(&pop), 1.0);
        assert_eq!(history.population_values().unwrap().latest(), Some(&vec![3.0, 1.0]));
    }
}
