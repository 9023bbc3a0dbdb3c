use super::problem::Problem;
use crate::core::{FitError, Result};
use rayon::prelude::*;

/// Turns a batch of parameter vectors into objective values.
pub trait Mapper: Send {
    fn name(&self) -> &str;

    fn map(&self, problem: &dyn Problem, points: &[Vec<f64>]) -> Result<Vec<f64>>;
}

/// Evaluates on the calling (fit) thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialMapper;

impl Mapper for SerialMapper {
    fn name(&self) -> &str {
        "serial"
    }

    fn map(&self, problem: &dyn Problem, points: &[Vec<f64>]) -> Result<Vec<f64>> {
        points.iter().map(|p| problem.nllf(p)).collect()
    }
}

/// Evaluates on a private rayon pool owned by the job.
pub struct ParallelMapper {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl ParallelMapper {
    pub fn new(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fit-eval-{}", i))
            .build()
            .map_err(|e| FitError::Pool(e.to_string()))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Mapper for ParallelMapper {
    fn name(&self) -> &str {
        "parallel"
    }

    fn map(&self, problem: &dyn Problem, points: &[Vec<f64>]) -> Result<Vec<f64>> {
        self.pool
            .install(|| points.par_iter().map(|p| problem.nllf(p)).collect())
    }
}

impl std::fmt::Debug for dyn Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mapper({})", self.name())
    }
}

/// Parallel pool if the problem tolerates concurrent evaluation and more
/// than one worker is available, otherwise same-thread evaluation.
///
/// `workers == 0` means one worker per core.
pub fn select_mapper(problem: &dyn Problem, workers: usize) -> Result<Box<dyn Mapper>> {
    let workers = if workers == 0 { num_cpus::get() } else { workers };

    if problem.parallel_safe() && workers > 1 {
        log::debug!("Using parallel mapper with {} workers", workers);
        Ok(Box::new(ParallelMapper::new(workers)?))
    } else {
        log::debug!(
            "Using serial mapper (parallel_safe={}, workers={})",
            problem.parallel_safe(),
            workers
        );
        Ok(Box::new(SerialMapper))
    }
}
