pub mod abort;
pub mod callback;
pub mod draws;
pub mod driver;
pub mod history;
pub mod mapper;
pub mod monitor;
pub mod problem;
pub mod solvers;

pub use abort::AbortSignal;
pub use callback::MonitorCallback;
pub use draws::{DrawLog, DrawSnapshot};
pub use driver::FitDriver;
pub use history::{Field, History, Iteration, Trace};
pub use mapper::{select_mapper, Mapper, ParallelMapper, SerialMapper};
pub use monitor::{
    ConvergenceMonitor, ImprovementMonitor, MessageSink, Monitor, MonitorChain, ProgressMonitor,
    RateGate, UncertaintyMonitor,
};
pub use problem::{check_bounds, format_uncertainty, nllf_scale, Problem};
pub use solvers::{
    select_fitter, Fitter, FitterKind, MetropolisSampler, NewtonOptimizer, OptimizationCallback,
    ParticleOptimizer, SolverResult, StopReason,
};
