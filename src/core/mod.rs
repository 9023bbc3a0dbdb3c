pub mod config;
pub mod error;
pub mod event;

pub use config::{ExecutorConfig, FitOptions};
pub use error::{FitError, Result};
pub use event::*;
