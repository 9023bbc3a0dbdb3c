use crate::optimization::history::Field;
use thiserror::Error;

/// Everything that can go wrong while setting up, running or reporting a fit.
#[derive(Debug, Error)]
pub enum FitError {
    // ----- setup -----
    #[error("history field '{0}' was read but never declared by a monitor")]
    UndeclaredField(Field),

    #[error("history field '{field}' requested with depth 0")]
    InvalidDepth { field: Field },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown fitter '{0}'")]
    UnknownFitter(String),

    #[error("failed to build evaluation pool: {0}")]
    Pool(String),

    #[error("failed to spawn fit thread")]
    Spawn(#[source] std::io::Error),

    // ----- running -----
    #[error("objective evaluation failed: {0}")]
    Evaluation(String),

    #[error("fitter failed: {0}")]
    Algorithm(String),

    #[error("fit thread panicked: {0}")]
    Panicked(String),

    // ----- delivery -----
    #[error("event consumer disconnected")]
    BridgeClosed,

    #[error("failed to wake event consumer")]
    Wake(#[source] std::io::Error),
}

impl FitError {
    /// True for errors that mean events can no longer reach the consumer.
    pub fn is_delivery_failure(&self) -> bool {
        matches!(self, FitError::BridgeClosed | FitError::Wake(_))
    }
}

pub type Result<T, E = FitError> = std::result::Result<T, E>;
