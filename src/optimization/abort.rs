use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the caller and a fit job.
///
/// The caller requests; the fitter polls between iterations and decides
/// where it is safe to stop. Nothing ever blocks on it.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the job to stop. Idempotent.
    pub fn request_abort(&self) {
        if !self.flag.swap(true, Ordering::Release) {
            log::info!("Abort requested");
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
