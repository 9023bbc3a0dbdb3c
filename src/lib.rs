//! Background fit execution.
//!
//! A [`FitExecutor`] runs one fitter against a private copy of a [`Problem`]
//! on its own thread. Rate-gated monitors sample the trajectory and publish
//! [`FitEvent`]s through an [`EventBridge`], which wakes the consumer after
//! every enqueue. Every started job ends with exactly one `complete` event.

pub mod bridge;
pub mod core;
pub mod executor;
pub mod optimization;

pub use bridge::{Emitter, EventBridge, EventInbox, Wake};
pub use crate::core::*;
pub use executor::{FitExecutor, FitHandle, FitResult, JobState};
pub use optimization::*;
