//! # baseliner-sync
//!
//! Credential acquisition, project enumeration and concurrent reconciliation.
//!
//! Call [`pipeline::run`] for a full run, or [`pipeline::discover`] to stop
//! after listing. Both are cancellable through a [`Shutdown`] handle driven
//! by a [`CancellationController`].

pub mod error;
pub mod lister;
pub mod pipeline;
pub mod pool;
pub mod shutdown;
pub mod steps;
pub mod summary;

pub use error::{ListError, RunError, StepError};
pub use pipeline::{Discovery, RunReport, Termination};
pub use pool::PoolReport;
pub use shutdown::{CancelReason, CancellationController, Shutdown};
pub use steps::{next_variable_value, BaselinePlan, Reconciler};
