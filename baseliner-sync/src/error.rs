//! Error types for baseliner-sync.

use thiserror::Error;

use baseliner_core::host::HostError;
use baseliner_core::secrets::CredentialError;
use baseliner_renderer::RenderError;

use crate::shutdown::CancelReason;

/// Failure of one reconciliation step. Recorded, never propagated.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// The run was cancelled while the step was waiting on the host.
    #[error("run cancelled")]
    Cancelled,
}

/// Project enumeration failed. Fatal to the run.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("could not list projects in {namespace}: {source}")]
    Host {
        namespace: String,
        #[source]
        source: HostError,
    },

    #[error("host returned an invalid project at position {index}: {reason}")]
    InvalidDescriptor { index: usize, reason: String },
}

/// Fatal run errors, one variant per phase.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("credential phase failed: {0}")]
    Credential(#[from] CredentialError),

    #[error("could not connect to the repository host: {0}")]
    Connect(#[source] baseliner_core::host::HostError),

    #[error("listing phase failed: {0}")]
    Listing(#[from] ListError),

    #[error("run cancelled before reconciliation: {0}")]
    Cancelled(CancelReason),

    #[error("{task} task failed: {reason}")]
    Task { task: String, reason: String },
}

impl RunError {
    /// Phase label used in the final report.
    pub fn phase(&self) -> &'static str {
        match self {
            RunError::Credential(_) | RunError::Connect(_) => "credentials",
            RunError::Listing(_) => "listing",
            RunError::Cancelled(_) => "cancelled",
            RunError::Task { .. } => "reconciliation",
        }
    }
}
