//! Process exit codes.

use std::process::ExitCode;

use baseliner_core::secrets::CredentialError;
use baseliner_core::ConfigError;
use baseliner_renderer::RenderError;
use baseliner_sync::{ListError, RunError};

pub const SUCCESS: u8 = 0;
pub const FAILURE: u8 = 1;
pub const CONFIG: u8 = 2;
pub const CREDENTIAL: u8 = 3;
pub const LISTING: u8 = 4;
pub const PARTIAL: u8 = 5;
pub const CANCELLED: u8 = 130;

pub fn code_for(err: &anyhow::Error) -> ExitCode {
    ExitCode::from(status_for(err))
}

/// Phase label of a fatal run error anywhere in the chain.
pub fn phase_of(err: &anyhow::Error) -> Option<&'static str> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<RunError>())
        .map(RunError::phase)
}

/// Status of the first recognised error in the chain.
fn status_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.is::<ConfigError>() || cause.is::<RenderError>() {
            return CONFIG;
        }
        if cause.is::<CredentialError>() {
            return CREDENTIAL;
        }
        if cause.is::<ListError>() {
            return LISTING;
        }
        if let Some(run) = cause.downcast_ref::<RunError>() {
            return match run {
                RunError::Credential(_) | RunError::Connect(_) => CREDENTIAL,
                RunError::Listing(_) => LISTING,
                RunError::Cancelled(_) => CANCELLED,
                RunError::Task { .. } => FAILURE,
            };
        }
    }
    FAILURE
}
