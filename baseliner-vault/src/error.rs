//! Error types for baseliner-vault.

use thiserror::Error;

/// A single failed call against the secret store.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("could not build HTTP client: {0}")]
    Client(String),

    #[error("request to {path} failed: {reason}")]
    Transport { path: String, reason: String },

    #[error("{path} returned {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("could not decode response from {path}: {reason}")]
    Decode { path: String, reason: String },
}
