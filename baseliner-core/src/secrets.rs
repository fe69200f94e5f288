//! Secret-store capability: exchange the run's credentials for a bundle.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::SecretBundle;

/// Key in the secret bundle that holds the repository-host token.
pub const HOST_TOKEN_KEY: &str = "token";

/// Any failure to obtain usable credentials. Fatal to the run.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The secret-store client could not be built.
    #[error("could not build secret-store client: {0}")]
    Client(String),

    /// The authenticate phase was rejected or failed in transport.
    #[error("{method} authentication failed: {reason}")]
    Authenticate { method: &'static str, reason: String },

    /// Login returned success but carried no authentication payload.
    #[error("{method} login succeeded but returned no authentication data")]
    MissingAuth { method: &'static str },

    /// The read-secret phase failed.
    #[error("could not read secret at {path}: {reason}")]
    ReadSecret { path: String, reason: String },

    /// The bundle does not contain a usable repository-host token.
    #[error("secret bundle has no usable `{key}` entry")]
    MissingHostToken { key: &'static str },
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Authenticate, then read the configured secret. No retries, no caching.
    async fn retrieve(&self) -> Result<SecretBundle, CredentialError>;
}

/// Extracts the repository-host token from a freshly retrieved bundle.
pub fn host_token(bundle: &SecretBundle) -> Result<&str, CredentialError> {
    bundle
        .get_str(HOST_TOKEN_KEY)
        .ok_or(CredentialError::MissingHostToken {
            key: HOST_TOKEN_KEY,
        })
}
