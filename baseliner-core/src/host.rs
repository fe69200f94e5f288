//! Repository-host capability consumed by the lister and the workers.
//!
//! Implementations are expected to be cheap to share (`Arc<dyn
//! RepositoryHost>`); dropping a returned future abandons the call.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ProjectId, ProjectName, VariableRecord};

/// Failure of a single repository-host call.
#[derive(Debug, Error)]
pub enum HostError {
    /// The request never produced an HTTP response (DNS, TLS, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The host answered with a non-success status.
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("could not decode response from {path}: {reason}")]
    Decode { path: String, reason: String },

    /// The client could not be constructed or the request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub exclude_archived: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            exclude_archived: true,
        }
    }
}

/// A project as reported by the host, before the lister validates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProject {
    pub id: ProjectId,
    pub name: ProjectName,
    pub archived: bool,
}

/// Content and commit metadata for a single-file commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCommit {
    pub path: String,
    pub branch: String,
    pub content: String,
    pub message: String,
}

#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Every project under `namespace`, all pages drained.
    async fn list_projects(
        &self,
        namespace: &str,
        options: ListOptions,
    ) -> Result<Vec<HostProject>, HostError>;

    /// `Ok(false)` only when the host positively reports the file as absent.
    async fn file_exists(
        &self,
        project: &ProjectId,
        path: &str,
        branch: &str,
    ) -> Result<bool, HostError>;

    async fn create_file(&self, project: &ProjectId, commit: &FileCommit) -> Result<(), HostError>;

    async fn update_file(&self, project: &ProjectId, commit: &FileCommit) -> Result<(), HostError>;

    async fn list_variables(&self, project: &ProjectId) -> Result<Vec<VariableRecord>, HostError>;

    async fn create_variable(
        &self,
        project: &ProjectId,
        key: &str,
        value: &str,
    ) -> Result<(), HostError>;

    async fn update_variable(
        &self,
        project: &ProjectId,
        key: &str,
        value: &str,
    ) -> Result<(), HostError>;
}
