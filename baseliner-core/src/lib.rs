//! Baseliner core library: domain types, layered settings, capability traits.
//!
//! - [`types`]: newtypes, credential requests, secret bundles, run outcomes
//! - [`config`]: YAML base file + TOML overlays + flags + environment
//! - [`host`]: [`RepositoryHost`] trait consumed by the lister and workers
//! - [`secrets`]: [`CredentialProvider`] trait and token extraction
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod host;
pub mod secrets;
pub mod types;

pub use config::{
    AuthType, Baseline, DeclaredVariable, Environment, FileConfig, FileVariablePolicy, Overrides,
    ProductLine, RetryPolicy, Settings, VaultSettings,
};
pub use error::ConfigError;
pub use host::{FileCommit, HostError, HostProject, ListOptions, RepositoryHost};
pub use secrets::{host_token, CredentialError, CredentialProvider, HOST_TOKEN_KEY};
pub use types::{
    CredentialRequest, Operation, ProjectDescriptor, ProjectId, ProjectName,
    ReconciliationOutcome, RunSummary, SecretBundle, StepFailure, VariableKind, VariableRecord,
};
