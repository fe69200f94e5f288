//! Domain types shared by every baseliner crate.
//!
//! Identifiers are newtypes so a project id can never be passed where a
//! project name is expected. Everything that ends up in the run report is
//! serializable via serde.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Repository-host identifier of a project (numeric on GitLab, kept as text).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Human-readable project name, substituted into the README template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectName(pub String);

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Projects and variables
// ---------------------------------------------------------------------------

/// One target repository, as produced by the lister and consumed by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    pub id: ProjectId,
    pub name: ProjectName,
}

impl ProjectDescriptor {
    pub fn new(id: impl Into<ProjectId>, name: impl Into<ProjectName>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ProjectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.name, self.id)
    }
}

/// How the repository host stores a CI/CD variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VariableKind {
    /// Plain environment variable (`env_var` on GitLab).
    #[default]
    #[serde(rename = "env_var")]
    Plain,
    /// Variable whose value is materialised as a file on the runner.
    #[serde(rename = "file")]
    File,
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKind::Plain => write!(f, "env_var"),
            VariableKind::File => write!(f, "file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub kind: VariableKind,
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Authentication material for the secret store, fixed for the whole run.
///
/// Construct through [`CredentialRequest::token`] or
/// [`CredentialRequest::app_role`], which reject empty addresses and paths.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialRequest {
    Token {
        address: String,
        secret_path: String,
        token: String,
    },
    AppRole {
        address: String,
        secret_path: String,
        role_id: String,
        secret_id: String,
    },
}

impl CredentialRequest {
    pub fn token(
        address: impl Into<String>,
        secret_path: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let request = Self::Token {
            address: address.into(),
            secret_path: secret_path.into(),
            token: token.into(),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn app_role(
        address: impl Into<String>,
        secret_path: impl Into<String>,
        role_id: impl Into<String>,
        secret_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let request = Self::AppRole {
            address: address.into(),
            secret_path: secret_path.into(),
            role_id: role_id.into(),
            secret_id: secret_id.into(),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn address(&self) -> &str {
        match self {
            Self::Token { address, .. } | Self::AppRole { address, .. } => address,
        }
    }

    pub fn secret_path(&self) -> &str {
        match self {
            Self::Token { secret_path, .. } | Self::AppRole { secret_path, .. } => secret_path,
        }
    }

    /// Short label used in logs and error messages.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::AppRole { .. } => "approle",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut required = vec![
            ("vault address", self.address()),
            ("secret path", self.secret_path()),
        ];
        match self {
            Self::Token { token, .. } => required.push(("vault_token", token.as_str())),
            Self::AppRole {
                role_id, secret_id, ..
            } => {
                required.push(("role_id", role_id.as_str()));
                required.push(("secret_id", secret_id.as_str()));
            }
        }
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CredentialRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRequest")
            .field("method", &self.method())
            .field("address", &self.address())
            .field("secret_path", &self.secret_path())
            .finish_non_exhaustive()
    }
}

/// Key/value secret read from the secret store. Lives for one run only.
///
/// `Debug` prints the keys, never the values.
#[derive(Clone, Default, PartialEq)]
pub struct SecretBundle {
    values: BTreeMap<String, serde_json::Value>,
    expires_at: Option<DateTime<Utc>>,
}

impl SecretBundle {
    pub fn new(values: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            values,
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// String value under `key`, if present, a string, and non-blank.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl fmt::Debug for SecretBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBundle")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// One reconciliation operation applied to a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    EnsurePipelineFile,
    EnsureReadme,
    ListVariables,
    UpdateVariable { key: String },
    CreateVariable { key: String },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::EnsurePipelineFile => write!(f, "ensure pipeline file"),
            Operation::EnsureReadme => write!(f, "ensure README"),
            Operation::ListVariables => write!(f, "list variables"),
            Operation::UpdateVariable { key } => write!(f, "update variable {key}"),
            Operation::CreateVariable { key } => write!(f, "create variable {key}"),
        }
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub operation: Operation,
    pub cause: String,
    /// The step was not run, or was abandoned, because the run was cancelled.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

impl StepFailure {
    pub fn new(operation: Operation, cause: impl fmt::Display) -> Self {
        Self {
            operation,
            cause: cause.to_string(),
            cancelled: false,
        }
    }

    pub fn cancelled(operation: Operation) -> Self {
        Self {
            operation,
            cause: "run cancelled".to_string(),
            cancelled: true,
        }
    }
}

/// Result of applying the baseline to one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationOutcome {
    pub project: ProjectDescriptor,
    pub failures: Vec<StepFailure>,
}

impl ReconciliationOutcome {
    pub fn new(project: ProjectDescriptor) -> Self {
        Self {
            project,
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Aggregate of every outcome collected during a run.
///
/// Only [`RunSummary::record`] mutates the counters, so
/// `attempted == succeeded + failed` holds by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    attempted: usize,
    succeeded: usize,
    failed: usize,
    errors: Vec<ReconciliationOutcome>,
}

impl RunSummary {
    pub fn record(&mut self, outcome: ReconciliationOutcome) {
        self.attempted += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            self.errors.push(outcome);
        }
    }

    /// Orders `errors` by project name then id, for stable reports.
    pub fn sort_errors(&mut self) {
        self.errors.sort_by(|a, b| {
            a.project
                .name
                .cmp(&b.project.name)
                .then_with(|| a.project.id.cmp(&b.project.id))
        });
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn errors(&self) -> &[ReconciliationOutcome] {
        &self.errors
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
