//! Layered run configuration.
//!
//! # Resolution order
//!
//! ```text
//! conf/config.yaml          base file (YAML)
//!   + --conf a.toml ...     overlays, merged key by key in order
//!   + CLI flags             product line, cluster, auth type, workers, timeout
//!   + environment           vault_token | role_id + secret_id, gitlab_url
//!   = Settings              immutable, passed by reference into every component
//! ```
//!
//! Loading is split from resolution so tests can feed a [`FileConfig`] and an
//! [`Environment`] directly without touching the filesystem or process env.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::ConfigError;
use crate::types::CredentialRequest;

pub const DEFAULT_CONFIG_PATH: &str = "conf/config.yaml";
pub const DEFAULT_BRANCH: &str = "main";
/// GitLab's conventional name. Repositories that carry `.gitlab-ci.yaml`
/// need `gitlab.pipeline_path` set, or they end up with both files.
pub const DEFAULT_PIPELINE_PATH: &str = ".gitlab-ci.yml";
pub const DEFAULT_README_PATH: &str = "README.md";
pub const DEFAULT_WORKERS: usize = 4;

pub const ENV_VAULT_TOKEN: &str = "vault_token";
pub const ENV_ROLE_ID: &str = "role_id";
pub const ENV_SECRET_ID: &str = "secret_id";
pub const ENV_GITLAB_URL: &str = "gitlab_url";

const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Enumerated settings
// ---------------------------------------------------------------------------

/// Deployment line; selects a `zone` block in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductLine {
    Prd,
    #[default]
    Stg,
}

impl ProductLine {
    pub fn zone_key(&self) -> &'static str {
        match self {
            ProductLine::Prd => "production",
            ProductLine::Stg => "development",
        }
    }
}

impl FromStr for ProductLine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prd" => Ok(Self::Prd),
            "stg" => Ok(Self::Stg),
            other => Err(ConfigError::invalid(
                "product_line",
                format!("unknown product line '{other}'; expected: prd, stg"),
            )),
        }
    }
}

impl fmt::Display for ProductLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductLine::Prd => write!(f, "prd"),
            ProductLine::Stg => write!(f, "stg"),
        }
    }
}

/// Secret-store authentication method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    Token,
    AppRole,
}

impl FromStr for AuthType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(Self::Token),
            "approle" => Ok(Self::AppRole),
            other => Err(ConfigError::invalid(
                "auth_type",
                format!("unknown auth type '{other}'; expected: token, approle"),
            )),
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthType::Token => write!(f, "token"),
            AuthType::AppRole => write!(f, "approle"),
        }
    }
}

/// How file-backed variables are rewritten.
///
/// `Append` keeps growing the value on every run; `AppendOnce` is an opt-in
/// that skips the write when the project id is already the last segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileVariablePolicy {
    #[default]
    Append,
    AppendOnce,
}

/// A variable every project must carry; created when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredVariable {
    pub key: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// File model
// ---------------------------------------------------------------------------

/// Merged YAML/TOML tree, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub product_line: Option<String>,
    pub cluster_name: Option<String>,
    pub auth_type: Option<String>,
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub zone: ZonesConfig,
    #[serde(default)]
    pub gitlab: GitlabFileConfig,
    #[serde(default)]
    pub vault: VaultFileConfig,
    #[serde(rename = "gitlab-ci-content")]
    pub pipeline_content: Option<String>,
    #[serde(rename = "gitlab-readme-content")]
    pub readme_template: Option<String>,
    #[serde(default)]
    pub file_variable_policy: FileVariablePolicy,
    #[serde(default)]
    pub variables: Vec<DeclaredVariable>,
    #[serde(default)]
    pub retry: RetryFileConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZonesConfig {
    pub production: Option<ZoneConfig>,
    pub development: Option<ZoneConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZoneConfig {
    pub gitlab_namespace: Option<String>,
    pub vault_addr: Option<String>,
    pub secret_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitlabFileConfig {
    pub branch: Option<String>,
    pub pipeline_path: Option<String>,
    pub readme_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultFileConfig {
    pub kv_mount: Option<String>,
    pub approle_mount: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryFileConfig {
    pub attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSettings {
    pub kv_mount: String,
    pub approle_mount: String,
    pub request_timeout: Duration,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            kv_mount: "secret".to_string(),
            approle_mount: "approle".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Desired state applied to every repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub branch: String,
    pub pipeline_path: String,
    /// `None` selects the embedded default pipeline.
    pub pipeline_content: Option<String>,
    pub readme_path: String,
    /// `None` selects the embedded default README template.
    pub readme_template: Option<String>,
    pub file_variable_policy: FileVariablePolicy,
    pub variables: Vec<DeclaredVariable>,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            branch: DEFAULT_BRANCH.to_string(),
            pipeline_path: DEFAULT_PIPELINE_PATH.to_string(),
            pipeline_content: None,
            readme_path: DEFAULT_README_PATH.to_string(),
            readme_template: None,
            file_variable_policy: FileVariablePolicy::default(),
            variables: Vec::new(),
        }
    }
}

/// Bounded retry for idempotent file writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; `1` disables retrying.
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::from_millis(500),
        }
    }

    /// Delay before retry number `retry` (1-based): `backoff * 2^(retry-1)`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.backoff
            .checked_mul(factor)
            .unwrap_or(MAX_RETRY_BACKOFF)
            .min(MAX_RETRY_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Fully validated settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub product_line: ProductLine,
    pub cluster_name: String,
    pub namespace: String,
    pub gitlab_url: String,
    pub credential: CredentialRequest,
    pub vault: VaultSettings,
    pub baseline: Baseline,
    pub workers: usize,
    pub deadline: Option<Duration>,
    pub retry: RetryPolicy,
}

/// Values given on the command line; each one beats the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub product_line: Option<String>,
    pub cluster_name: Option<String>,
    pub auth_type: Option<String>,
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// Raw authentication material and host address from the environment.
#[derive(Clone, Default)]
pub struct Environment {
    pub vault_token: Option<String>,
    pub role_id: Option<String>,
    pub secret_id: Option<String>,
    pub gitlab_url: Option<String>,
}

impl Environment {
    /// Reads the process environment; empty values count as unset.
    pub fn from_process() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            vault_token: get(ENV_VAULT_TOKEN),
            role_id: get(ENV_ROLE_ID),
            secret_id: get(ENV_SECRET_ID),
            gitlab_url: get(ENV_GITLAB_URL),
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("vault_token", &self.vault_token.as_ref().map(|_| "<set>"))
            .field("role_id", &self.role_id.as_ref().map(|_| "<set>"))
            .field("secret_id", &self.secret_id.as_ref().map(|_| "<set>"))
            .field("gitlab_url", &self.gitlab_url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read the base YAML file and merge every TOML overlay over it, in order.
pub fn load_file_config(base: &Path, overlays: &[PathBuf]) -> Result<FileConfig, ConfigError> {
    let contents = read(base)?;
    let mut tree: Value = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
        path: base.to_path_buf(),
        source,
    })?;

    for overlay in overlays {
        let contents = read(overlay)?;
        let parsed: toml::Value = toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: overlay.clone(),
            source,
        })?;
        let parsed = serde_yaml::to_value(parsed).map_err(ConfigError::Shape)?;
        merge_values(&mut tree, parsed);
    }

    if tree.is_null() {
        tree = Value::Mapping(Default::default());
    }
    serde_yaml::from_value(tree).map_err(ConfigError::Shape)
}

/// Deep-merge `overlay` into `base`: mappings merge key by key, anything else
/// replaces the base value.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Validate everything and build [`Settings`].
pub fn resolve(
    file: FileConfig,
    overrides: &Overrides,
    env: &Environment,
) -> Result<Settings, ConfigError> {
    let product_line = match overrides.product_line.as_ref().or(file.product_line.as_ref()) {
        Some(raw) => raw.parse()?,
        None => ProductLine::default(),
    };

    let cluster_name = non_empty(
        overrides.cluster_name.clone().or(file.cluster_name),
        "cluster_name",
    )?;

    let zone = match product_line {
        ProductLine::Prd => file.zone.production,
        ProductLine::Stg => file.zone.development,
    }
    .ok_or_else(|| ConfigError::Missing(format!("zone.{}", product_line.zone_key())))?;
    let zone_field = |name: &str| format!("zone.{}.{name}", product_line.zone_key());
    let namespace = non_empty(zone.gitlab_namespace, &zone_field("gitlab_namespace"))?;
    let vault_addr = non_empty(zone.vault_addr, &zone_field("vault_addr"))?;
    let secret_path = non_empty(zone.secret_path, &zone_field("secret_path"))?;

    let gitlab_url = env
        .gitlab_url
        .clone()
        .ok_or_else(|| ConfigError::MissingEnv(ENV_GITLAB_URL.to_string()))?;

    let auth_type = match overrides.auth_type.as_ref().or(file.auth_type.as_ref()) {
        Some(raw) => raw.parse()?,
        None => infer_auth_type(env)?,
    };
    let credential = match auth_type {
        AuthType::Token => {
            let token = env
                .vault_token
                .clone()
                .ok_or_else(|| ConfigError::MissingEnv(ENV_VAULT_TOKEN.to_string()))?;
            CredentialRequest::token(vault_addr, secret_path, token)?
        }
        AuthType::AppRole => {
            let role_id = env
                .role_id
                .clone()
                .ok_or_else(|| ConfigError::MissingEnv(ENV_ROLE_ID.to_string()))?;
            let secret_id = env
                .secret_id
                .clone()
                .ok_or_else(|| ConfigError::MissingEnv(ENV_SECRET_ID.to_string()))?;
            CredentialRequest::app_role(vault_addr, secret_path, role_id, secret_id)?
        }
    };

    let workers = overrides
        .workers
        .or(file.workers)
        .unwrap_or(DEFAULT_WORKERS);
    if workers == 0 {
        return Err(ConfigError::invalid("workers", "must be at least 1"));
    }

    let deadline = overrides
        .timeout_secs
        .or(file.timeout_secs)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    let vault_defaults = VaultSettings::default();
    let vault = VaultSettings {
        kv_mount: file.vault.kv_mount.unwrap_or(vault_defaults.kv_mount),
        approle_mount: file.vault.approle_mount.unwrap_or(vault_defaults.approle_mount),
        request_timeout: file
            .vault
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(vault_defaults.request_timeout),
    };

    let baseline = resolve_baseline(&file.gitlab, file.pipeline_content, file.readme_template)?;
    let baseline = Baseline {
        file_variable_policy: file.file_variable_policy,
        variables: validate_declared(file.variables)?,
        ..baseline
    };

    let retry_defaults = RetryPolicy::default();
    let retry = RetryPolicy {
        attempts: file.retry.attempts.unwrap_or(retry_defaults.attempts),
        backoff: file
            .retry
            .backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(retry_defaults.backoff),
    };
    if retry.attempts == 0 {
        return Err(ConfigError::invalid("retry.attempts", "must be at least 1"));
    }

    Ok(Settings {
        product_line,
        cluster_name,
        namespace,
        gitlab_url,
        credential,
        vault,
        baseline,
        workers,
        deadline,
        retry,
    })
}

fn infer_auth_type(env: &Environment) -> Result<AuthType, ConfigError> {
    if env.vault_token.is_some() {
        Ok(AuthType::Token)
    } else if env.role_id.is_some() && env.secret_id.is_some() {
        Ok(AuthType::AppRole)
    } else {
        Err(ConfigError::MissingEnv(format!(
            "{ENV_VAULT_TOKEN} (or {ENV_ROLE_ID} and {ENV_SECRET_ID})"
        )))
    }
}

fn resolve_baseline(
    gitlab: &GitlabFileConfig,
    pipeline_content: Option<String>,
    readme_template: Option<String>,
) -> Result<Baseline, ConfigError> {
    let defaults = Baseline::default();
    let path_or = |value: &Option<String>, field: &str, default: String| match value {
        Some(v) if v.trim().is_empty() => Err(ConfigError::invalid(field, "must not be empty")),
        Some(v) => Ok(v.trim().to_string()),
        None => Ok(default),
    };
    Ok(Baseline {
        branch: path_or(&gitlab.branch, "gitlab.branch", defaults.branch)?,
        pipeline_path: path_or(
            &gitlab.pipeline_path,
            "gitlab.pipeline_path",
            defaults.pipeline_path,
        )?,
        readme_path: path_or(&gitlab.readme_path, "gitlab.readme_path", defaults.readme_path)?,
        pipeline_content,
        readme_template,
        ..defaults
    })
}

fn validate_declared(vars: Vec<DeclaredVariable>) -> Result<Vec<DeclaredVariable>, ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for var in &vars {
        if var.key.trim().is_empty() {
            return Err(ConfigError::invalid("variables", "variable key must not be empty"));
        }
        if !seen.insert(var.key.as_str()) {
            return Err(ConfigError::invalid(
                "variables",
                format!("duplicate variable key '{}'", var.key),
            ));
        }
    }
    Ok(vars)
}

fn non_empty(value: Option<String>, field: &str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(ConfigError::invalid(field, "must not be empty")),
        None => Err(ConfigError::Missing(field.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
