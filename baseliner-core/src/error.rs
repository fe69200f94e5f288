//! Error types for baseliner-core.

use std::path::PathBuf;

use thiserror::Error;

/// Malformed or missing settings. Always raised before any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error in the base config file.
    #[error("failed to parse YAML config at {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// TOML parse error in an overlay file.
    #[error("failed to parse TOML overlay at {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The merged config tree does not match the expected shape.
    #[error("invalid config structure: {0}")]
    Shape(#[source] serde_yaml::Error),

    /// A required setting is absent.
    #[error("missing required setting `{0}`")]
    Missing(String),

    /// A required environment variable is unset or empty.
    #[error("required environment variable {0} is not set")]
    MissingEnv(String),

    /// A setting is present but unusable.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
