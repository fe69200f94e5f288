//! Error types for baseliner-renderer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error (syntax at construction, missing variables at render).
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// JSON serialization error (building tera context).
    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
