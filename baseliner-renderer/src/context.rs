//! README rendering payload.

use serde::{Deserialize, Serialize};

use baseliner_core::types::ProjectDescriptor;

use crate::error::RenderError;

/// Values available to README templates.
///
/// Holds no timestamps; rendered output must be stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadmeContext {
    pub project_name: String,
    pub project_id: String,
    pub namespace: String,
    pub cluster_name: String,
    pub product_line: String,
}

impl ReadmeContext {
    pub fn new(
        project: &ProjectDescriptor,
        namespace: &str,
        cluster_name: &str,
        product_line: &str,
    ) -> Self {
        Self {
            project_name: project.name.to_string(),
            project_id: project.id.to_string(),
            namespace: namespace.to_string(),
            cluster_name: cluster_name.to_string(),
            product_line: product_line.to_string(),
        }
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        Ok(tera::Context::from_serialize(self)?)
    }
}
