//! GitLab REST v4 payloads, limited to the fields the baseline uses.

use serde::{Deserialize, Serialize};

use baseliner_core::types::{ProjectId, ProjectName, VariableKind, VariableRecord};
use baseliner_core::HostProject;

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectWire {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub archived: bool,
}

impl From<ProjectWire> for HostProject {
    fn from(p: ProjectWire) -> Self {
        HostProject {
            id: ProjectId(p.id.to_string()),
            name: ProjectName(p.name),
            archived: p.archived,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct VariableWire {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub variable_type: VariableKind,
}

impl From<VariableWire> for VariableRecord {
    fn from(v: VariableWire) -> Self {
        VariableRecord {
            key: v.key,
            value: v.value,
            kind: v.variable_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct FileBody<'a> {
    pub branch: &'a str,
    pub content: &'a str,
    pub commit_message: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateVariableBody<'a> {
    pub key: &'a str,
    pub value: &'a str,
    pub protected: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateVariableBody<'a> {
    pub value: &'a str,
}
