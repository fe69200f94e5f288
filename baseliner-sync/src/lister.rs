//! Project enumeration for one namespace.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use baseliner_core::host::{ListOptions, RepositoryHost};
use baseliner_core::types::ProjectDescriptor;

use crate::error::ListError;

/// Every non-archived project under `namespace`, ids unique, host order kept.
///
/// Archived projects are excluded by the request and again locally. An empty
/// namespace is an empty list, not an error.
pub async fn list_projects<H: RepositoryHost + ?Sized>(
    host: &H,
    namespace: &str,
) -> Result<Vec<ProjectDescriptor>, ListError> {
    let raw = host
        .list_projects(namespace, ListOptions::default())
        .await
        .map_err(|source| ListError::Host {
            namespace: namespace.to_string(),
            source,
        })?;
    let reported = raw.len();

    let mut seen = HashSet::new();
    let mut projects = Vec::with_capacity(reported);
    for (index, project) in raw.into_iter().enumerate() {
        if project.archived {
            debug!(project = %project.name, "skipping archived project");
            continue;
        }
        if project.id.0.trim().is_empty() {
            return Err(ListError::InvalidDescriptor {
                index,
                reason: format!("project '{}' has an empty id", project.name),
            });
        }
        if project.name.0.trim().is_empty() {
            return Err(ListError::InvalidDescriptor {
                index,
                reason: format!("project #{} has an empty name", project.id),
            });
        }
        if !seen.insert(project.id.clone()) {
            warn!(project = %project.name, id = %project.id, "duplicate project id, keeping first");
            continue;
        }
        projects.push(ProjectDescriptor::new(project.id, project.name));
    }

    info!(namespace, reported, eligible = projects.len(), "projects listed");
    Ok(projects)
}
