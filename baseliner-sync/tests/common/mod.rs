//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use baseliner_core::config::{self, Environment, FileConfig, Overrides};
use baseliner_core::host::{FileCommit, HostError, HostProject, ListOptions, RepositoryHost};
use baseliner_core::secrets::{CredentialError, CredentialProvider};
use baseliner_core::types::{
    ProjectId, ProjectName, SecretBundle, VariableKind, VariableRecord,
};
use baseliner_core::Settings;
use baseliner_sync::{CancelReason, Shutdown};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub fn settings_with(extra_yaml: &str, workers: usize) -> Settings {
    let yaml = format!(
        r##"
cluster_name: prod-cluster
zone:
  development:
    gitlab_namespace: platform/stg
    vault_addr: https://vault.stg.internal
    secret_path: mor/stg/gitlab
gitlab-ci-content: "stages: [build]\n"
gitlab-readme-content: "# {{{{ project_name }}}}\n"
{extra_yaml}
"##
    );
    let file: FileConfig = serde_yaml::from_str(&yaml).expect("fixture yaml");
    let env = Environment::from_lookup(|key| match key {
        "vault_token" => Some("s.test".into()),
        "gitlab_url" => Some("https://gitlab.example.com".into()),
        _ => None,
    });
    let overrides = Overrides {
        workers: Some(workers),
        ..Default::default()
    };
    config::resolve(file, &overrides, &env).expect("resolve")
}

pub fn settings(workers: usize) -> Settings {
    settings_with("", workers)
}

// ---------------------------------------------------------------------------
// FakeProvider
// ---------------------------------------------------------------------------

pub struct FakeProvider {
    result: Mutex<Option<Result<SecretBundle, CredentialError>>>,
    pub calls: AtomicUsize,
}

impl FakeProvider {
    pub fn with_token(token: &str) -> Self {
        let values = BTreeMap::from([("token".to_string(), serde_json::json!(token))]);
        Self::returning(Ok(SecretBundle::new(values)))
    }

    pub fn returning(result: Result<SecretBundle, CredentialError>) -> Self {
        Self {
            result: Mutex::new(Some(result)),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CredentialProvider for FakeProvider {
    async fn retrieve(&self) -> Result<SecretBundle, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(CredentialError::Client("retrieved twice".into())))
    }
}

// ---------------------------------------------------------------------------
// FakeHost
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct HostState {
    pub projects: Vec<HostProject>,
    /// (project id, path) -> (content, last commit message)
    pub files: BTreeMap<(String, String), (String, String)>,
    pub variables: HashMap<String, Vec<VariableRecord>>,

    pub list_error: bool,
    pub fail_exists: HashSet<String>,
    pub fail_list_variables: HashSet<String>,
    /// (project id, key)
    pub fail_update_variable: HashSet<(String, String)>,
    /// Remaining forced failures for file writes, per project id.
    pub failing_writes: HashMap<String, usize>,

    pub list_calls: usize,
    pub exists_calls: Vec<(String, String)>,
    pub writes: Vec<(String, String)>,
    pub variable_updates: Vec<(String, String, String)>,
    pub variable_creates: Vec<(String, String, String)>,
}

/// Cloneable handle over shared state, so a test can inspect it after the run
/// took ownership of the host.
#[derive(Clone, Default)]
pub struct FakeHost {
    pub state: Arc<Mutex<HostState>>,
    pub delay: Duration,
    /// Trip `shutdown` once this many pipeline existence checks have started.
    pub cancel_after: Option<(usize, Shutdown)>,
}

impl FakeHost {
    pub fn with_projects(names: &[(&str, &str)]) -> Self {
        let host = FakeHost::default();
        {
            let mut state = host.state.lock().unwrap();
            for (id, name) in names {
                state.projects.push(HostProject {
                    id: ProjectId::from(*id),
                    name: ProjectName::from(*name),
                    archived: false,
                });
            }
        }
        host
    }

    pub fn set_variables(&self, id: &str, vars: &[(&str, &str, VariableKind)]) {
        let records = vars
            .iter()
            .map(|(key, value, kind)| VariableRecord {
                key: key.to_string(),
                value: value.to_string(),
                kind: *kind,
            })
            .collect();
        self.state.lock().unwrap().variables.insert(id.to_string(), records);
    }

    pub fn variable(&self, id: &str, key: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .variables
            .get(id)?
            .iter()
            .find(|v| v.key == key)
            .map(|v| v.value.clone())
    }

    pub fn file(&self, id: &str, path: &str) -> Option<(String, String)> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&(id.to_string(), path.to_string()))
            .cloned()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn status(method: &'static str, path: &str, status: u16) -> HostError {
        HostError::Status {
            method,
            path: path.to_string(),
            status,
            body: "injected".to_string(),
        }
    }
}

#[async_trait]
impl RepositoryHost for FakeHost {
    async fn list_projects(
        &self,
        _namespace: &str,
        options: ListOptions,
    ) -> Result<Vec<HostProject>, HostError> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.list_error {
            return Err(Self::status("GET", "/groups/x/projects", 500));
        }
        Ok(state
            .projects
            .iter()
            .filter(|p| !(options.exclude_archived && p.archived))
            .cloned()
            .collect())
    }

    async fn file_exists(
        &self,
        project: &ProjectId,
        path: &str,
        _branch: &str,
    ) -> Result<bool, HostError> {
        let started = {
            let mut state = self.state.lock().unwrap();
            state.exists_calls.push((project.0.clone(), path.to_string()));
            state
                .exists_calls
                .iter()
                .filter(|(_, p)| p == ".gitlab-ci.yml")
                .count()
        };
        if let Some((limit, shutdown)) = &self.cancel_after {
            if path == ".gitlab-ci.yml" && started >= *limit {
                shutdown.trigger(CancelReason::Requested);
            }
        }
        self.pause().await;
        let state = self.state.lock().unwrap();
        if state.fail_exists.contains(&project.0) {
            return Err(Self::status("GET", path, 500));
        }
        Ok(state.files.contains_key(&(project.0.clone(), path.to_string())))
    }

    async fn create_file(&self, project: &ProjectId, commit: &FileCommit) -> Result<(), HostError> {
        self.write(project, commit, false).await
    }

    async fn update_file(&self, project: &ProjectId, commit: &FileCommit) -> Result<(), HostError> {
        self.write(project, commit, true).await
    }

    async fn list_variables(&self, project: &ProjectId) -> Result<Vec<VariableRecord>, HostError> {
        self.pause().await;
        let state = self.state.lock().unwrap();
        if state.fail_list_variables.contains(&project.0) {
            return Err(Self::status("GET", "variables", 502));
        }
        Ok(state.variables.get(&project.0).cloned().unwrap_or_default())
    }

    async fn create_variable(
        &self,
        project: &ProjectId,
        key: &str,
        value: &str,
    ) -> Result<(), HostError> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        state
            .variable_creates
            .push((project.0.clone(), key.to_string(), value.to_string()));
        state
            .variables
            .entry(project.0.clone())
            .or_default()
            .push(VariableRecord {
                key: key.to_string(),
                value: value.to_string(),
                kind: VariableKind::Plain,
            });
        Ok(())
    }

    async fn update_variable(
        &self,
        project: &ProjectId,
        key: &str,
        value: &str,
    ) -> Result<(), HostError> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        if state
            .fail_update_variable
            .contains(&(project.0.clone(), key.to_string()))
        {
            return Err(Self::status("PUT", key, 500));
        }
        state
            .variable_updates
            .push((project.0.clone(), key.to_string(), value.to_string()));
        let var = state
            .variables
            .get_mut(&project.0)
            .and_then(|vars| vars.iter_mut().find(|v| v.key == key))
            .ok_or_else(|| Self::status("PUT", key, 404))?;
        var.value = value.to_string();
        Ok(())
    }
}

impl FakeHost {
    async fn write(&self, project: &ProjectId, commit: &FileCommit, update: bool) -> Result<(), HostError> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.failing_writes.get_mut(&project.0) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Self::status(if update { "PUT" } else { "POST" }, &commit.path, 503));
            }
        }
        let key = (project.0.clone(), commit.path.clone());
        if update != state.files.contains_key(&key) {
            return Err(Self::status(if update { "PUT" } else { "POST" }, &commit.path, 400));
        }
        state.writes.push((project.0.clone(), commit.message.clone()));
        state
            .files
            .insert(key, (commit.content.clone(), commit.message.clone()));
        Ok(())
    }
}
