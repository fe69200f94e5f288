//! reqwest-backed [`RepositoryHost`] for GitLab REST v4.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use baseliner_core::host::{FileCommit, HostError, HostProject, ListOptions, RepositoryHost};
use baseliner_core::types::{ProjectId, VariableRecord};

use crate::model::{
    CreateVariableBody, FileBody, ProjectWire, UpdateVariableBody, VariableWire,
};

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const NEXT_PAGE_HEADER: &str = "x-next-page";
const PER_PAGE: &str = "100";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// GitLab API client. Cheap to clone; share one per run.
#[derive(Clone)]
pub struct GitlabClient {
    client: Client,
    base: Url,
    token: String,
}

impl std::fmt::Debug for GitlabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitlabClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl GitlabClient {
    /// `base_url` may be the instance root or already end in `/api/v4`.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, HostError> {
        if token.trim().is_empty() {
            return Err(HostError::InvalidRequest("empty GitLab token".into()));
        }
        let mut base = Url::parse(base_url.trim())
            .map_err(|e| HostError::InvalidRequest(format!("invalid GitLab URL '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(HostError::InvalidRequest(format!(
                "invalid GitLab URL '{base_url}': not a base URL"
            )));
        }
        if !base.path().trim_end_matches('/').ends_with("/api/v4") {
            push_segments(&mut base, &["api", "v4"])?;
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HostError::InvalidRequest(format!("could not build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            token: token.to_string(),
        })
    }

    /// API URL with each segment percent-encoded (a `/` inside a segment becomes `%2F`).
    fn endpoint(&self, segments: &[&str]) -> Result<Url, HostError> {
        let mut url = self.base.clone();
        push_segments(&mut url, segments)?;
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(TOKEN_HEADER, &self.token)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&(impl Serialize + Sync)>,
    ) -> Result<Response, HostError> {
        let path = url.path().to_string();
        let mut req = self.request(method.clone(), url);
        if let Some(body) = body {
            req = req.json(body);
        }
        debug!(%method, path = %path, "gitlab request");
        let response = req
            .send()
            .await
            .map_err(|e| HostError::Transport(e.to_string()))?;
        check(method_name(&method), &path, response).await
    }

    /// GET every page of a list endpoint, following `x-next-page`.
    async fn get_all<T: DeserializeOwned>(
        &self,
        url: Url,
        extra_query: &[(&str, &str)],
    ) -> Result<Vec<T>, HostError> {
        let mut items = Vec::new();
        let mut page = String::from("1");
        loop {
            let mut page_url = url.clone();
            {
                let mut query = page_url.query_pairs_mut();
                for (k, v) in extra_query {
                    query.append_pair(k, v);
                }
                query.append_pair("per_page", PER_PAGE);
                query.append_pair("page", &page);
            }
            let path = page_url.path().to_string();
            let response = self.send(Method::GET, page_url, None::<&()>).await?;
            let next = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let batch: Vec<T> = decode(&path, response).await?;
            items.extend(batch);

            match next {
                Some(next) if next != page => page = next,
                _ => return Ok(items),
            }
        }
    }
}

fn push_segments(url: &mut Url, segments: &[&str]) -> Result<(), HostError> {
    let url_text = url.to_string();
    url.path_segments_mut()
        .map_err(|_| HostError::InvalidRequest(format!("cannot extend URL {url_text}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(())
}

fn method_name(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        _ => "HTTP",
    }
}

async fn check(method: &'static str, path: &str, response: Response) -> Result<Response, HostError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(HostError::Status {
            method,
            path: path.to_string(),
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }
}

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, HostError> {
    response.json().await.map_err(|e| HostError::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// RepositoryHost
// ---------------------------------------------------------------------------

#[async_trait]
impl RepositoryHost for GitlabClient {
    async fn list_projects(
        &self,
        namespace: &str,
        options: ListOptions,
    ) -> Result<Vec<HostProject>, HostError> {
        let url = self.endpoint(&["groups", namespace, "projects"])?;
        let query: &[(&str, &str)] = if options.exclude_archived {
            &[("archived", "false")]
        } else {
            &[]
        };
        let projects: Vec<ProjectWire> = self.get_all(url, query).await?;
        Ok(projects.into_iter().map(HostProject::from).collect())
    }

    async fn file_exists(
        &self,
        project: &ProjectId,
        path: &str,
        branch: &str,
    ) -> Result<bool, HostError> {
        let mut url = self.endpoint(&["projects", &project.0, "repository", "files", path])?;
        url.query_pairs_mut().append_pair("ref", branch);
        match self.send(Method::GET, url, None::<&()>).await {
            Ok(_) => Ok(true),
            Err(HostError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_file(&self, project: &ProjectId, commit: &FileCommit) -> Result<(), HostError> {
        let url = self.endpoint(&["projects", &project.0, "repository", "files", &commit.path])?;
        let body = FileBody {
            branch: &commit.branch,
            content: &commit.content,
            commit_message: &commit.message,
        };
        self.send(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    async fn update_file(&self, project: &ProjectId, commit: &FileCommit) -> Result<(), HostError> {
        let url = self.endpoint(&["projects", &project.0, "repository", "files", &commit.path])?;
        let body = FileBody {
            branch: &commit.branch,
            content: &commit.content,
            commit_message: &commit.message,
        };
        self.send(Method::PUT, url, Some(&body)).await?;
        Ok(())
    }

    async fn list_variables(&self, project: &ProjectId) -> Result<Vec<VariableRecord>, HostError> {
        let url = self.endpoint(&["projects", &project.0, "variables"])?;
        let vars: Vec<VariableWire> = self.get_all(url, &[]).await?;
        Ok(vars.into_iter().map(VariableRecord::from).collect())
    }

    async fn create_variable(
        &self,
        project: &ProjectId,
        key: &str,
        value: &str,
    ) -> Result<(), HostError> {
        let url = self.endpoint(&["projects", &project.0, "variables"])?;
        let body = CreateVariableBody {
            key,
            value,
            protected: false,
        };
        self.send(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    async fn update_variable(
        &self,
        project: &ProjectId,
        key: &str,
        value: &str,
    ) -> Result<(), HostError> {
        let url = self.endpoint(&["projects", &project.0, "variables", key])?;
        self.send(Method::PUT, url, Some(&UpdateVariableBody { value }))
            .await?;
        Ok(())
    }
}
