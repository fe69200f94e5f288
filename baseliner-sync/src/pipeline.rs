//! Run entrypoint shared by the `run` and `projects` commands.
//!
//! Phases, each fatal on error: credentials -> connect -> listing. Then the
//! worker pool. Cancellation at any point still yields a report.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use baseliner_core::host::{HostError, RepositoryHost};
use baseliner_core::secrets::{host_token, CredentialProvider};
use baseliner_core::types::{ProjectDescriptor, RunSummary};
use baseliner_core::Settings;

use crate::error::RunError;
use crate::lister;
use crate::pool::run_pool;
use crate::shutdown::{CancelReason, Shutdown};
use crate::steps::{BaselinePlan, Reconciler};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Termination {
    Completed,
    Cancelled(#[serde(serialize_with = "serialize_reason")] CancelReason),
}

fn serialize_reason<S: serde::Serializer>(reason: &CancelReason, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(reason)
}

/// Final, externally observable result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub termination: Termination,
    /// Eligible projects returned by the lister.
    pub listed: usize,
    pub summary: RunSummary,
}

impl RunReport {
    fn cancelled_early(reason: CancelReason) -> Self {
        Self {
            termination: Termination::Cancelled(reason),
            listed: 0,
            summary: RunSummary::default(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.termination, Termination::Cancelled(_))
    }

    pub fn is_success(&self) -> bool {
        !self.is_cancelled() && self.summary.failed() == 0
    }
}

/// A connected host plus the projects to reconcile.
pub struct Discovery<H> {
    pub host: H,
    pub projects: Vec<ProjectDescriptor>,
}

/// Race a phase against cancellation.
async fn phase<T, E>(
    shutdown: &Shutdown,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, RunError>
where
    RunError: From<E>,
{
    if let Some(reason) = shutdown.reason() {
        return Err(RunError::Cancelled(reason));
    }
    tokio::select! {
        biased;
        reason = shutdown.cancelled() => Err(RunError::Cancelled(reason)),
        result = fut => result.map_err(RunError::from),
    }
}

/// Credentials, host connection and listing; nothing is modified.
///
/// `connect` builds the repository-host client from the host token found in
/// the secret bundle. The bundle is dropped before listing starts.
pub async fn discover<P, C, H>(
    settings: &Settings,
    provider: &P,
    connect: C,
    shutdown: &Shutdown,
) -> Result<Discovery<H>, RunError>
where
    P: CredentialProvider + ?Sized,
    C: FnOnce(&str) -> Result<H, HostError>,
    H: RepositoryHost,
{
    info!(method = settings.credential.method(), "acquiring credentials");
    let bundle = phase(shutdown, provider.retrieve()).await?;
    let host = connect(host_token(&bundle)?).map_err(RunError::Connect)?;
    drop(bundle);

    info!(namespace = %settings.namespace, "listing projects");
    let projects = phase(shutdown, lister::list_projects(&host, &settings.namespace)).await?;
    Ok(Discovery { host, projects })
}

/// Full run: discover, then reconcile every project with the plan.
pub async fn run<P, C, H>(
    settings: &Settings,
    plan: BaselinePlan,
    provider: &P,
    connect: C,
    shutdown: Shutdown,
) -> Result<RunReport, RunError>
where
    P: CredentialProvider + ?Sized,
    C: FnOnce(&str) -> Result<H, HostError>,
    H: RepositoryHost + 'static,
{
    let discovery = match discover(settings, provider, connect, &shutdown).await {
        Ok(discovery) => discovery,
        Err(RunError::Cancelled(reason)) => {
            info!(%reason, "run cancelled before reconciliation");
            return Ok(RunReport::cancelled_early(reason));
        }
        Err(err) => return Err(err),
    };

    let listed = discovery.projects.len();
    let host: Arc<dyn RepositoryHost> = Arc::new(discovery.host);
    let reconciler = Arc::new(Reconciler::new(host, Arc::new(plan), shutdown.clone()));
    let pool = run_pool(reconciler, discovery.projects, settings.workers, shutdown.clone()).await?;

    let interrupted = pool.summary.attempted() < listed
        || pool
            .summary
            .errors()
            .iter()
            .any(|o| o.failures.iter().any(|f| f.cancelled));
    let termination = match shutdown.reason() {
        Some(reason) if interrupted => Termination::Cancelled(reason),
        _ => Termination::Completed,
    };

    let summary = pool.summary;
    info!(
        listed,
        attempted = summary.attempted(),
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        cancelled = matches!(termination, Termination::Cancelled(_)),
        "run finished"
    );
    Ok(RunReport {
        termination,
        listed,
        summary,
    })
}
