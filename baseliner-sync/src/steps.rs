//! Per-repository reconciliation: the fixed step sequence and its failure units.
//!
//! ```text
//! 1. ensure pipeline file   exists? -> update : create   ("Update <path>" / "Add <path>")
//! 2. ensure README          render template, same create-or-update policy
//! 3. list variables         failure skips 4 and 5
//! 4. update each variable   file: value + ":" + id    plain: cluster name
//! 5. create declared        keys from config absent in the listing
//! ```
//!
//! Every host call is raced against the shared [`Shutdown`]; once it trips,
//! the repository records a `cancelled` failure for the step that could not
//! run and stops.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use baseliner_core::config::{Baseline, FileVariablePolicy, RetryPolicy};
use baseliner_core::host::{FileCommit, RepositoryHost};
use baseliner_core::types::{
    Operation, ProjectDescriptor, ProjectId, ReconciliationOutcome, StepFailure, VariableKind,
    VariableRecord,
};
use baseliner_core::Settings;
use baseliner_renderer::{BaselineRenderer, ReadmeContext, RenderError};

use crate::error::StepError;
use crate::shutdown::Shutdown;

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Everything a worker needs to reconcile one repository. Holds no secrets.
#[derive(Debug)]
pub struct BaselinePlan {
    baseline: Baseline,
    renderer: BaselineRenderer,
    namespace: String,
    cluster_name: String,
    product_line: String,
    retry: RetryPolicy,
}

impl BaselinePlan {
    /// Parses templates up front, so a broken README template fails the run
    /// before credentials are requested.
    pub fn new(settings: &Settings) -> Result<Self, RenderError> {
        Ok(Self {
            renderer: BaselineRenderer::new(&settings.baseline)?,
            baseline: settings.baseline.clone(),
            namespace: settings.namespace.clone(),
            cluster_name: settings.cluster_name.clone(),
            product_line: settings.product_line.to_string(),
            retry: settings.retry,
        })
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn readme_for(&self, project: &ProjectDescriptor) -> Result<String, RenderError> {
        let ctx = ReadmeContext::new(
            project,
            &self.namespace,
            &self.cluster_name,
            &self.product_line,
        );
        self.renderer.render_readme(&ctx)
    }

    pub fn pipeline(&self) -> &str {
        self.renderer.pipeline()
    }
}

/// New value for an existing variable, or `None` when no write is needed.
///
/// File variables compose (`existing:id`); plain variables are replaced by the
/// cluster name. Under [`FileVariablePolicy::AppendOnce`] a file variable that
/// already ends in `:id` is left alone.
pub fn next_variable_value(
    record: &VariableRecord,
    project: &ProjectId,
    cluster_name: &str,
    policy: FileVariablePolicy,
) -> Option<String> {
    match record.kind {
        VariableKind::File => {
            let suffix = format!(":{project}");
            if policy == FileVariablePolicy::AppendOnce && record.value.ends_with(&suffix) {
                return None;
            }
            Some(format!("{}{suffix}", record.value))
        }
        VariableKind::Plain => Some(cluster_name.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Applies a [`BaselinePlan`] to repositories through a [`RepositoryHost`].
pub struct Reconciler {
    host: Arc<dyn RepositoryHost>,
    plan: Arc<BaselinePlan>,
    shutdown: Shutdown,
}

/// Whether to continue with the next step.
enum Flow {
    Continue,
    Stop,
}

impl Reconciler {
    pub fn new(host: Arc<dyn RepositoryHost>, plan: Arc<BaselinePlan>, shutdown: Shutdown) -> Self {
        Self {
            host,
            plan,
            shutdown,
        }
    }

    /// Run every step for `project`. Always returns exactly one outcome.
    pub async fn reconcile(&self, project: &ProjectDescriptor) -> ReconciliationOutcome {
        let mut outcome = ReconciliationOutcome::new(project.clone());

        let pipeline_path = &self.plan.baseline.pipeline_path;
        let result = self.ensure_file(project, pipeline_path, self.plan.pipeline()).await;
        if let Flow::Stop = self.record(&mut outcome, Operation::EnsurePipelineFile, result) {
            return outcome;
        }

        let result = match self.plan.readme_for(project) {
            Ok(readme) => {
                self.ensure_file(project, &self.plan.baseline.readme_path, &readme)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Flow::Stop = self.record(&mut outcome, Operation::EnsureReadme, result) {
            return outcome;
        }

        let listing = self
            .guarded(async { Ok::<_, StepError>(self.host.list_variables(&project.id).await?) })
            .await;
        let variables = match listing {
            Ok(vars) => vars,
            Err(e) => {
                self.record(&mut outcome, Operation::ListVariables, Err(e));
                return outcome;
            }
        };

        for var in &variables {
            let Some(value) = next_variable_value(
                var,
                &project.id,
                &self.plan.cluster_name,
                self.plan.baseline.file_variable_policy,
            ) else {
                debug!(project = %project.name, key = %var.key, "variable already current");
                continue;
            };
            let result = self
                .guarded(async {
                    Ok::<_, StepError>(self
                        .host
                        .update_variable(&project.id, &var.key, &value)
                        .await?)
                })
                .await;
            let op = Operation::UpdateVariable {
                key: var.key.clone(),
            };
            if let Flow::Stop = self.record(&mut outcome, op, result) {
                return outcome;
            }
        }

        let existing: HashSet<&str> = variables.iter().map(|v| v.key.as_str()).collect();
        for declared in &self.plan.baseline.variables {
            if existing.contains(declared.key.as_str()) {
                continue;
            }
            let result = self
                .guarded(async {
                    Ok::<_, StepError>(self
                        .host
                        .create_variable(&project.id, &declared.key, &declared.value)
                        .await?)
                })
                .await;
            let op = Operation::CreateVariable {
                key: declared.key.clone(),
            };
            if let Flow::Stop = self.record(&mut outcome, op, result) {
                return outcome;
            }
        }

        outcome
    }

    /// Existence check, then create or update; only the write is retried.
    async fn ensure_file(
        &self,
        project: &ProjectDescriptor,
        path: &str,
        content: &str,
    ) -> Result<(), StepError> {
        let branch = &self.plan.baseline.branch;
        let exists = self
            .guarded(async { Ok::<_, StepError>(self.host.file_exists(&project.id, path, branch).await?) })
            .await?;

        let verb = if exists { "Update" } else { "Add" };
        let commit = FileCommit {
            path: path.to_string(),
            branch: branch.clone(),
            content: content.to_string(),
            message: format!("{verb} {path}"),
        };

        let retry = self.plan.retry;
        let mut attempt = 1;
        loop {
            let result = self
                .guarded(async {
                    if exists {
                        self.host.update_file(&project.id, &commit).await?;
                    } else {
                        self.host.create_file(&project.id, &commit).await?;
                    }
                    Ok::<(), StepError>(())
                })
                .await;
            match result {
                Err(StepError::Host(err)) if attempt < retry.attempts => {
                    let delay = retry.delay_for(attempt);
                    warn!(
                        project = %project.name,
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "file write failed, retrying"
                    );
                    self.guarded(async {
                        tokio::time::sleep(delay).await;
                        Ok::<(), StepError>(())
                    })
                    .await?;
                    attempt += 1;
                }
                other => {
                    if other.is_ok() {
                        debug!(project = %project.name, path, verb, "file ensured");
                    }
                    return other;
                }
            }
        }
    }

    /// Races `call` against cancellation; a tripped handle wins ties.
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, StepError>>,
    ) -> Result<T, StepError> {
        if self.shutdown.is_cancelled() {
            return Err(StepError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(StepError::Cancelled),
            result = call => result,
        }
    }

    fn record(
        &self,
        outcome: &mut ReconciliationOutcome,
        operation: Operation,
        result: Result<(), StepError>,
    ) -> Flow {
        match result {
            Ok(()) => Flow::Continue,
            Err(StepError::Cancelled) => {
                debug!(project = %outcome.project.name, %operation, "step cancelled");
                outcome.failures.push(StepFailure::cancelled(operation));
                Flow::Stop
            }
            Err(err) => {
                warn!(project = %outcome.project.name, %operation, error = %err, "step failed");
                outcome.failures.push(StepFailure::new(operation, err));
                Flow::Continue
            }
        }
    }
}
