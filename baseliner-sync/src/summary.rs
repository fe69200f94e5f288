//! Fan-in: fold outcomes from every worker into one [`RunSummary`].

use tokio::sync::mpsc;
use tracing::debug;

use baseliner_core::types::{ReconciliationOutcome, RunSummary};

/// Drains `outcomes` until every sender is dropped, then orders the errors.
pub async fn collect(mut outcomes: mpsc::Receiver<ReconciliationOutcome>) -> RunSummary {
    let mut summary = RunSummary::default();
    while let Some(outcome) = outcomes.recv().await {
        debug!(
            project = %outcome.project,
            failures = outcome.failures.len(),
            "outcome collected"
        );
        summary.record(outcome);
    }
    summary.sort_errors();
    summary
}
