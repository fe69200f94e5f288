//! Bounded worker pool: one producer, `W` workers, one collector.
//!
//! ```text
//! producer ──► job queue (bounded, W) ──► worker 1..W ──► outcome channel ──► collector
//!                                           │
//!                        Shutdown ──────────┘ (producer and idle workers stop; steps abort)
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use baseliner_core::types::{ProjectDescriptor, RunSummary};

use crate::error::RunError;
use crate::shutdown::Shutdown;
use crate::steps::Reconciler;
use crate::summary;

/// What the pool observed; `summary.attempted()` equals `dequeued` unless a
/// worker task died.
#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    pub summary: RunSummary,
    pub dequeued: usize,
}

/// Reconcile `projects` with `workers` concurrent tasks (clamped to `1..=N`).
pub async fn run_pool(
    reconciler: Arc<Reconciler>,
    projects: Vec<ProjectDescriptor>,
    workers: usize,
    shutdown: Shutdown,
) -> Result<PoolReport, RunError> {
    let total = projects.len();
    if total == 0 {
        return Ok(PoolReport::default());
    }
    let workers = workers.clamp(1, total);
    info!(projects = total, workers, "starting reconciliation");

    let (job_tx, job_rx) = mpsc::channel::<ProjectDescriptor>(workers);
    let (outcome_tx, outcome_rx) = mpsc::channel(workers);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let dequeued = Arc::new(AtomicUsize::new(0));

    let collector = tokio::spawn(summary::collect(outcome_rx));

    let producer = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            for project in projects {
                if shutdown.is_cancelled() {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    sent = job_tx.send(project) => if sent.is_err() { break },
                }
            }
            // dropping job_tx closes the queue
        })
    };

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let reconciler = reconciler.clone();
        let job_rx = job_rx.clone();
        let outcome_tx = outcome_tx.clone();
        let dequeued = dequeued.clone();
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => None,
                    project = async { job_rx.lock().await.recv().await } => project,
                };
                let Some(project) = next else {
                    break;
                };
                dequeued.fetch_add(1, Ordering::SeqCst);
                debug!(worker, project = %project, "dequeued");

                let outcome = reconciler.reconcile(&project).await;
                if outcome_tx.send(outcome).await.is_err() {
                    break;
                }
            }
            debug!(worker, "worker finished");
        }));
    }
    drop(outcome_tx);

    handle_join("producer", producer.await);
    for (worker, handle) in handles.into_iter().enumerate() {
        handle_join(&format!("worker {worker}"), handle.await);
    }
    let summary = collector.await.map_err(|e| RunError::Task {
        task: "collector".to_string(),
        reason: e.to_string(),
    })?;

    let dequeued = dequeued.load(Ordering::SeqCst);
    if summary.attempted() != dequeued {
        warn!(
            collected = summary.attempted(),
            dequeued, "outcome count does not match dequeued projects"
        );
    }
    Ok(PoolReport { summary, dequeued })
}

/// Producer and worker failures are logged; the collector still finalizes.
fn handle_join(task: &str, result: Result<(), JoinError>) {
    if let Err(err) = result {
        warn!(task, error = %err, "task join failure");
    }
}
