//! Run-wide cancellation.
//!
//! [`Shutdown`] is the shared handle: cloned into the producer, every worker
//! and every guarded host call. [`CancellationController`] owns the tasks
//! that trip it (signals, deadline).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// Interrupt or terminate signal, by name.
    Signal(&'static str),
    /// The overall run deadline elapsed.
    Deadline(Duration),
    /// Cancelled programmatically.
    Requested,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Signal(name) => write!(f, "received {name}"),
            CancelReason::Deadline(d) => write!(f, "deadline of {}s elapsed", d.as_secs()),
            CancelReason::Requested => write!(f, "cancellation requested"),
        }
    }
}

/// Shared cancellation handle. The first trigger wins; later reasons are ignored.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<CancelReason>>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Returns `true` if this call tripped the handle.
    pub fn trigger(&self, reason: CancelReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.tx.borrow().clone()
    }

    /// Resolves once the handle is tripped; immediately if it already is.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                // unreachable while `self` holds the sender
                std::future::pending::<()>().await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CancellationController
// ---------------------------------------------------------------------------

/// Owns the tasks that trip a [`Shutdown`]. Dropping it stops them.
#[derive(Debug)]
pub struct CancellationController {
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl CancellationController {
    pub fn new(shutdown: Shutdown) -> Self {
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    pub fn handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Trip on SIGINT or SIGTERM. Must be called inside a tokio runtime.
    pub fn listen_for_signals(&mut self) {
        let shutdown = self.shutdown.clone();
        self.tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                name = wait_for_signal() => {
                    info!(signal = name, "signal received, cancelling run");
                    shutdown.trigger(CancelReason::Signal(name));
                }
            }
        }));
    }

    /// Trip once `deadline` has elapsed. Must be called inside a tokio runtime.
    pub fn arm_deadline(&mut self, deadline: Duration) {
        let shutdown = self.shutdown.clone();
        self.tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    warn!(deadline_secs = deadline.as_secs(), "run deadline elapsed, cancelling run");
                    shutdown.trigger(CancelReason::Deadline(deadline));
                }
            }
        }));
    }
}

impl Drop for CancellationController {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Waits for the first interrupt or terminate signal and returns its name.
/// Never resolves if no signal handler could be installed.
async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(err) => {
                warn!(error = %err, "could not install SIGTERM handler");
                None
            }
        };
        let sigterm = async {
            match terminate.as_mut() {
                Some(stream) => {
                    stream.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        let interrupt = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "could not install SIGINT handler");
                std::future::pending::<()>().await;
            }
        };
        tokio::select! {
            _ = interrupt => "SIGINT",
            _ = sigterm => "SIGTERM",
        }
    }
    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            Err(err) => {
                warn!(error = %err, "could not install ctrl-c handler");
                std::future::pending().await
            }
        }
    }
}
