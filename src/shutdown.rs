//! Shutdown coordination for FleetStream
//!
//! The process moves through three lifecycle stages. It starts in `Running`,
//! enters `Draining` when a shutdown signal arrives (the consumer stops
//! fetching and flushes what it has buffered), and reaches `Stopped` once the
//! final flush and offset commit are done.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Lifecycle stage of the pipeline process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Normal operation: polling, buffering, flushing
    Running,
    /// Shutdown requested: finish buffered work, then stop
    Draining,
    /// All work flushed and committed, process is exiting
    Stopped,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Running => "running",
            Stage::Draining => "draining",
            Stage::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Owner of the lifecycle stage
///
/// Cloned into every task that may request or observe shutdown. Transitions
/// are monotonic: a stage never moves backwards, and repeated requests for a
/// stage already reached are ignored.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<Stage>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Stage::Running);
        Self { tx: Arc::new(tx) }
    }

    /// Get a receiver half for observing stage changes
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Current lifecycle stage
    pub fn stage(&self) -> Stage {
        *self.tx.borrow()
    }

    /// Request a drain: running work finishes, no new work starts
    pub fn begin_drain(&self) {
        self.advance(Stage::Draining);
    }

    /// Record that draining has finished and the process is exiting
    pub fn mark_stopped(&self) {
        self.advance(Stage::Stopped);
    }

    fn advance(&self, next: Stage) {
        self.tx.send_if_modified(|stage| {
            if *stage < next {
                tracing::info!(from = %stage, to = %next, "Lifecycle transition");
                *stage = next;
                true
            } else {
                false
            }
        });
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer half of the lifecycle stage
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Stage>,
}

impl ShutdownSignal {
    /// Current lifecycle stage
    pub fn stage(&self) -> Stage {
        *self.rx.borrow()
    }

    /// Whether a drain has been requested (or the process is stopping)
    pub fn is_draining(&self) -> bool {
        self.stage() >= Stage::Draining
    }

    /// Wait until a drain has been requested
    ///
    /// Resolves immediately if the stage is already past `Running`. A dropped
    /// coordinator counts as a drain request.
    pub async fn draining(&mut self) {
        let _ = self.rx.wait_for(|stage| *stage >= Stage::Draining).await;
    }

    /// Wait until the process has fully stopped
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stage| *stage >= Stage::Stopped).await;
    }
}

/// Wait for CTRL+C or SIGTERM
///
/// Resolves once either signal is received so the caller can begin draining.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received CTRL+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
