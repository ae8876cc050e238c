//! Process shutdown: signal handling and ordered teardown.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::client::GreeterClient;
use crate::telemetry::Telemetry;
use crate::worker::GreeterWorker;

/// Runs the teardown sequence exactly once, in dependency order.
///
/// The order matters: the worker drains first so its final spans and
/// counters still have a live pipeline, the store pool closes second, and
/// telemetry flushes last.
pub struct ShutdownCoordinator {
    fired: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// Wait for SIGINT (Ctrl-C) or SIGTERM.
    ///
    /// On non-Unix platforms only Ctrl-C is watched.
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(sig) => sig,
                Err(e) => {
                    tracing::error!("failed to install SIGTERM handler: {e}");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received SIGINT");
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received Ctrl-C");
        }
    }

    /// Drain the worker, close the client, and flush telemetry.
    ///
    /// Subsequent calls return immediately; the passed handles are consumed
    /// either way.
    pub async fn run(
        &self,
        worker: Option<GreeterWorker>,
        client: GreeterClient,
        telemetry: &Telemetry,
    ) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(worker) = worker {
            worker.shutdown().await;
        }
        client.close().await;
        telemetry.shutdown().await;
    }

    /// True once [`run`](Self::run) has executed.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_starts_unfired() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.has_fired());
    }

    #[test]
    fn fired_flag_latches() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.fired.swap(true, Ordering::SeqCst));
        assert!(coordinator.fired.swap(true, Ordering::SeqCst));
        assert!(coordinator.has_fired());
    }
}
