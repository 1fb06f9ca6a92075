//! Graceful shutdown coordination.
//!
//! [`ShutdownSignal`] tells the engine task to stop: the host either
//! triggers it programmatically (bot teardown) or lets [`wait`] hook
//! process termination signals. Stopping the engine discards any
//! queued-but-undelivered notifications; delivery is best-effort by
//! design.
//!
//! [`wait`]: ShutdownSignal::wait

use tokio::sync::broadcast;
use tracing::info;

/// A cloneable signal for coordinating engine shutdown.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    /// Subscribe to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Trigger shutdown programmatically.
    pub fn trigger(&self) {
        info!("Engine shutdown triggered");
        let _ = self.sender.send(());
    }

    /// Block until a termination signal (SIGTERM or Ctrl+C) arrives,
    /// then notify all subscribers.
    pub async fn wait(&self) {
        let ctrl_c = async {
            if tokio::signal::ctrl_c().await.is_err() {
                // No signal handler available; rely on programmatic
                // triggering instead of aborting the engine
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, shutting down highlight engine");
            }
            _ = terminate => {
                info!("Received SIGTERM, shutting down highlight engine");
            }
        }

        let _ = self.sender.send(());
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_reaches_subscriber() {
        let signal = ShutdownSignal::new();
        let mut receiver = signal.subscribe();

        let trigger_signal = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger_signal.trigger();
        });

        let result = tokio::time::timeout(Duration::from_millis(500), receiver.recv()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_the_signal() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();

        let mut receiver1 = signal.subscribe();
        let mut receiver2 = clone.subscribe();

        signal.trigger();

        assert!(receiver1.recv().await.is_ok());
        assert!(receiver2.recv().await.is_ok());
    }
}
