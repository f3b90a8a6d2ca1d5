//! Signal-driven, single-shot shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Fires at most once; firing cancels every verifier run spawned under
/// [`ShutdownLatch::token`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownLatch {
    triggered: Arc<AtomicBool>,
    token: CancellationToken,
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for the call that actually triggered the latch.
    pub fn trigger(&self) -> bool {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Resolves on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(err) => {
                error!("failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, cancelling running verifiers");
        }
        _ = terminate => {
            info!("received SIGTERM, cancelling running verifiers");
        }
    }
}

/// Trigger `latch` on every incoming signal. Only the first one has an
/// effect. Runs until the task is aborted.
pub async fn listen_for_signals(latch: ShutdownLatch) {
    loop {
        shutdown_signal().await;
        if !latch.trigger() {
            warn!("shutdown already in progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_triggers_once() {
        let latch = ShutdownLatch::new();
        let child = latch.token().child_token();
        assert!(!latch.is_triggered());

        assert!(latch.trigger());
        assert!(!latch.trigger());
        assert!(latch.is_triggered());
        assert!(child.is_cancelled());

        let clone = latch.clone();
        assert!(!clone.trigger());
    }
}
