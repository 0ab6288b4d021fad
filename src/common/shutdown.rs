//! One-shot termination signal shared between tasks.

use std::future::Future;

use tokio::sync::watch;

/// A latch that flips once from "running" to "terminated".
///
/// Any number of tasks can await [`Shutdown::wait`]; all of them resume once
/// [`Shutdown::shutdown`] is called, including tasks that start waiting
/// afterwards. Used both for component shutdown and as the per-run
/// cancellation token handed to executors.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
        }
    }

    /// Flip the latch. Calling it again has no effect.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_terminated(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the latch has been flipped.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.wait_for(|terminated| *terminated).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_wait_after_shutdown_resolves() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_terminated());
        shutdown.shutdown();
        shutdown.shutdown();
        assert!(shutdown.is_terminated());
        tokio::time::timeout(Duration::from_millis(100), shutdown.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_wakes_pending_waiters() {
        let shutdown = std::sync::Arc::new(Shutdown::new());
        let waiter = tokio::spawn(shutdown.wait());
        tokio::task::yield_now().await;
        shutdown.shutdown();
        tokio::time::timeout(Duration::from_millis(100), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_wait_pending_while_running() {
        let shutdown = Shutdown::new();
        let res = tokio::time::timeout(Duration::from_millis(20), shutdown.wait()).await;
        assert!(res.is_err());
    }
}
