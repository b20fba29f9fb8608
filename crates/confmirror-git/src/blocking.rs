//! Bounded pool for blocking engine calls.

use std::sync::Arc;
use std::time::Duration;

use confmirror_core::{MirrorError, Result};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Default number of concurrent blocking engine calls.
pub const DEFAULT_WORKERS: usize = 4;

/// Runs blocking closures on tokio's blocking threads, at most `workers`
/// at a time.
#[derive(Debug, Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl BlockingPool {
    /// Creates a pool. A size of zero is treated as one.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Returns the pool size.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Returns the number of idle workers.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `f` on a blocking thread once a worker is free.
    pub async fn run<F, T>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| MirrorError::engine("worker pool is closed"))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|e| MirrorError::engine(format!("{} task failed: {}", operation, e)))?
    }

    /// Like [`run`](Self::run), bounded by `timeout`.
    ///
    /// On timeout `cancel` is triggered and a network error is returned. The
    /// closure keeps running until it observes the cancellation or its own
    /// socket timeouts fire, holding whatever it owns (such as a mirror
    /// lock) until then.
    pub async fn run_with_timeout<F, T>(
        &self,
        operation: &'static str,
        timeout: Duration,
        cancel: CancellationToken,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(timeout, self.run(operation, f)).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                warn!("{} timed out after {:?}", operation, timeout);
                Err(MirrorError::timed_out(operation, timeout.as_secs()))
            },
        }
    }
}

impl Default for BlockingPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}
