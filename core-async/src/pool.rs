//! Bounded worker pool.
//!
//! ## Overview
//!
//! `WorkerPool` runs futures on the ambient Tokio runtime while capping how many
//! of them make progress at once. It is the subsystem's dedicated executor: the
//! aggregation coordinator schedules every backend load through one pool, so a
//! burst of browse requests never fans out into an unbounded number of backend
//! calls.
//!
//! ## Shutdown
//!
//! [`WorkerPool::shutdown`] flips the pool into a terminal state:
//! - [`WorkerPool::spawn`] rejects new work with [`PoolError::ShutDown`]
//! - queued work that has not acquired a worker yet resolves to `None`
//! - work that is already running completes normally; callers decide whether
//!   to keep or discard the result
//!
//! [`WorkerPool::drained`] waits until every accepted task has finished.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Errors returned by [`WorkerPool`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("Worker pool '{pool}' is shut down")]
    ShutDown { pool: String },
}

/// Fixed-size pool of cooperative workers with explicit shutdown.
#[derive(Clone)]
pub struct WorkerPool {
    name: Arc<str>,
    workers: usize,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Creates a pool that runs at most `workers` tasks concurrently.
    ///
    /// A worker count of zero is bumped to one.
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        let workers = workers.max(1);
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            workers,
            permits: Arc::new(Semaphore::new(workers)),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Schedules `future` on the pool.
    ///
    /// The returned handle resolves to `Some(output)` when the future ran, or
    /// `None` when the pool shut down before a worker picked it up.
    pub fn spawn<F>(&self, future: F) -> Result<JoinHandle<Option<F::Output>>, PoolError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(PoolError::ShutDown {
                pool: self.name.to_string(),
            });
        }

        let permits = Arc::clone(&self.permits);
        let token = self.shutdown.clone();
        let name = Arc::clone(&self.name);

        Ok(self.tracker.spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(pool = %name, "Dropping queued task after shutdown");
                    return None;
                }
                permit = permits.acquire_owned() => permit.ok()?,
            };
            Some(future.await)
        }))
    }

    /// Stops accepting work. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            debug!(pool = %self.name, "Shutting down worker pool");
        }
        self.shutdown.cancel();
        self.tracker.close();
    }

    /// Resolves once the pool is shut down and every accepted task finished.
    pub async fn drained(&self) {
        self.tracker.wait().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when the pool shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of workers currently running a task.
    pub fn busy_workers(&self) -> usize {
        self.workers - self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.workers
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("busy", &self.busy_workers())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
