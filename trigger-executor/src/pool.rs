//! Bounded worker pool for offloaded attempts.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

const DEFAULT_WORKERS: usize = 8;

/// Maximum number of offloaded attempts running at once.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    max_workers: NonZeroUsize,
}

impl PoolConfig {
    /// Creates a configuration with the supplied worker limit.
    #[must_use]
    pub const fn new(max_workers: NonZeroUsize) -> Self {
        Self { max_workers }
    }

    /// Returns the configured worker limit.
    #[must_use]
    pub const fn max_workers(self) -> NonZeroUsize {
        self.max_workers
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_WORKERS).unwrap_or(NonZeroUsize::MIN))
    }
}

/// Fixed-size pool that admits at most `max_workers` tasks at a time.
///
/// A permit is acquired before the work is spawned, so callers waiting on a
/// saturated pool are suspended rather than piling up runtime tasks.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
    config: PoolConfig,
}

impl WorkerPool {
    /// Constructs a pool using the provided configuration.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let permits = config.max_workers().get();
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            closed: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Returns the associated configuration.
    #[must_use]
    pub const fn config(&self) -> PoolConfig {
        self.config
    }

    /// Returns the number of idle workers.
    #[must_use]
    pub fn available_workers(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Returns `true` if the pool has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the pool; queued and future submissions fail with
    /// [`PoolError::Closed`]. Work already running is unaffected.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.semaphore.close();
    }

    /// Spawns a future once a worker is free.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] when the pool is closed before a worker
    /// becomes available.
    pub async fn spawn<F, T>(&self, future: F) -> PoolResult<JoinHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.acquire().await?;
        Ok(tokio::spawn(async move {
            let output = future.await;
            drop(permit);
            output
        }))
    }

    /// Runs a blocking closure on the runtime's blocking threads once a worker
    /// is free.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] when the pool is closed before a worker
    /// becomes available.
    pub async fn spawn_blocking<F, T>(&self, work: F) -> PoolResult<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.acquire().await?;
        Ok(tokio::task::spawn_blocking(move || {
            let output = work();
            drop(permit);
            output
        }))
    }

    async fn acquire(&self) -> PoolResult<OwnedSemaphorePermit> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

/// Errors produced by the worker pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Pool is closed and will not accept new work.
    #[error("worker pool closed")]
    Closed,
}

/// Result alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
