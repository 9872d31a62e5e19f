//! Bounded-concurrency admission for probe tasks

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ScanError;

pub const DEFAULT_WORKERS: usize = 100;

/// Counting semaphore sized to the configured worker ceiling. Each probe task
/// holds its permit for its entire lifetime; dropping the permit is the
/// release, so every exit path pairs up.
#[derive(Clone)]
pub struct WorkerPool {
    sem: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Misconfigured sizes (`<= 0`) fall back to [`DEFAULT_WORKERS`].
    pub fn new(size: i64) -> Self {
        let capacity = if size <= 0 {
            DEFAULT_WORKERS
        } else {
            size as usize
        };
        Self {
            sem: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub async fn acquire(&self) -> crate::Result<OwnedSemaphorePermit> {
        self.sem
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ScanError::PoolClosed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}
