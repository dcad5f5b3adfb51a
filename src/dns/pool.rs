//! Bounded worker pool for DNS tasks
//!
//! Admission goes through a semaphore with one permit per worker. Submission
//! never waits: when every permit is taken the task is rejected and the
//! caller drops it.

use crate::error::RelayError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio::task::JoinSet;
use tracing::debug;

/// Fixed-size pool of concurrent tasks
#[derive(Debug)]
pub struct WorkerPool {
    size: usize,
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl WorkerPool {
    /// Create a pool admitting at most `size` tasks at once
    pub fn new(size: usize) -> Self {
        WorkerPool {
            size,
            permits: Arc::new(Semaphore::new(size)),
            tasks: JoinSet::new(),
        }
    }

    /// Maximum number of concurrent tasks
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of tasks currently holding a worker slot
    pub fn active(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Run `task` on a free worker, or reject it immediately
    pub fn try_spawn<F>(&mut self, task: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::NoPermits => RelayError::PoolSaturated(self.size),
                TryAcquireError::Closed => RelayError::PoolClosed,
            })?;

        // Finished tasks stay in the set until joined
        while self.tasks.try_join_next().is_some() {}

        self.tasks.spawn(async move {
            let _permit = permit;
            task.await;
        });

        Ok(())
    }

    /// Abort every in-flight task
    pub fn shutdown(&mut self) {
        let in_flight = self.active();
        if in_flight > 0 {
            debug!("Aborting {} in-flight DNS tasks", in_flight);
        }
        self.permits.close();
        self.tasks.abort_all();
    }
}
