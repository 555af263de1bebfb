use std::sync::Arc;

use bronze_core::SchedulerPool;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::IngestError;

/// Bounds how many pipeline drains each pool runs at once. Pools with a
/// higher weight get more concurrent slots.
#[derive(Debug)]
pub struct Scheduler {
    bronze_p1: Arc<Semaphore>,
    bronze_p2: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            bronze_p1: Arc::new(Semaphore::new(SchedulerPool::BronzeP1.weight())),
            bronze_p2: Arc::new(Semaphore::new(SchedulerPool::BronzeP2.weight())),
        }
    }

    fn semaphore(&self, pool: SchedulerPool) -> &Arc<Semaphore> {
        match pool {
            SchedulerPool::BronzeP1 => &self.bronze_p1,
            SchedulerPool::BronzeP2 => &self.bronze_p2,
        }
    }

    /// Wait for a slot in `pool`. The slot is released when the permit drops.
    pub async fn acquire(&self, pool: SchedulerPool) -> Result<OwnedSemaphorePermit, IngestError> {
        self.semaphore(pool)
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| IngestError::SchedulerClosed(pool))
    }

    pub fn available(&self, pool: SchedulerPool) -> usize {
        self.semaphore(pool).available_permits()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
