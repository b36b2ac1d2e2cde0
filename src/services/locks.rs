use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;
use uuid::Uuid;

use crate::errors::ServiceError;

const DEFAULT_WAIT: Duration = Duration::from_secs(10);

type LockTable = DashMap<Uuid, Arc<Mutex<()>>>;

/// Per-work-order mutual exclusion for read-count-then-write sequences.
///
/// Guards unit completion and unit opening in this process; the conditional update and
/// unique indexes in the database catch writers in other processes.
#[derive(Clone, Debug)]
pub struct WorkOrderLocks {
    inner: Arc<LockTable>,
    wait: Duration,
}

/// Exclusive hold on one work order. The registry entry goes away with the last holder.
#[derive(Debug)]
pub struct WorkOrderLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<LockTable>,
    work_order_id: Uuid,
}

impl Drop for WorkOrderLockGuard {
    fn drop(&mut self) {
        // Release the mutex before checking who else still references it.
        self.guard.take();
        release_entry(&self.table, self.work_order_id);
    }
}

/// Removes the entry when the registry holds the only reference.
fn release_entry(table: &LockTable, work_order_id: Uuid) {
    table.remove_if(&work_order_id, |_, m| Arc::strong_count(m) == 1);
}

impl Default for WorkOrderLocks {
    fn default() -> Self {
        Self::with_wait(DEFAULT_WAIT)
    }
}

impl WorkOrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wait(wait: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            wait,
        }
    }

    /// Waits up to the configured bound for exclusive access to `work_order_id`.
    pub async fn acquire(&self, work_order_id: Uuid) -> Result<WorkOrderLockGuard, ServiceError> {
        let mutex = self
            .inner
            .entry(work_order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(self.wait, mutex.lock_owned()).await {
            Ok(guard) => Ok(WorkOrderLockGuard {
                guard: Some(guard),
                table: Arc::clone(&self.inner),
                work_order_id,
            }),
            Err(_) => {
                // The timed-out future owned our clone; it is gone by now.
                release_entry(&self.inner, work_order_id);
                warn!(%work_order_id, "timed out waiting for work order lock");
                Err(ServiceError::ConcurrentModification(work_order_id))
            }
        }
    }

    /// Number of work orders currently held or waited on.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_work_order_is_exclusive() {
        let locks = WorkOrderLocks::with_wait(Duration::from_millis(50));
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await.unwrap();
        let err = locks.acquire(id).await.unwrap_err();
        assert!(matches!(err, ServiceError::ConcurrentModification(got) if got == id));

        drop(guard);
        assert!(locks.acquire(id).await.is_ok());
    }

    #[tokio::test]
    async fn different_work_orders_do_not_block() {
        let locks = WorkOrderLocks::with_wait(Duration::from_millis(50));
        let _a = locks.acquire(Uuid::new_v4()).await.unwrap();
        assert!(locks.acquire(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn released_entries_leave_the_registry() {
        let locks = WorkOrderLocks::new();
        let held = Uuid::new_v4();
        let guard = locks.acquire(held).await.unwrap();
        drop(locks.acquire(Uuid::new_v4()).await.unwrap());

        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn timed_out_waiter_does_not_evict_the_holder() {
        let locks = WorkOrderLocks::with_wait(Duration::from_millis(20));
        let id = Uuid::new_v4();
        let guard = locks.acquire(id).await.unwrap();

        assert!(locks.acquire(id).await.is_err());
        assert_eq!(locks.len(), 1);

        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn entry_survives_while_a_waiter_is_queued() {
        let locks = WorkOrderLocks::with_wait(Duration::from_secs(5));
        let id = Uuid::new_v4();
        let guard = locks.acquire(id).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(id).await.unwrap();
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_work_orders_drain_to_empty() {
        let locks = WorkOrderLocks::new();
        let ids: Vec<Uuid> = (0..16).map(|_| Uuid::new_v4()).collect();

        let mut tasks = Vec::new();
        for round in 0..64 {
            let locks = locks.clone();
            let id = ids[round % ids.len()];
            tasks.push(tokio::spawn(async move {
                let _g = locks.acquire(id).await.unwrap();
                tokio::task::yield_now().await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(locks.len(), 0);
    }
}
