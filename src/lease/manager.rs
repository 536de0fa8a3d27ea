//! Task Checkout Leases
//!
//! A task being worked on is marked `locked` and accompanied by a lease
//! record naming the holder and an expiry instant. The lock is advisory:
//! two workers racing to check out the same task is tolerated, because the
//! consensus rules absorb overlapping judgments. Correctness therefore
//! does not depend on mutual exclusion, only on eventually reclaiming
//! checkouts whose holder went away.
//!
//! ## Responsibilities
//! - **Acquisition / release**: O(1) flag-and-lease updates.
//! - **Expiry**: a lease older than the staleness window no longer counts
//!   as held.
//! - **Reconciliation**: a periodic sweep that repairs the lock flags
//!   against the lease table and the workers' activity timestamps, for
//!   holders that never released explicitly.

use crate::error::{EngineError, EngineResult};
use crate::store::memory::Store;
use crate::store::types::{Lease, TaskId, WorkerId, now_secs};

use std::collections::HashMap;
use std::sync::Arc;

pub struct LeaseManager {
    store: Arc<Store>,
    ttl_secs: u64,
}

impl LeaseManager {
    pub fn new(store: Arc<Store>, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    /// Checks the task out for the worker: sets the `locked` flag and
    /// issues a lease expiring after the staleness window.
    pub fn lock_task(&self, task_id: TaskId, worker_id: WorkerId) -> EngineResult<()> {
        let mut task = self
            .store
            .get_task(task_id)
            .ok_or_else(|| EngineError::not_found("task", task_id.0))?;
        task.locked = true;
        self.store.save_task(&task)?;
        self.store.put_lease(Lease {
            task_id,
            worker_id,
            expires_at: now_secs() + self.ttl_secs,
        });
        tracing::debug!("Locked task {} for worker {}", task_id.0, worker_id.0);
        Ok(())
    }

    /// Releases the checkout: clears the flag and drops the lease.
    pub fn unlock_task(&self, task_id: TaskId) -> EngineResult<()> {
        let mut task = self
            .store
            .get_task(task_id)
            .ok_or_else(|| EngineError::not_found("task", task_id.0))?;
        task.locked = false;
        self.store.save_task(&task)?;
        self.store.remove_lease(task_id);
        tracing::debug!("Unlocked task {}", task_id.0);
        Ok(())
    }

    /// Whether a live (unexpired) lease exists for the task.
    pub fn is_held(&self, task_id: TaskId) -> bool {
        self.store
            .lease_for_task(task_id)
            .map(|lease| lease.expires_at > now_secs())
            .unwrap_or(false)
    }

    /// Safety-net sweep over every locked task.
    ///
    /// A locked task stays locked if its lease is live, or if it is the
    /// current task of a non-blocked worker active within the staleness
    /// window (in which case a fresh lease is re-issued to repair the
    /// record). Every other locked task is unlocked. Expired leases of
    /// unlocked tasks are purged. Returns the number of tasks unlocked.
    pub fn reconcile(&self) -> EngineResult<u32> {
        let now = now_secs();
        let inactive_before = now.saturating_sub(self.ttl_secs);

        let active_holders: HashMap<TaskId, WorkerId> = self
            .store
            .all_workers()
            .into_iter()
            .filter(|w| !w.is_blocked && w.last_activity_at.unwrap_or(0) > inactive_before)
            .filter_map(|w| w.curr_task_id.map(|task_id| (task_id, w.id)))
            .collect();

        let locked = self.store.locked_tasks();
        tracing::debug!(
            "Reconciling {} locked tasks against {} active holders",
            locked.len(),
            active_holders.len()
        );

        let mut unlocked = 0;
        for mut task in locked {
            let lease_live = self
                .store
                .lease_for_task(task.id)
                .map(|lease| lease.expires_at > now)
                .unwrap_or(false);
            if lease_live {
                continue;
            }
            if let Some(worker_id) = active_holders.get(&task.id) {
                self.store.put_lease(Lease {
                    task_id: task.id,
                    worker_id: *worker_id,
                    expires_at: now + self.ttl_secs,
                });
                continue;
            }
            task.locked = false;
            self.store.save_task(&task)?;
            self.store.remove_lease(task.id);
            unlocked += 1;
        }

        for lease in self.store.all_leases() {
            if lease.expires_at <= now {
                let still_locked = self
                    .store
                    .get_task(lease.task_id)
                    .map(|t| t.locked)
                    .unwrap_or(false);
                if !still_locked {
                    self.store.remove_lease(lease.task_id);
                }
            }
        }

        if unlocked > 0 {
            tracing::info!("Reconciled task locks: unlocked {} stale tasks", unlocked);
        }
        Ok(unlocked)
    }
}
