//! Lease Module Tests
//!
//! Validates checkout acquisition and release, lease expiry, and the
//! reconciliation sweep that reclaims checkouts from workers that went
//! quiet.

#[cfg(test)]
mod tests {
    use crate::lease::manager::LeaseManager;
    use crate::store::memory::Store;
    use crate::store::types::*;
    use std::sync::Arc;

    const WEEK_SECS: u64 = 60 * 60 * 24 * 7;

    fn setup() -> (Arc<Store>, LeaseManager, Task) {
        let store = Arc::new(Store::new());
        let project = store.create_project("P").unwrap();
        let task = store.create_task(&project, None).unwrap();
        let manager = LeaseManager::new(store.clone(), WEEK_SECS);
        (store, manager, task)
    }

    // ============================================================
    // ACQUISITION AND RELEASE
    // ============================================================

    #[test]
    fn test_lock_sets_flag_and_lease() {
        let (store, manager, task) = setup();

        manager.lock_task(task.id, WorkerId(7)).unwrap();

        assert!(store.get_task(task.id).unwrap().locked);
        let lease = store.lease_for_task(task.id).unwrap();
        assert_eq!(lease.worker_id, WorkerId(7));
        assert!(lease.expires_at > now_secs());
        assert!(manager.is_held(task.id));
    }

    #[test]
    fn test_unlock_clears_flag_and_lease() {
        let (store, manager, task) = setup();
        manager.lock_task(task.id, WorkerId(7)).unwrap();

        manager.unlock_task(task.id).unwrap();

        assert!(!store.get_task(task.id).unwrap().locked);
        assert!(store.lease_for_task(task.id).is_none());
        assert!(!manager.is_held(task.id));
    }

    #[test]
    fn test_expired_lease_does_not_count_as_held() {
        let (store, manager, task) = setup();
        store.put_lease(Lease {
            task_id: task.id,
            worker_id: WorkerId(7),
            expires_at: now_secs() - 10,
        });

        assert!(!manager.is_held(task.id));
    }

    // ============================================================
    // RECONCILIATION
    // ============================================================

    #[test]
    fn test_reconcile_unlocks_task_without_holder() {
        let (store, manager, task) = setup();
        let mut locked = task.clone();
        locked.locked = true;
        store.save_task(&locked).unwrap();

        let unlocked = manager.reconcile().unwrap();

        assert_eq!(unlocked, 1);
        assert!(!store.get_task(task.id).unwrap().locked);
    }

    #[test]
    fn test_reconcile_keeps_live_lease() {
        let (store, manager, task) = setup();
        manager.lock_task(task.id, WorkerId(7)).unwrap();

        let unlocked = manager.reconcile().unwrap();

        assert_eq!(unlocked, 0);
        assert!(store.get_task(task.id).unwrap().locked);
    }

    #[test]
    fn test_reconcile_reissues_lease_for_active_holder() {
        let (store, manager, task) = setup();

        // Locked flag without a lease, but an active worker points at it.
        let mut locked = task.clone();
        locked.locked = true;
        store.save_task(&locked).unwrap();
        let mut worker = store.get_or_create_worker(WorkerId(7));
        worker.curr_task_id = Some(task.id);
        worker.last_activity_at = Some(now_secs());
        store.save_worker(&worker).unwrap();

        let unlocked = manager.reconcile().unwrap();

        assert_eq!(unlocked, 0);
        assert!(store.get_task(task.id).unwrap().locked);
        assert!(manager.is_held(task.id));
    }

    #[test]
    fn test_reconcile_reclaims_task_of_stale_worker() {
        let (store, manager, task) = setup();
        let mut locked = task.clone();
        locked.locked = true;
        store.save_task(&locked).unwrap();
        store.put_lease(Lease {
            task_id: task.id,
            worker_id: WorkerId(7),
            expires_at: now_secs() - 10,
        });

        // The holder was last seen beyond the staleness window.
        let mut worker = store.get_or_create_worker(WorkerId(7));
        worker.curr_task_id = Some(task.id);
        worker.last_activity_at = Some(now_secs() - WEEK_SECS - 60);
        store.save_worker(&worker).unwrap();

        let unlocked = manager.reconcile().unwrap();

        assert_eq!(unlocked, 1);
        assert!(!store.get_task(task.id).unwrap().locked);
        assert!(store.lease_for_task(task.id).is_none());
    }

    #[test]
    fn test_reconcile_ignores_blocked_holder() {
        let (store, manager, task) = setup();
        let mut locked = task.clone();
        locked.locked = true;
        store.save_task(&locked).unwrap();

        // Recent activity, but the worker is blocked.
        let mut worker = store.get_or_create_worker(WorkerId(7));
        worker.curr_task_id = Some(task.id);
        worker.last_activity_at = Some(now_secs());
        worker.is_blocked = true;
        store.save_worker(&worker).unwrap();

        let unlocked = manager.reconcile().unwrap();

        assert_eq!(unlocked, 1);
        assert!(!store.get_task(task.id).unwrap().locked);
    }

    #[test]
    fn test_reconcile_purges_expired_lease_of_unlocked_task() {
        let (store, manager, task) = setup();
        store.put_lease(Lease {
            task_id: task.id,
            worker_id: WorkerId(7),
            expires_at: now_secs() - 10,
        });

        manager.reconcile().unwrap();

        assert!(store.lease_for_task(task.id).is_none());
    }
}
