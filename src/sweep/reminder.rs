//! Reminder Sweep
//!
//! Background pass over all workers that nudges the idle ones back to
//! work: either to resume their current task or, if they have none, with
//! a freshly selected offer.
//!
//! ## Responsibilities
//! - **Lock hygiene**: reconciles task checkouts before composing offers.
//! - **Targeting**: skips blocked workers (clearing their stale cursors),
//!   workers who went quiet after too many reminders, and workers pinged
//!   or active too recently; a random share of the remainder is skipped
//!   to spread send times across runs.
//! - **Rate limiting**: one worker at a time with a delay between sends.
//! - **Failure handling**: a transient send failure is logged and the
//!   sweep moves on; a permanent one marks the worker blocked and drops
//!   them from all future scheduling.

use crate::config::ReminderConfig;
use crate::error::{EngineResult, NotifyError};
use crate::lease::manager::LeaseManager;
use crate::selector::selector::TaskSelector;
use crate::store::memory::Store;
use crate::store::types::{WorkerPhase, WorkerState, now_secs};
use crate::sweep::notifier::Notifier;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Counters of one sweep run, for the logs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Non-blocked workers looked at.
    pub considered: usize,
    /// Reminders actually delivered.
    pub reminded: usize,
    /// Workers newly marked blocked by a permanent delivery failure.
    pub blocked: usize,
    /// Sends that failed transiently.
    pub failed: usize,
}

pub struct ReminderSweep {
    store: Arc<Store>,
    leases: Arc<LeaseManager>,
    selector: Arc<TaskSelector>,
    notifier: Arc<dyn Notifier>,
    cfg: ReminderConfig,
    rng: Mutex<StdRng>,
}

impl ReminderSweep {
    pub fn new(
        store: Arc<Store>,
        leases: Arc<LeaseManager>,
        selector: Arc<TaskSelector>,
        notifier: Arc<dyn Notifier>,
        cfg: ReminderConfig,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            leases,
            selector,
            notifier,
            cfg,
            rng: Mutex::new(rng),
        }
    }

    pub async fn run(&self) -> EngineResult<SweepReport> {
        let sweep_id = Uuid::new_v4();
        tracing::info!("Starting reminder sweep {}", sweep_id);

        self.leases.reconcile()?;

        let mut report = SweepReport::default();
        for mut worker in self.store.all_workers() {
            if worker.is_blocked {
                // A blocked worker never resumes; drop its stale cursor so
                // reconciliation stops treating its task as held.
                worker.clear_cursor();
                self.store.save_worker(&worker)?;
                continue;
            }
            report.considered += 1;

            if worker.n_last_reminders > self.cfg.max_unanswered {
                // The worker seems to be gone; stop bothering them.
                continue;
            }

            let now = now_secs();
            let last_seen = worker
                .last_activity_at
                .unwrap_or(0)
                .max(worker.last_reminder_at.unwrap_or(0));
            if now.saturating_sub(last_seen) < self.cfg.min_idle_secs {
                continue;
            }

            let skip = {
                let mut rng = self.rng.lock().expect("sweep rng poisoned");
                rng.gen_bool(self.cfg.skip_probability)
            };
            if skip {
                continue;
            }

            let Some(text) = self.compose_reminder(&mut worker)? else {
                continue;
            };

            worker.n_last_reminders += 1;
            worker.last_reminder_at = Some(now);
            self.store.save_worker(&worker)?;

            match self.notifier.send(worker.id, &text).await {
                Ok(()) => {
                    report.reminded += 1;
                }
                Err(NotifyError::Transient(reason)) => {
                    tracing::warn!(
                        "Failed to remind worker {} ({}), continuing",
                        worker.id.0,
                        reason
                    );
                    report.failed += 1;
                }
                Err(NotifyError::Permanent(reason)) => {
                    tracing::warn!(
                        "Unsubscribing worker {} after a permanent delivery failure ({})",
                        worker.id.0,
                        reason
                    );
                    worker.is_blocked = true;
                    worker.block_log = Some(reason);
                    self.store.save_worker(&worker)?;
                    report.blocked += 1;
                }
            }

            // One worker at a time, with breathing room for the channel.
            tokio::time::sleep(self.cfg.send_delay).await;
        }

        tracing::info!(
            "Reminder sweep {} done: {} considered, {} reminded, {} blocked, {} failed",
            sweep_id,
            report.considered,
            report.reminded,
            report.blocked,
            report.failed
        );
        Ok(report)
    }

    /// Builds the reminder text: a resume nudge when the worker still has
    /// an open task, otherwise a fresh offer via the selector. `None`
    /// means there is nothing to say to this worker.
    fn compose_reminder(&self, worker: &mut WorkerState) -> EngineResult<Option<String>> {
        if let Some(task_id) = worker.curr_task_id
            && let Some(task) = self.store.get_task(task_id)
            && !task.completed
        {
            return Ok(Some(format!(
                "The project is still running. When you have a moment, task #{} is waiting for you.",
                task_id.0
            )));
        }

        let Some(project_id) = worker.curr_project_id else {
            return Ok(None);
        };
        let Some(task) = self.selector.select_task(worker, project_id)? else {
            return Ok(None);
        };

        worker.curr_task_id = Some(task.id);
        worker.cursor_input_id = None;
        worker.phase = WorkerPhase::OfferedTask;

        let mut text = format!(
            "The project is still running. I would like to offer you a new task: #{}.",
            task.id.0
        );
        if let Some(prompt) = &task.prompt {
            text.push('\n');
            text.push_str(prompt);
        }
        text.push_str("\nReady to take it, or would you like a different one?");
        Ok(Some(text))
    }
}
