//! Assignment Loop
//!
//! Walks a task's inputs to decide what a worker should do next: judge an
//! existing translation, produce a new one, or hear that the task is
//! exhausted.
//!
//! ## Responsibilities
//! - **Cursor scan**: inputs are visited in ascending id order, strictly
//!   past the worker's cursor, and never revisited within one pass.
//! - **Review before translate**: an unchecked translation by somebody
//!   else that this worker has not judged yet always wins over asking for
//!   a fresh translation.
//! - **Skipping**: an input whose only pending translations were authored
//!   or already judged by this worker cannot progress right now and is
//!   skipped.
//! - **Exhaustion bookkeeping**: release the checkout, count the
//!   completion, mark the task completed once nothing unsolved remains,
//!   and remember that this worker touched the task.

use crate::assignment::types::WorkUnit;
use crate::error::{EngineError, EngineResult};
use crate::lease::manager::LeaseManager;
use crate::store::memory::Store;
use crate::store::types::{Task, TranslationStatus, WorkerPhase, WorkerState};

use std::sync::Arc;

pub struct AssignmentLoop {
    store: Arc<Store>,
    leases: Arc<LeaseManager>,
}

impl AssignmentLoop {
    pub fn new(store: Arc<Store>, leases: Arc<LeaseManager>) -> Self {
        Self { store, leases }
    }

    /// Produces the next work unit for the worker inside the task,
    /// advancing the worker's cursor and pointers in place. The caller
    /// persists the worker afterwards.
    ///
    /// The scan is bounded by the number of unsolved inputs present at
    /// entry: every iteration either returns or moves the cursor past one
    /// of them, so running out of budget takes a misbehaving store. If it
    /// happens anyway, it surfaces as `LoopExhausted` instead of looping
    /// forever.
    pub fn assign_next(&self, worker: &mut WorkerState, task: &Task) -> EngineResult<WorkUnit> {
        let unsolved = self.store.unsolved_inputs_for_task(task.id);
        let budget = unsolved.len() + 1;
        let labeled = self
            .store
            .translation_ids_labeled_by_worker(worker.id, task.id);

        // A cursor from a different task does not apply here.
        if worker.curr_task_id != Some(task.id) {
            worker.cursor_input_id = None;
        }

        for _ in 0..budget {
            let Some(input) = self
                .store
                .next_unsolved_input(task.id, worker.cursor_input_id)
            else {
                return self.finish_task(worker, task);
            };

            let translations = self.store.translations_for_input(input.id, None);

            let reviewable = translations
                .iter()
                .filter(|t| {
                    t.status == TranslationStatus::Unchecked
                        && t.author != worker.id
                        && !labeled.contains(&t.id)
                })
                .min_by_key(|t| t.id);

            if let Some(candidate) = reviewable {
                let label = self.store.create_label(worker.id, candidate)?;
                worker.curr_project_id = Some(task.project_id);
                worker.curr_task_id = Some(task.id);
                worker.cursor_input_id = Some(input.id);
                worker.curr_translation_id = Some(candidate.id);
                worker.curr_label_id = Some(label.id);
                worker.phase = WorkerPhase::JudgingCoherence;
                tracing::debug!(
                    "Offering translation {} on input {} to worker {} for review",
                    candidate.id.0,
                    input.id.0,
                    worker.id.0
                );
                return Ok(WorkUnit::Review {
                    translation: candidate.clone(),
                    input,
                    label,
                });
            }

            let has_pending = translations
                .iter()
                .any(|t| t.status == TranslationStatus::Unchecked);
            if has_pending {
                // Everything pending here is the worker's own work or
                // already judged by them; skip and keep scanning.
                worker.cursor_input_id = Some(input.id);
                continue;
            }

            worker.curr_project_id = Some(task.project_id);
            worker.curr_task_id = Some(task.id);
            worker.cursor_input_id = Some(input.id);
            worker.curr_translation_id = None;
            worker.curr_label_id = None;
            worker.phase = WorkerPhase::Translating;
            tracing::debug!(
                "Asking worker {} to translate input {}",
                worker.id.0,
                input.id.0
            );
            return Ok(WorkUnit::Translate { input });
        }

        Err(EngineError::LoopExhausted {
            task_id: task.id.0,
            scanned: budget,
        })
    }

    /// The scan ran past the last unsolved input: close the pass out.
    fn finish_task(&self, worker: &mut WorkerState, task: &Task) -> EngineResult<WorkUnit> {
        self.leases.unlock_task(task.id)?;

        let mut task = self
            .store
            .get_task(task.id)
            .ok_or_else(|| EngineError::not_found("task", task.id.0))?;
        task.completions += 1;
        let remaining = self.store.unsolved_inputs_for_task(task.id);
        if remaining.is_empty() {
            task.completed = true;
        }
        self.store.save_task(&task)?;
        self.store.link_worker_task(worker.id, task.id);

        worker.clear_cursor();
        worker.phase = WorkerPhase::AwaitingMore;

        tracing::info!(
            "Worker {} exhausted task {} (completions now {}, completed: {})",
            worker.id.0,
            task.id.0,
            task.completions,
            task.completed
        );
        Ok(WorkUnit::TaskExhausted)
    }
}
