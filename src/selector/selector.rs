//! Task Selection
//!
//! Chooses which task to offer a worker next, balancing "spread work
//! across tasks" against "let workers finish what was started".
//!
//! ## Responsibilities
//! - **Candidate filtering**: incomplete, preferably unlocked tasks of the
//!   worker's current project; tasks the worker never touched come first.
//! - **Forward-progress check**: when every candidate was already touched,
//!   keep only tasks where this worker can still contribute (an unsolved
//!   input with nothing pending, or with a pending translation the worker
//!   neither authored nor judged).
//! - **Strategy draw**: one of four weighted strategies decides the final
//!   pick; ties break uniformly at random.

use crate::config::IncompletenessWeights;
use crate::error::EngineResult;
use crate::lease::manager::LeaseManager;
use crate::selector::policy::{SelectionPolicy, SelectionStrategy};
use crate::store::memory::Store;
use crate::store::types::{InputId, ProjectId, Task, TaskId, TranslationId, WorkerState};

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub struct TaskSelector {
    store: Arc<Store>,
    leases: Arc<LeaseManager>,
    policy: SelectionPolicy,
    weights: IncompletenessWeights,
    rng: Mutex<StdRng>,
}

impl TaskSelector {
    pub fn new(
        store: Arc<Store>,
        leases: Arc<LeaseManager>,
        policy: SelectionPolicy,
        weights: IncompletenessWeights,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            leases,
            policy,
            weights,
            rng: Mutex::new(rng),
        }
    }

    /// Picks the next task to offer the worker, or `None` when no task in
    /// the project can make progress through this worker. The returned
    /// task is not locked; locking happens when the worker accepts.
    pub fn select_task(
        &self,
        worker: &WorkerState,
        project_id: ProjectId,
    ) -> EngineResult<Option<Task>> {
        self.leases.reconcile()?;

        let all = self.store.incomplete_tasks_for_project(project_id);
        let mut candidates: Vec<Task> = all.iter().filter(|t| !t.locked).cloned().collect();
        if candidates.is_empty() {
            // All unfinished tasks are checked out; offering a possibly
            // contended task beats offering none.
            candidates = all;
        }
        if candidates.is_empty() {
            tracing::info!("Did not find any unfinished tasks in project {}", project_id.0);
            return Ok(None);
        }

        let touched = self.store.tasks_touched_by(worker.id);
        let untouched: Vec<Task> = candidates
            .iter()
            .filter(|t| !touched.contains(&t.id))
            .cloned()
            .collect();
        let pool = if !untouched.is_empty() {
            untouched
        } else {
            let progressable = self.progressable_task_ids(worker, project_id);
            candidates
                .into_iter()
                .filter(|t| progressable.contains(&t.id))
                .collect()
        };
        if pool.is_empty() {
            tracing::info!(
                "No task in project {} can progress through worker {}",
                project_id.0,
                worker.id.0
            );
            return Ok(None);
        }

        let strategy = {
            let mut rng = self.rng.lock().expect("selector rng poisoned");
            self.policy.pick(&mut *rng)
        };
        let chosen = self.apply_strategy(strategy, &pool);
        tracing::info!(
            "Chose task {} among {} options ({:?})",
            chosen.0,
            pool.len(),
            strategy
        );
        Ok(self.store.get_task(chosen))
    }

    /// Tasks containing at least one unsolved input where this worker can
    /// still move things forward: either nothing is pending review at all,
    /// or something is pending that the worker neither authored nor
    /// already judged.
    fn progressable_task_ids(
        &self,
        worker: &WorkerState,
        project_id: ProjectId,
    ) -> HashSet<TaskId> {
        let unsolved = self.store.unsolved_inputs_for_project(project_id);
        let pending = self.store.unchecked_translations_for_project(project_id);
        let labeled_by_worker: HashSet<TranslationId> = self
            .store
            .labels_by_worker_for_project(worker.id, project_id)
            .iter()
            .map(|l| l.translation_id)
            .collect();

        let inputs_to_label: HashSet<InputId> = pending
            .iter()
            .filter(|t| t.author != worker.id && !labeled_by_worker.contains(&t.id))
            .map(|t| t.input_id)
            .collect();
        let inputs_with_pending: HashSet<InputId> =
            pending.iter().map(|t| t.input_id).collect();

        unsolved
            .iter()
            .filter(|inp| {
                inputs_to_label.contains(&inp.id) || !inputs_with_pending.contains(&inp.id)
            })
            .map(|inp| inp.task_id)
            .collect()
    }

    fn apply_strategy(&self, strategy: SelectionStrategy, pool: &[Task]) -> TaskId {
        let tied: Vec<TaskId> = match strategy {
            SelectionStrategy::LeastCompletions => {
                let min = pool.iter().map(|t| t.completions).min().unwrap_or(0);
                pool.iter()
                    .filter(|t| t.completions == min)
                    .map(|t| t.id)
                    .collect()
            }
            SelectionStrategy::MostIncomplete => {
                let max = pool
                    .iter()
                    .map(|t| t.incompleteness_score(&self.weights))
                    .max()
                    .unwrap_or(0);
                pool.iter()
                    .filter(|t| t.incompleteness_score(&self.weights) == max)
                    .map(|t| t.id)
                    .collect()
            }
            SelectionStrategy::MostComplete => {
                let min = pool
                    .iter()
                    .map(|t| t.incompleteness_score(&self.weights))
                    .min()
                    .unwrap_or(0);
                pool.iter()
                    .filter(|t| t.incompleteness_score(&self.weights) == min)
                    .map(|t| t.id)
                    .collect()
            }
            SelectionStrategy::Uniform => pool.iter().map(|t| t.id).collect(),
        };

        let mut rng = self.rng.lock().expect("selector rng poisoned");
        use rand::Rng;
        let idx = rng.gen_range(0..tied.len());
        tied[idx]
    }
}
