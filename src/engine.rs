//! Engine Facade
//!
//! The single handle the dialogue/transport layer talks to. It owns the
//! store and the core components, keeps the per-worker session pointers
//! consistent across operations, and exposes the public operations:
//! selecting, locking and assigning tasks, recording translations and
//! label scores, project statistics, and the periodic maintenance
//! entry points.
//!
//! Every operation runs synchronously to completion; concurrency comes
//! from many transport handlers invoking the same engine against one
//! shared store. There are no cross-entity transactions: each operation
//! is a sequence of independent upserts, and the status recomputation
//! sweep repairs whatever an ill-timed crash leaves behind.

use crate::assignment::assigner::AssignmentLoop;
use crate::assignment::types::WorkUnit;
use crate::config::EngineConfig;
use crate::consensus::engine::{ConsensusEngine, Resolution};
use crate::error::{EngineError, EngineResult};
use crate::lease::manager::LeaseManager;
use crate::selector::selector::TaskSelector;
use crate::store::memory::Store;
use crate::store::types::{
    InputId, LabelId, LabelScore, ProjectId, ProjectStats, Task, TaskId, Translation,
    TranslationStatus, WorkerId, WorkerPhase, WorkerState, now_secs,
};

use std::collections::HashSet;
use std::sync::Arc;

pub struct Engine {
    store: Arc<Store>,
    leases: Arc<LeaseManager>,
    selector: Arc<TaskSelector>,
    assigner: AssignmentLoop,
    consensus: ConsensusEngine,
}

impl Engine {
    pub fn new(store: Arc<Store>, config: EngineConfig) -> Arc<Self> {
        let leases = Arc::new(LeaseManager::new(store.clone(), config.lease.ttl_secs));
        let selector = Arc::new(TaskSelector::new(
            store.clone(),
            leases.clone(),
            config.selection.clone(),
            config.incompleteness.clone(),
            config.rng_seed,
        ));
        let assigner = AssignmentLoop::new(store.clone(), leases.clone());
        let consensus = ConsensusEngine::new(store.clone());
        Arc::new(Self {
            store,
            leases,
            selector,
            assigner,
            consensus,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn leases(&self) -> &Arc<LeaseManager> {
        &self.leases
    }

    pub fn selector(&self) -> &Arc<TaskSelector> {
        &self.selector
    }

    /// Marks the worker as just seen: refreshes the activity timestamp and
    /// resets the unanswered-reminder counter. Called on every inbound
    /// worker action.
    pub fn touch_worker(&self, worker_id: WorkerId) -> EngineResult<WorkerState> {
        let mut worker = self.store.get_or_create_worker(worker_id);
        worker.last_activity_at = Some(now_secs());
        worker.n_last_reminders = 0;
        self.store.save_worker(&worker)?;
        Ok(worker)
    }

    /// Offers the worker a task from the project, recording the offer on
    /// the worker's session state. The task is not locked; locking happens
    /// when the worker explicitly accepts.
    pub fn select_task(
        &self,
        worker_id: WorkerId,
        project_id: ProjectId,
    ) -> EngineResult<Option<Task>> {
        let mut worker = self.touch_worker(worker_id)?;
        worker.curr_project_id = Some(project_id);
        let task = self.selector.select_task(&worker, project_id)?;
        if let Some(task) = &task {
            if worker.curr_task_id != Some(task.id) {
                worker.cursor_input_id = None;
            }
            worker.curr_task_id = Some(task.id);
            worker.phase = WorkerPhase::OfferedTask;
        }
        self.store.save_worker(&worker)?;
        Ok(task)
    }

    /// Checks a task out for a worker who accepted the offer.
    pub fn lock_task(&self, task_id: TaskId, worker_id: WorkerId) -> EngineResult<()> {
        self.touch_worker(worker_id)?;
        self.leases.lock_task(task_id, worker_id)
    }

    pub fn unlock_task(&self, task_id: TaskId) -> EngineResult<()> {
        self.leases.unlock_task(task_id)
    }

    /// Walks the task for the next unit of work for this worker.
    pub fn assign_next(&self, worker_id: WorkerId, task_id: TaskId) -> EngineResult<WorkUnit> {
        let mut worker = self.touch_worker(worker_id)?;
        let task = self
            .store
            .get_task(task_id)
            .ok_or_else(|| EngineError::not_found("task", task_id.0))?;
        let unit = self.assigner.assign_next(&mut worker, &task)?;
        self.store.save_worker(&worker)?;
        Ok(unit)
    }

    /// Records a worker's free-text translation of an input.
    pub fn record_translation(
        &self,
        worker_id: WorkerId,
        input_id: InputId,
        text: &str,
    ) -> EngineResult<Translation> {
        let mut worker = self.touch_worker(worker_id)?;
        let input = self
            .store
            .get_input(input_id)
            .ok_or_else(|| EngineError::not_found("input", input_id.0))?;
        let translation = self.consensus.record_translation(worker_id, &input, text)?;
        worker.n_translations += 1;
        worker.curr_translation_id = None;
        worker.phase = WorkerPhase::Idle;
        self.store.save_worker(&worker)?;
        Ok(translation)
    }

    /// Records one score on the worker's current label and resolves it if
    /// both questions are now answered.
    pub fn record_label_score(
        &self,
        worker_id: WorkerId,
        label_id: LabelId,
        score: LabelScore,
    ) -> EngineResult<Resolution> {
        let mut worker = self.touch_worker(worker_id)?;
        if worker.curr_label_id != Some(label_id) {
            return Err(EngineError::InvariantViolation(format!(
                "worker {} is not holding label {}",
                worker_id.0, label_id.0
            )));
        }
        if !worker.phase.accepts(&score) {
            return Err(EngineError::InvariantViolation(format!(
                "worker {} cannot submit a {:?} score in phase {:?}",
                worker_id.0, score, worker.phase
            )));
        }

        let (label, resolution) = self.consensus.record_label_score(label_id, score)?;
        match resolution {
            Resolution::Pending => {
                // Move on to whichever question is still open.
                worker.phase = if label.coherence.is_some() {
                    WorkerPhase::JudgingSemantics
                } else {
                    WorkerPhase::JudgingCoherence
                };
            }
            Resolution::Positive | Resolution::Negative => {
                worker.n_labels += 1;
                worker.curr_label_id = None;
                worker.curr_translation_id = None;
                worker.phase = WorkerPhase::Idle;
            }
        }
        self.store.save_worker(&worker)?;
        Ok(resolution)
    }

    /// Aggregate progress numbers for a project.
    pub fn project_stats(&self, project_id: ProjectId) -> EngineResult<ProjectStats> {
        let project = self
            .store
            .get_project(project_id)
            .ok_or_else(|| EngineError::not_found("project", project_id.0))?;
        let inputs = self.store.inputs_for_project(project_id);
        let translations = self.store.translations_for_project(project_id);
        let labels = self.store.labels_for_project(project_id);

        let partial_inputs: HashSet<InputId> = translations
            .iter()
            .filter(|t| t.status == TranslationStatus::Unchecked && t.n_approvals > 0)
            .map(|t| t.input_id)
            .collect();

        Ok(ProjectStats {
            n_inputs: inputs.len(),
            n_partial: partial_inputs.len(),
            n_solved: inputs.iter().filter(|i| i.solved).count(),
            n_user_translations: translations
                .iter()
                .filter(|t| t.author != WorkerId::SYSTEM)
                .count(),
            n_rejected_user_translations: translations
                .iter()
                .filter(|t| {
                    t.author != WorkerId::SYSTEM && t.status == TranslationStatus::Rejected
                })
                .count(),
            n_labels: labels.len(),
            n_positive_labels: labels
                .iter()
                .filter(|l| l.is_positive(project.min_score) == Some(true))
                .count(),
            n_negative_labels: labels
                .iter()
                .filter(|l| l.is_positive(project.min_score) == Some(false))
                .count(),
        })
    }

    // --- Periodic maintenance, not meant for the per-request path ---

    pub fn reconcile_locks(&self) -> EngineResult<u32> {
        self.leases.reconcile()
    }

    pub fn recompute_task_status(&self, task_id: TaskId) -> EngineResult<()> {
        self.consensus.recompute_task_status(task_id)
    }

    pub fn recompute_all_task_statuses(&self) -> EngineResult<usize> {
        self.consensus.recompute_all_task_statuses()
    }
}
