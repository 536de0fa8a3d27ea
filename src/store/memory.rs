//! In-Memory Collection Store
//!
//! Durable CRUD access to the five entity collections plus the
//! worker-to-task history index and the lease table. Leaf component: it
//! holds no policy, only typed reads, validated writes and id allocation.
//!
//! The store is an explicit handle passed (as `Arc<Store>`) into every
//! core component, never a process-wide singleton, so tests construct
//! their own isolated instance. The persistence technology behind the
//! collections is out of scope; the `DashMap`-backed implementation is
//! the store.

use super::types::*;
use crate::error::{EngineError, EngineResult};

use dashmap::DashMap;
use std::collections::{BTreeSet, HashSet};

/// The shared collection store.
pub struct Store {
    projects: DashMap<ProjectId, Project>,
    tasks: DashMap<TaskId, Task>,
    inputs: DashMap<InputId, Input>,
    translations: DashMap<TranslationId, Translation>,
    labels: DashMap<LabelId, Label>,
    workers: DashMap<WorkerId, WorkerState>,
    worker_tasks: DashMap<WorkerId, HashSet<TaskId>>,
    leases: DashMap<TaskId, Lease>,
}

/// Smallest positive integer not present in `used`.
fn smallest_unused(used: BTreeSet<i64>) -> i64 {
    let mut candidate = 1;
    for id in used {
        if id < candidate {
            continue;
        }
        if id == candidate {
            candidate += 1;
        } else {
            break;
        }
    }
    candidate
}

impl Store {
    pub fn new() -> Self {
        Self {
            projects: DashMap::new(),
            tasks: DashMap::new(),
            inputs: DashMap::new(),
            translations: DashMap::new(),
            labels: DashMap::new(),
            workers: DashMap::new(),
            worker_tasks: DashMap::new(),
            leases: DashMap::new(),
        }
    }

    // --- Projects ---

    pub fn create_project(&self, title: &str) -> EngineResult<Project> {
        let id = ProjectId(smallest_unused(
            self.projects.iter().map(|e| e.key().0).collect(),
        ));
        let project = Project {
            id,
            title: title.to_string(),
            description: None,
            src_lang: None,
            tgt_lang: None,
            overlap: 2,
            min_score: 4,
            is_active: true,
        };
        self.save_project(&project)?;
        Ok(project)
    }

    pub fn save_project(&self, project: &Project) -> EngineResult<()> {
        if project.overlap < 1 {
            return Err(EngineError::InvariantViolation(format!(
                "project {} has overlap {}, expected at least 1",
                project.id.0, project.overlap
            )));
        }
        if !(1..=5).contains(&project.min_score) {
            return Err(EngineError::InvariantViolation(format!(
                "project {} has min_score {}, expected 1..=5",
                project.id.0, project.min_score
            )));
        }
        self.projects.insert(project.id, project.clone());
        Ok(())
    }

    pub fn get_project(&self, id: ProjectId) -> Option<Project> {
        self.projects.get(&id).map(|p| p.clone())
    }

    pub fn projects(&self, active: Option<bool>) -> Vec<Project> {
        let mut projects: Vec<Project> = self
            .projects
            .iter()
            .filter(|p| active.is_none_or(|a| p.is_active == a))
            .map(|p| p.clone())
            .collect();
        projects.sort_by_key(|p| p.id);
        projects
    }

    // --- Tasks ---

    pub fn create_task(&self, project: &Project, prompt: Option<&str>) -> EngineResult<Task> {
        let id = TaskId(smallest_unused(
            self.tasks.iter().map(|e| e.key().0).collect(),
        ));
        let task = Task {
            id,
            project_id: project.id,
            prompt: prompt.map(str::to_string),
            locked: false,
            completed: false,
            completions: 0,
            completion_stats: None,
        };
        self.save_task(&task)?;
        Ok(task)
    }

    pub fn save_task(&self, task: &Task) -> EngineResult<()> {
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }

    pub fn get_task(&self, id: TaskId) -> Option<Task> {
        self.tasks.get(&id).map(|t| t.clone())
    }

    pub fn all_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.iter().map(|t| t.clone()).collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    pub fn incomplete_tasks_for_project(&self, project_id: ProjectId) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| !t.completed && t.project_id == project_id)
            .map(|t| t.clone())
            .collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    pub fn locked_tasks(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| t.locked)
            .map(|t| t.clone())
            .collect()
    }

    // --- Inputs ---

    pub fn create_input(
        &self,
        project: &Project,
        task: &Task,
        source: &str,
    ) -> EngineResult<Input> {
        let id = InputId(smallest_unused(
            self.inputs.iter().map(|e| e.key().0).collect(),
        ));
        let input = Input {
            id,
            task_id: task.id,
            project_id: project.id,
            source: source.to_string(),
            solved: false,
            status: InputStatus::NoTranslation,
        };
        self.save_input(&input)?;
        Ok(input)
    }

    pub fn save_input(&self, input: &Input) -> EngineResult<()> {
        if input.source.trim().is_empty() {
            return Err(EngineError::InvariantViolation(format!(
                "input {} has an empty source text",
                input.id.0
            )));
        }
        self.inputs.insert(input.id, input.clone());
        Ok(())
    }

    pub fn get_input(&self, id: InputId) -> Option<Input> {
        self.inputs.get(&id).map(|i| i.clone())
    }

    pub fn inputs_for_task(&self, task_id: TaskId) -> Vec<Input> {
        let mut inputs: Vec<Input> = self
            .inputs
            .iter()
            .filter(|i| i.task_id == task_id)
            .map(|i| i.clone())
            .collect();
        inputs.sort_by_key(|i| i.id);
        inputs
    }

    pub fn inputs_for_project(&self, project_id: ProjectId) -> Vec<Input> {
        self.inputs
            .iter()
            .filter(|i| i.project_id == project_id)
            .map(|i| i.clone())
            .collect()
    }

    pub fn unsolved_inputs_for_task(&self, task_id: TaskId) -> Vec<Input> {
        let mut inputs: Vec<Input> = self
            .inputs
            .iter()
            .filter(|i| i.task_id == task_id && !i.solved)
            .map(|i| i.clone())
            .collect();
        inputs.sort_by_key(|i| i.id);
        inputs
    }

    pub fn unsolved_inputs_for_project(&self, project_id: ProjectId) -> Vec<Input> {
        self.inputs
            .iter()
            .filter(|i| i.project_id == project_id && !i.solved)
            .map(|i| i.clone())
            .collect()
    }

    /// The unsolved input of the task with the lowest id strictly greater
    /// than `after` (`None` starts from the beginning).
    pub fn next_unsolved_input(&self, task_id: TaskId, after: Option<InputId>) -> Option<Input> {
        let threshold = after.map(|id| id.0).unwrap_or(0);
        self.inputs
            .iter()
            .filter(|i| i.task_id == task_id && !i.solved && i.id.0 > threshold)
            .min_by_key(|i| i.id)
            .map(|i| i.clone())
    }

    // --- Translations ---

    pub fn create_translation(
        &self,
        author: WorkerId,
        input: &Input,
        text: &str,
        status: TranslationStatus,
    ) -> EngineResult<Translation> {
        let id = TranslationId(smallest_unused(
            self.translations.iter().map(|e| e.key().0).collect(),
        ));
        let translation = Translation {
            id,
            input_id: input.id,
            task_id: input.task_id,
            project_id: input.project_id,
            author,
            submitted_at: now_secs(),
            text: text.to_string(),
            n_approvals: 0,
            status,
        };
        self.save_translation(&translation)?;
        Ok(translation)
    }

    pub fn save_translation(&self, translation: &Translation) -> EngineResult<()> {
        self.translations.insert(translation.id, translation.clone());
        Ok(())
    }

    pub fn get_translation(&self, id: TranslationId) -> Option<Translation> {
        self.translations.get(&id).map(|t| t.clone())
    }

    pub fn translations_for_input(
        &self,
        input_id: InputId,
        status: Option<TranslationStatus>,
    ) -> Vec<Translation> {
        let mut translations: Vec<Translation> = self
            .translations
            .iter()
            .filter(|t| t.input_id == input_id && status.is_none_or(|s| t.status == s))
            .map(|t| t.clone())
            .collect();
        translations.sort_by_key(|t| t.id);
        translations
    }

    pub fn translations_for_project(&self, project_id: ProjectId) -> Vec<Translation> {
        self.translations
            .iter()
            .filter(|t| t.project_id == project_id)
            .map(|t| t.clone())
            .collect()
    }

    pub fn unchecked_translations_for_project(&self, project_id: ProjectId) -> Vec<Translation> {
        self.translations
            .iter()
            .filter(|t| t.project_id == project_id && t.status == TranslationStatus::Unchecked)
            .map(|t| t.clone())
            .collect()
    }

    // --- Labels ---

    /// Creates an empty label owned by `rater` for the given translation.
    pub fn create_label(&self, rater: WorkerId, translation: &Translation) -> EngineResult<Label> {
        let id = LabelId(smallest_unused(
            self.labels.iter().map(|e| e.key().0).collect(),
        ));
        let label = Label {
            id,
            translation_id: translation.id,
            input_id: translation.input_id,
            task_id: translation.task_id,
            project_id: translation.project_id,
            rater,
            submitted_at: now_secs(),
            coherence: None,
            semantics: None,
        };
        self.save_label(&label)?;
        Ok(label)
    }

    pub fn save_label(&self, label: &Label) -> EngineResult<()> {
        if let Some(semantics) = label.semantics
            && !(1..=5).contains(&semantics)
        {
            return Err(EngineError::InvariantViolation(format!(
                "label {} has semantics score {}, expected 1..=5",
                label.id.0, semantics
            )));
        }
        self.labels.insert(label.id, label.clone());
        Ok(())
    }

    pub fn get_label(&self, id: LabelId) -> Option<Label> {
        self.labels.get(&id).map(|l| l.clone())
    }

    pub fn labels_for_project(&self, project_id: ProjectId) -> Vec<Label> {
        self.labels
            .iter()
            .filter(|l| l.project_id == project_id)
            .map(|l| l.clone())
            .collect()
    }

    pub fn labels_by_worker_for_project(
        &self,
        worker_id: WorkerId,
        project_id: ProjectId,
    ) -> Vec<Label> {
        self.labels
            .iter()
            .filter(|l| l.rater == worker_id && l.project_id == project_id)
            .map(|l| l.clone())
            .collect()
    }

    pub fn translation_ids_labeled_by_worker(
        &self,
        worker_id: WorkerId,
        task_id: TaskId,
    ) -> HashSet<TranslationId> {
        self.labels
            .iter()
            .filter(|l| l.rater == worker_id && l.task_id == task_id)
            .map(|l| l.translation_id)
            .collect()
    }

    // --- Workers ---

    pub fn get_worker(&self, id: WorkerId) -> Option<WorkerState> {
        self.workers.get(&id).map(|w| w.clone())
    }

    pub fn get_or_create_worker(&self, id: WorkerId) -> WorkerState {
        self.workers
            .entry(id)
            .or_insert_with(|| WorkerState::new(id))
            .clone()
    }

    pub fn save_worker(&self, worker: &WorkerState) -> EngineResult<()> {
        self.workers.insert(worker.id, worker.clone());
        Ok(())
    }

    pub fn all_workers(&self) -> Vec<WorkerState> {
        let mut workers: Vec<WorkerState> = self.workers.iter().map(|w| w.clone()).collect();
        workers.sort_by_key(|w| w.id);
        workers
    }

    // --- Worker-to-task history ---

    /// Records that the worker has touched the task. Append-only.
    pub fn link_worker_task(&self, worker_id: WorkerId, task_id: TaskId) {
        self.worker_tasks.entry(worker_id).or_default().insert(task_id);
    }

    pub fn tasks_touched_by(&self, worker_id: WorkerId) -> HashSet<TaskId> {
        self.worker_tasks
            .get(&worker_id)
            .map(|tasks| tasks.clone())
            .unwrap_or_default()
    }

    // --- Leases ---

    pub fn lease_for_task(&self, task_id: TaskId) -> Option<Lease> {
        self.leases.get(&task_id).map(|l| l.clone())
    }

    pub fn put_lease(&self, lease: Lease) {
        self.leases.insert(lease.task_id, lease);
    }

    pub fn remove_lease(&self, task_id: TaskId) {
        self.leases.remove(&task_id);
    }

    pub fn all_leases(&self) -> Vec<Lease> {
        self.leases.iter().map(|l| l.clone()).collect()
    }

    // --- Counters for the stats reporter ---

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn translation_count(&self) -> usize {
        self.translations.len()
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
