//! Consensus Engine
//!
//! Turns accumulated labels on a translation into an accept/reject
//! verdict and propagates the outcome up to the input, plus the derived
//! status recomputation that repairs any sequence of upserts interrupted
//! mid-way.
//!
//! ## Rules
//! - A label is positive when it is coherent enough for its era (see
//!   `Label::is_positive`) and its semantics score reaches the project's
//!   `min_score`; a single negative label rejects the translation.
//! - A translation is accepted at its `overlap`-th positive label, unless
//!   it was rejected first. Rejection is sticky: later positive labels
//!   still increment the approval counter but never flip the status back.
//! - A submission whose text exactly matches an existing translation of
//!   the same input is recorded as a duplicate and never enters the
//!   review pool.

use crate::error::{EngineError, EngineResult};
use crate::store::memory::Store;
use crate::store::types::{
    Input, InputId, InputStatus, Label, LabelId, LabelScore, Project, TaskId, Translation,
    TranslationStatus, WorkerId,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of resolving a label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// A score is still missing; ask the remaining question.
    Pending,
    /// The label counted as an approval.
    Positive,
    /// The label rejected the translation.
    Negative,
}

pub struct ConsensusEngine {
    store: Arc<Store>,
}

impl ConsensusEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Records a worker's free-text submission for an input. An exact
    /// duplicate of any translation already recorded for the same input is
    /// marked `Duplicate` right away and skips the review pool.
    pub fn record_translation(
        &self,
        author: WorkerId,
        input: &Input,
        text: &str,
    ) -> EngineResult<Translation> {
        let existing = self.store.translations_for_input(input.id, None);
        let is_duplicate = existing.iter().any(|t| t.text == text);
        let status = if is_duplicate {
            TranslationStatus::Duplicate
        } else {
            TranslationStatus::Unchecked
        };
        let translation = self.store.create_translation(author, input, text, status)?;
        if is_duplicate {
            tracing::info!(
                "Translation {} for input {} duplicates an earlier submission",
                translation.id.0,
                input.id.0
            );
        } else {
            tracing::debug!(
                "Recorded translation {} for input {} by worker {}",
                translation.id.0,
                input.id.0,
                author.0
            );
        }
        Ok(translation)
    }

    /// Stores one score on a label and resolves it if both questions are
    /// now answered (or the coherence answer alone rejects).
    pub fn record_label_score(
        &self,
        label_id: LabelId,
        score: LabelScore,
    ) -> EngineResult<(Label, Resolution)> {
        let mut label = self
            .store
            .get_label(label_id)
            .ok_or_else(|| EngineError::not_found("label", label_id.0))?;
        match score {
            LabelScore::Coherence(value) => label.coherence = Some(value),
            LabelScore::Semantics(value) => label.semantics = Some(value),
        }
        self.store.save_label(&label)?;
        let resolution = self.resolve_label(&label)?;
        Ok((label, resolution))
    }

    /// Applies the label's verdict to its translation and input.
    pub fn resolve_label(&self, label: &Label) -> EngineResult<Resolution> {
        let project = self
            .store
            .get_project(label.project_id)
            .ok_or_else(|| EngineError::not_found("project", label.project_id.0))?;
        match label.is_positive(project.min_score) {
            None => Ok(Resolution::Pending),
            Some(true) => {
                self.apply_positive(label, &project)?;
                Ok(Resolution::Positive)
            }
            Some(false) => {
                self.apply_negative(label)?;
                Ok(Resolution::Negative)
            }
        }
    }

    fn apply_positive(&self, label: &Label, project: &Project) -> EngineResult<()> {
        let mut translation = self
            .store
            .get_translation(label.translation_id)
            .ok_or_else(|| EngineError::not_found("translation", label.translation_id.0))?;
        translation.n_approvals += 1;
        // Rejection is sticky: the counter keeps the bookkeeping, the
        // status stays.
        if translation.n_approvals >= project.overlap
            && translation.status != TranslationStatus::Rejected
        {
            translation.status = TranslationStatus::Accepted;
        }
        self.store.save_translation(&translation)?;
        tracing::debug!(
            "Label {} approved translation {} ({}/{} approvals, status {:?})",
            label.id.0,
            translation.id.0,
            translation.n_approvals,
            project.overlap,
            translation.status
        );

        if translation.status == TranslationStatus::Accepted {
            let mut input = self
                .store
                .get_input(translation.input_id)
                .ok_or_else(|| EngineError::not_found("input", translation.input_id.0))?;
            if !input.solved {
                input.solved = true;
                self.store.save_input(&input)?;
                tracing::info!(
                    "Input {} solved by translation {}",
                    input.id.0,
                    translation.id.0
                );
            }
        }
        Ok(())
    }

    fn apply_negative(&self, label: &Label) -> EngineResult<()> {
        let mut translation = self
            .store
            .get_translation(label.translation_id)
            .ok_or_else(|| EngineError::not_found("translation", label.translation_id.0))?;
        translation.status = TranslationStatus::Rejected;
        self.store.save_translation(&translation)?;
        tracing::info!(
            "Label {} rejected translation {}",
            label.id.0,
            translation.id.0
        );
        Ok(())
    }

    /// Re-derives an input's status (and its `solved` flag) from its
    /// surviving translations. Idempotent, so it doubles as the repair
    /// step after a crash between upserts.
    pub fn recompute_input_status(&self, input_id: InputId) -> EngineResult<Input> {
        let mut input = self
            .store
            .get_input(input_id)
            .ok_or_else(|| EngineError::not_found("input", input_id.0))?;
        let translations = self.store.translations_for_input(input.id, None);

        let mut status = InputStatus::NoTranslation;
        let mut any_accepted = false;
        for translation in &translations {
            // Rejected and duplicate translations do not count.
            if matches!(
                translation.status,
                TranslationStatus::Rejected | TranslationStatus::Duplicate
            ) {
                continue;
            }
            status = status.max(if translation.author == WorkerId::SYSTEM {
                InputStatus::UncheckedSystemTranslation
            } else {
                InputStatus::UncheckedUserTranslation
            });
            if translation.n_approvals > 0 {
                status = status.max(InputStatus::PartiallyAccepted);
            }
            if translation.status == TranslationStatus::Accepted {
                status = status.max(InputStatus::Accepted);
                any_accepted = true;
            }
        }

        input.status = status;
        input.solved = any_accepted;
        self.store.save_input(&input)?;
        Ok(input)
    }

    /// Recomputes every input of the task and stores the status counts on
    /// the task.
    pub fn recompute_task_status(&self, task_id: TaskId) -> EngineResult<()> {
        let mut task = self
            .store
            .get_task(task_id)
            .ok_or_else(|| EngineError::not_found("task", task_id.0))?;
        let inputs = self.store.inputs_for_task(task.id);

        let mut counts: HashMap<InputStatus, u32> = HashMap::new();
        for input in inputs {
            let refreshed = self.recompute_input_status(input.id)?;
            *counts.entry(refreshed.status).or_insert(0) += 1;
        }
        task.completion_stats = Some(counts);
        self.store.save_task(&task)?;
        Ok(())
    }

    /// Full sweep over every task. Slow by design; run it on a schedule,
    /// not per request.
    pub fn recompute_all_task_statuses(&self) -> EngineResult<usize> {
        let tasks = self.store.all_tasks();
        let count = tasks.len();
        for task in tasks {
            self.recompute_task_status(task.id)?;
        }
        tracing::info!("Recomputed statuses for {} tasks", count);
        Ok(count)
    }
}
