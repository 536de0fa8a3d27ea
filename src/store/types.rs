//! Entity Records
//!
//! Strongly typed records for the five persisted collections plus the
//! per-worker session state. Records are validated at the store boundary;
//! a malformed record is rejected instead of silently accepted.

use crate::config::IncompletenessWeights;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unix second at which the coherence question switched from a 2-level
/// scale (incoherent/coherent) to a 3-level one (incoherent/coherent/fluent).
/// 2024-03-29 12:00:00 UTC. Labels recorded at or before this instant are
/// judged under the old rule; later labels require the `Fluent` level.
pub const FLUENCY_CUTOFF_SECS: u64 = 1_711_713_600;

/// Current system time in whole seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TaskId(pub i64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct InputId(pub i64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TranslationId(pub i64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct LabelId(pub i64);

/// Worker ids are assigned by the transport layer (e.g. a chat platform),
/// never allocated by the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct WorkerId(pub i64);

impl WorkerId {
    /// Sentinel author of seed translations supplied by the import process.
    pub const SYSTEM: WorkerId = WorkerId(-1);
}

/// A translation project: one source/target language pair with its
/// acceptance thresholds. Created once by the import process and read-only
/// to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub src_lang: Option<String>,
    pub tgt_lang: Option<String>,
    /// How many independent positive judgments accept a translation.
    pub overlap: u32,
    /// Minimal semantic-accuracy score (1-5) counted as positive.
    pub min_score: u8,
    pub is_active: bool,
}

/// A themed bundle of inputs offered to workers as one unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub prompt: Option<String>,
    pub locked: bool,
    pub completed: bool,
    /// How many distinct workers have exhausted this task.
    pub completions: u32,
    /// Counts of the input statuses of this task's inputs, recomputed by
    /// the slow status sweep rather than incrementally.
    pub completion_stats: Option<HashMap<InputStatus, u32>>,
}

impl Task {
    /// Priority of the task in terms of covering all inputs with
    /// translations (higher = further from resolution).
    pub fn incompleteness_score(&self, weights: &IncompletenessWeights) -> u64 {
        let Some(stats) = &self.completion_stats else {
            return 0;
        };
        let count = |status: InputStatus| u64::from(*stats.get(&status).unwrap_or(&0));
        count(InputStatus::NoTranslation) * weights.no_translation
            + count(InputStatus::UncheckedSystemTranslation) * weights.unchecked_system
            + count(InputStatus::UncheckedUserTranslation) * weights.unchecked_user
            + count(InputStatus::PartiallyAccepted) * weights.partially_accepted
    }
}

/// One source sentence requiring translation and/or review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Input {
    pub id: InputId,
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub source: String,
    /// True iff some translation of this input has been accepted.
    pub solved: bool,
    pub status: InputStatus,
}

/// Derived resolution state of an input. The variant order is the ranking:
/// recomputation keeps the highest applicable value.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum InputStatus {
    NoTranslation,
    UncheckedSystemTranslation,
    UncheckedUserTranslation,
    PartiallyAccepted,
    Accepted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    /// Waiting for enough judgments.
    Unchecked,
    /// Reached the project's overlap of positive judgments.
    Accepted,
    /// Received a negative judgment. Terminal: later positive judgments
    /// still bump the approval counter but never revive the translation.
    Rejected,
    /// Exact-text copy of an earlier translation of the same input.
    /// Terminal; never enters the review pool.
    Duplicate,
}

/// One candidate rendering of an input in the target language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Translation {
    pub id: TranslationId,
    pub input_id: InputId,
    pub task_id: TaskId,
    pub project_id: ProjectId,
    /// `WorkerId::SYSTEM` for seed translations.
    pub author: WorkerId,
    pub submitted_at: u64,
    pub text: String,
    /// Count of positive judgments; monotonically non-decreasing.
    pub n_approvals: u32,
    pub status: TranslationStatus,
}

/// Coherence judgment of a translation: is it well-formed target-language
/// text, independent of fidelity to the source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceScore {
    Incoherent,
    Coherent,
    Fluent,
}

impl CoherenceScore {
    pub fn is_coherent(self) -> bool {
        matches!(self, CoherenceScore::Coherent | CoherenceScore::Fluent)
    }

    pub fn is_fluent(self) -> bool {
        matches!(self, CoherenceScore::Fluent)
    }
}

/// One of the two score fields of a label, submitted by a worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum LabelScore {
    Coherence(CoherenceScore),
    Semantics(u8),
}

/// One worker's quality judgment of one translation. Created empty and
/// filled incrementally; resolved once both scores are present, or earlier
/// if the coherence answer alone is enough to reject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub translation_id: TranslationId,
    pub input_id: InputId,
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub rater: WorkerId,
    pub submitted_at: u64,
    pub coherence: Option<CoherenceScore>,
    pub semantics: Option<u8>,
}

impl Label {
    /// Whether this label counts as an approval, given the project's
    /// minimal semantic score. `None` means the label is not yet resolved
    /// and the remaining question should be asked.
    ///
    /// Labels recorded at or before `FLUENCY_CUTOFF_SECS` were collected
    /// under the 2-level coherence scale, where `Coherent` was enough.
    /// Later labels require the strictly higher `Fluent` level. Both rule
    /// variants must stay in place because historical labels are judged
    /// under the scale they were recorded with.
    pub fn is_positive(&self, min_score: u8) -> Option<bool> {
        if self.coherence == Some(CoherenceScore::Incoherent) {
            return Some(false);
        }
        if let Some(semantics) = self.semantics
            && semantics < min_score
        {
            return Some(false);
        }
        let (Some(coherence), Some(semantics)) = (self.coherence, self.semantics) else {
            return None;
        };
        if self.submitted_at > FLUENCY_CUTOFF_SECS {
            Some(coherence.is_fluent() && semantics >= min_score)
        } else {
            Some(coherence.is_coherent() && semantics >= min_score)
        }
    }
}

/// Where a worker currently is in the review/translate dialogue. The
/// closed enum replaces free-text state ids: the engine refuses scores
/// that cannot belong to the worker's current phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    Idle,
    /// A task has been offered but not yet accepted (locked).
    OfferedTask,
    Translating,
    JudgingCoherence,
    JudgingSemantics,
    /// The current task is exhausted; waiting to hear whether the worker
    /// wants another one.
    AwaitingMore,
}

impl WorkerPhase {
    /// Whether a score submission is legal in this phase. Review always
    /// asks coherence first, then semantics.
    pub fn accepts(self, score: &LabelScore) -> bool {
        matches!(
            (self, score),
            (WorkerPhase::JudgingCoherence, LabelScore::Coherence(_))
                | (WorkerPhase::JudgingSemantics, LabelScore::Semantics(_))
        )
    }
}

/// Session and cursor state for one worker. Owned by the dialogue layer;
/// the selector and the assignment loop read it to resume or advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerState {
    pub id: WorkerId,
    pub name: Option<String>,
    pub phase: WorkerPhase,
    pub curr_project_id: Option<ProjectId>,
    pub curr_task_id: Option<TaskId>,
    /// Last input id served to this worker within the current task.
    pub cursor_input_id: Option<InputId>,
    pub curr_translation_id: Option<TranslationId>,
    pub curr_label_id: Option<LabelId>,
    pub n_labels: u32,
    pub n_translations: u32,
    pub is_blocked: bool,
    pub block_log: Option<String>,
    pub last_activity_at: Option<u64>,
    pub last_reminder_at: Option<u64>,
    /// Consecutive reminders sent without any activity in between.
    pub n_last_reminders: u32,
}

impl WorkerState {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            name: None,
            phase: WorkerPhase::Idle,
            curr_project_id: None,
            curr_task_id: None,
            cursor_input_id: None,
            curr_translation_id: None,
            curr_label_id: None,
            n_labels: 0,
            n_translations: 0,
            is_blocked: false,
            block_log: None,
            last_activity_at: None,
            last_reminder_at: None,
            n_last_reminders: 0,
        }
    }

    /// Drop every pointer into the current task.
    pub fn clear_cursor(&mut self) {
        self.curr_task_id = None;
        self.cursor_input_id = None;
        self.curr_translation_id = None;
        self.curr_label_id = None;
    }
}

/// Checkout record for a locked task: who holds it and until when.
/// Acquisition, renewal and expiry are O(1); the reconciliation sweep is
/// only the safety net for holders that never release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub expires_at: u64,
}

/// Aggregate progress numbers for one project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectStats {
    pub n_inputs: usize,
    /// Inputs with at least one unchecked translation that already has
    /// some approvals.
    pub n_partial: usize,
    pub n_solved: usize,
    pub n_user_translations: usize,
    pub n_rejected_user_translations: usize,
    pub n_labels: usize,
    pub n_positive_labels: usize,
    pub n_negative_labels: usize,
}
