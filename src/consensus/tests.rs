//! Consensus Module Tests
//!
//! Validates the label positivity rule (including the time-gated
//! coherence cutoff), verdict propagation up to translations and inputs,
//! duplicate detection, and the derived status recomputation.

#[cfg(test)]
mod tests {
    use crate::consensus::engine::{ConsensusEngine, Resolution};
    use crate::store::memory::Store;
    use crate::store::types::*;
    use std::sync::Arc;

    fn setup(overlap: u32, min_score: u8) -> (Arc<Store>, ConsensusEngine, Project, Task) {
        let store = Arc::new(Store::new());
        let mut project = store.create_project("P").unwrap();
        project.overlap = overlap;
        project.min_score = min_score;
        store.save_project(&project).unwrap();
        let task = store.create_task(&project, None).unwrap();
        let engine = ConsensusEngine::new(store.clone());
        (store, engine, project, task)
    }

    fn label_at(submitted_at: u64, coherence: CoherenceScore, semantics: u8) -> Label {
        Label {
            id: LabelId(1),
            translation_id: TranslationId(1),
            input_id: InputId(1),
            task_id: TaskId(1),
            project_id: ProjectId(1),
            rater: WorkerId(7),
            submitted_at,
            coherence: Some(coherence),
            semantics: Some(semantics),
        }
    }

    // ============================================================
    // POSITIVITY RULE
    // ============================================================

    #[test]
    fn test_incoherent_rejects_without_semantics() {
        let mut label = label_at(now_secs(), CoherenceScore::Incoherent, 5);
        label.semantics = None;
        assert_eq!(label.is_positive(4), Some(false));
    }

    #[test]
    fn test_low_semantics_rejects_without_coherence() {
        let mut label = label_at(now_secs(), CoherenceScore::Fluent, 3);
        label.coherence = None;
        assert_eq!(label.is_positive(4), Some(false));
    }

    #[test]
    fn test_half_filled_label_is_unresolved() {
        let mut label = label_at(now_secs(), CoherenceScore::Fluent, 5);
        label.semantics = None;
        assert_eq!(label.is_positive(4), None);

        let mut label = label_at(now_secs(), CoherenceScore::Fluent, 5);
        label.coherence = None;
        assert_eq!(label.is_positive(4), None);
    }

    #[test]
    fn test_coherent_was_enough_before_the_cutoff() {
        let label = label_at(FLUENCY_CUTOFF_SECS, CoherenceScore::Coherent, 4);
        assert_eq!(label.is_positive(4), Some(true));
    }

    #[test]
    fn test_coherent_is_not_enough_after_the_cutoff() {
        let label = label_at(FLUENCY_CUTOFF_SECS + 1, CoherenceScore::Coherent, 4);
        assert_eq!(label.is_positive(4), Some(false));

        let label = label_at(FLUENCY_CUTOFF_SECS + 1, CoherenceScore::Fluent, 4);
        assert_eq!(label.is_positive(4), Some(true));
    }

    // ============================================================
    // VERDICT PROPAGATION
    // ============================================================

    #[test]
    fn test_translation_accepted_at_kth_positive_label() {
        let (store, engine, project, task) = setup(2, 4);
        let input = store.create_input(&project, &task, "src").unwrap();
        let translation = store
            .create_translation(WorkerId::SYSTEM, &input, "seed", TranslationStatus::Unchecked)
            .unwrap();

        // First rater: pending after coherence, positive after semantics.
        let first = store.create_label(WorkerId(1), &translation).unwrap();
        let (_, resolution) = engine
            .record_label_score(first.id, LabelScore::Coherence(CoherenceScore::Fluent))
            .unwrap();
        assert_eq!(resolution, Resolution::Pending);
        let (_, resolution) = engine
            .record_label_score(first.id, LabelScore::Semantics(5))
            .unwrap();
        assert_eq!(resolution, Resolution::Positive);

        let halfway = store.get_translation(translation.id).unwrap();
        assert_eq!(halfway.n_approvals, 1);
        assert_eq!(halfway.status, TranslationStatus::Unchecked);
        assert!(!store.get_input(input.id).unwrap().solved);

        // Second rater pushes it over the overlap threshold.
        let second = store.create_label(WorkerId(2), &translation).unwrap();
        engine
            .record_label_score(second.id, LabelScore::Coherence(CoherenceScore::Fluent))
            .unwrap();
        let (_, resolution) = engine
            .record_label_score(second.id, LabelScore::Semantics(4))
            .unwrap();
        assert_eq!(resolution, Resolution::Positive);

        let accepted = store.get_translation(translation.id).unwrap();
        assert_eq!(accepted.n_approvals, 2);
        assert_eq!(accepted.status, TranslationStatus::Accepted);
        assert!(store.get_input(input.id).unwrap().solved);
    }

    #[test]
    fn test_negative_label_rejects_immediately() {
        let (store, engine, project, task) = setup(2, 4);
        let input = store.create_input(&project, &task, "src").unwrap();
        let translation = store
            .create_translation(WorkerId::SYSTEM, &input, "seed", TranslationStatus::Unchecked)
            .unwrap();

        let label = store.create_label(WorkerId(1), &translation).unwrap();
        let (_, resolution) = engine
            .record_label_score(label.id, LabelScore::Coherence(CoherenceScore::Incoherent))
            .unwrap();

        // Incoherent alone is enough; no semantics question needed.
        assert_eq!(resolution, Resolution::Negative);
        assert_eq!(
            store.get_translation(translation.id).unwrap().status,
            TranslationStatus::Rejected
        );
        assert!(!store.get_input(input.id).unwrap().solved);
    }

    #[test]
    fn test_rejection_is_sticky_against_later_approvals() {
        let (store, engine, project, task) = setup(1, 4);
        let input = store.create_input(&project, &task, "src").unwrap();
        let translation = store
            .create_translation(WorkerId::SYSTEM, &input, "seed", TranslationStatus::Unchecked)
            .unwrap();

        let negative = store.create_label(WorkerId(1), &translation).unwrap();
        engine
            .record_label_score(negative.id, LabelScore::Coherence(CoherenceScore::Incoherent))
            .unwrap();
        assert_eq!(
            store.get_translation(translation.id).unwrap().status,
            TranslationStatus::Rejected
        );

        // Later positive labels keep the bookkeeping but never flip the
        // status back, even past the overlap threshold.
        for rater in 2..4 {
            let label = store.create_label(WorkerId(rater), &translation).unwrap();
            engine
                .record_label_score(label.id, LabelScore::Coherence(CoherenceScore::Fluent))
                .unwrap();
            let (_, resolution) = engine
                .record_label_score(label.id, LabelScore::Semantics(5))
                .unwrap();
            assert_eq!(resolution, Resolution::Positive);
        }

        let rejected = store.get_translation(translation.id).unwrap();
        assert_eq!(rejected.n_approvals, 2);
        assert_eq!(rejected.status, TranslationStatus::Rejected);
        assert!(!store.get_input(input.id).unwrap().solved);
    }

    #[test]
    fn test_semantics_below_threshold_is_negative() {
        let (store, engine, project, task) = setup(1, 4);
        let input = store.create_input(&project, &task, "src").unwrap();
        let translation = store
            .create_translation(WorkerId::SYSTEM, &input, "seed", TranslationStatus::Unchecked)
            .unwrap();

        let label = store.create_label(WorkerId(1), &translation).unwrap();
        engine
            .record_label_score(label.id, LabelScore::Coherence(CoherenceScore::Fluent))
            .unwrap();
        let (_, resolution) = engine
            .record_label_score(label.id, LabelScore::Semantics(3))
            .unwrap();

        assert_eq!(resolution, Resolution::Negative);
        assert_eq!(
            store.get_translation(translation.id).unwrap().status,
            TranslationStatus::Rejected
        );
    }

    // ============================================================
    // DUPLICATE DETECTION
    // ============================================================

    #[test]
    fn test_exact_duplicate_text_is_marked_at_creation() {
        let (store, engine, project, task) = setup(1, 4);
        let input = store.create_input(&project, &task, "src").unwrap();
        engine
            .record_translation(WorkerId(1), &input, "the same text")
            .unwrap();

        let duplicate = engine
            .record_translation(WorkerId(2), &input, "the same text")
            .unwrap();

        assert_eq!(duplicate.status, TranslationStatus::Duplicate);

        // A different text for the same input is a regular submission.
        let fresh = engine
            .record_translation(WorkerId(3), &input, "a different text")
            .unwrap();
        assert_eq!(fresh.status, TranslationStatus::Unchecked);
    }

    #[test]
    fn test_duplicate_of_another_input_is_allowed() {
        let (store, engine, project, task) = setup(1, 4);
        let one = store.create_input(&project, &task, "one").unwrap();
        let two = store.create_input(&project, &task, "two").unwrap();

        let first = engine.record_translation(WorkerId(1), &one, "text").unwrap();
        let second = engine.record_translation(WorkerId(1), &two, "text").unwrap();

        assert_eq!(first.status, TranslationStatus::Unchecked);
        assert_eq!(second.status, TranslationStatus::Unchecked);
    }

    // ============================================================
    // STATUS RECOMPUTATION
    // ============================================================

    #[test]
    fn test_input_status_ranks_highest_applicable_value() {
        let (store, engine, project, task) = setup(2, 4);
        let input = store.create_input(&project, &task, "src").unwrap();

        let refreshed = engine.recompute_input_status(input.id).unwrap();
        assert_eq!(refreshed.status, InputStatus::NoTranslation);

        store
            .create_translation(WorkerId::SYSTEM, &input, "seed", TranslationStatus::Unchecked)
            .unwrap();
        let refreshed = engine.recompute_input_status(input.id).unwrap();
        assert_eq!(refreshed.status, InputStatus::UncheckedSystemTranslation);

        let user_translation = store
            .create_translation(WorkerId(1), &input, "user", TranslationStatus::Unchecked)
            .unwrap();
        let refreshed = engine.recompute_input_status(input.id).unwrap();
        assert_eq!(refreshed.status, InputStatus::UncheckedUserTranslation);

        let mut approved = user_translation.clone();
        approved.n_approvals = 1;
        store.save_translation(&approved).unwrap();
        let refreshed = engine.recompute_input_status(input.id).unwrap();
        assert_eq!(refreshed.status, InputStatus::PartiallyAccepted);

        let mut accepted = approved.clone();
        accepted.status = TranslationStatus::Accepted;
        store.save_translation(&accepted).unwrap();
        let refreshed = engine.recompute_input_status(input.id).unwrap();
        assert_eq!(refreshed.status, InputStatus::Accepted);
        assert!(refreshed.solved);
    }

    #[test]
    fn test_rejected_translations_do_not_count_toward_status() {
        let (store, engine, project, task) = setup(2, 4);
        let input = store.create_input(&project, &task, "src").unwrap();
        store
            .create_translation(WorkerId(1), &input, "bad", TranslationStatus::Rejected)
            .unwrap();
        store
            .create_translation(WorkerId(2), &input, "copy", TranslationStatus::Duplicate)
            .unwrap();

        let refreshed = engine.recompute_input_status(input.id).unwrap();
        assert_eq!(refreshed.status, InputStatus::NoTranslation);
        assert!(!refreshed.solved);
    }

    #[test]
    fn test_recompute_repairs_a_stale_solved_flag() {
        let (store, engine, project, task) = setup(1, 4);
        let input = store.create_input(&project, &task, "src").unwrap();

        // A crash between upserts left the flag set with no accepted
        // translation behind it.
        let mut stale = input.clone();
        stale.solved = true;
        store.save_input(&stale).unwrap();

        let refreshed = engine.recompute_input_status(input.id).unwrap();
        assert!(!refreshed.solved);
    }

    #[test]
    fn test_task_completion_stats_count_input_statuses() {
        let (store, engine, project, task) = setup(2, 4);
        let translated = store.create_input(&project, &task, "one").unwrap();
        store.create_input(&project, &task, "two").unwrap();
        store.create_input(&project, &task, "three").unwrap();
        store
            .create_translation(WorkerId::SYSTEM, &translated, "seed", TranslationStatus::Unchecked)
            .unwrap();

        engine.recompute_task_status(task.id).unwrap();

        let stats = store.get_task(task.id).unwrap().completion_stats.unwrap();
        assert_eq!(stats.get(&InputStatus::NoTranslation), Some(&2));
        assert_eq!(
            stats.get(&InputStatus::UncheckedSystemTranslation),
            Some(&1)
        );
    }

    #[test]
    fn test_recompute_all_covers_every_task() {
        let (store, engine, project, _task) = setup(2, 4);
        store.create_task(&project, None).unwrap();

        let covered = engine.recompute_all_task_statuses().unwrap();
        assert_eq!(covered, 2);
    }
}
