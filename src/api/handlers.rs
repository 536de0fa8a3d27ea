//! HTTP Request Handlers
//!
//! Thin axum adapters around the engine facade. Error mapping follows the
//! error taxonomy: a missing record yields 404 with a neutral "nothing to
//! resume" message, an exhausted assignment scan yields 409 naming the
//! task, and an invariant violation yields 500.

use super::protocol::*;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::store::types::{
    InputId, LabelId, LabelScore, ProjectId, ProjectStats, TaskId, WorkerId,
};

use axum::{Extension, Json, extract::Path, http::StatusCode};
use std::sync::Arc;

fn error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::LoopExhausted { .. } => StatusCode::CONFLICT,
        EngineError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn handle_select_task(
    Extension(engine): Extension<Arc<Engine>>,
    Json(req): Json<SelectTaskRequest>,
) -> (StatusCode, Json<SelectTaskResponse>) {
    match engine.select_task(WorkerId(req.worker_id), ProjectId(req.project_id)) {
        Ok(task) => (StatusCode::OK, Json(SelectTaskResponse { task })),
        Err(e) => {
            tracing::error!("Failed to select a task: {}", e);
            (error_status(&e), Json(SelectTaskResponse { task: None }))
        }
    }
}

pub async fn handle_lock_task(
    Extension(engine): Extension<Arc<Engine>>,
    Path(task_id): Path<i64>,
    Json(req): Json<LockTaskRequest>,
) -> (StatusCode, Json<AckResponse>) {
    match engine.lock_task(TaskId(task_id), WorkerId(req.worker_id)) {
        Ok(()) => (
            StatusCode::OK,
            Json(AckResponse {
                success: true,
                message: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to lock task {}: {}", task_id, e);
            (
                error_status(&e),
                Json(AckResponse {
                    success: false,
                    message: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_unlock_task(
    Extension(engine): Extension<Arc<Engine>>,
    Path(task_id): Path<i64>,
) -> (StatusCode, Json<AckResponse>) {
    match engine.unlock_task(TaskId(task_id)) {
        Ok(()) => (
            StatusCode::OK,
            Json(AckResponse {
                success: true,
                message: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to unlock task {}: {}", task_id, e);
            (
                error_status(&e),
                Json(AckResponse {
                    success: false,
                    message: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_assign_next(
    Extension(engine): Extension<Arc<Engine>>,
    Path(task_id): Path<i64>,
    Json(req): Json<AssignNextRequest>,
) -> (StatusCode, Json<AssignNextResponse>) {
    match engine.assign_next(WorkerId(req.worker_id), TaskId(task_id)) {
        Ok(unit) => (
            StatusCode::OK,
            Json(AssignNextResponse {
                unit: Some(unit),
                message: None,
            }),
        ),
        Err(e @ EngineError::NotFound { .. }) => {
            tracing::warn!("Assignment lookup failed: {}", e);
            (
                StatusCode::NOT_FOUND,
                Json(AssignNextResponse {
                    unit: None,
                    message: Some("Nothing to resume right now.".to_string()),
                }),
            )
        }
        Err(e) => {
            tracing::error!("Failed to assign next unit in task {}: {}", task_id, e);
            (
                error_status(&e),
                Json(AssignNextResponse {
                    unit: None,
                    message: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_submit_translation(
    Extension(engine): Extension<Arc<Engine>>,
    Json(req): Json<SubmitTranslationRequest>,
) -> (StatusCode, Json<SubmitTranslationResponse>) {
    match engine.record_translation(
        WorkerId(req.worker_id),
        InputId(req.input_id),
        &req.text,
    ) {
        Ok(translation) => (
            StatusCode::OK,
            Json(SubmitTranslationResponse {
                translation: Some(translation),
                message: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to record a translation: {}", e);
            (
                error_status(&e),
                Json(SubmitTranslationResponse {
                    translation: None,
                    message: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_score_label(
    Extension(engine): Extension<Arc<Engine>>,
    Json(req): Json<ScoreLabelRequest>,
) -> (StatusCode, Json<ScoreLabelResponse>) {
    let score = match (req.coherence, req.semantics) {
        (Some(coherence), None) => LabelScore::Coherence(coherence),
        (None, Some(semantics)) => LabelScore::Semantics(semantics),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ScoreLabelResponse {
                    resolution: None,
                    message: Some(
                        "Exactly one of coherence and semantics must be set.".to_string(),
                    ),
                }),
            );
        }
    };

    match engine.record_label_score(WorkerId(req.worker_id), LabelId(req.label_id), score) {
        Ok(resolution) => (
            StatusCode::OK,
            Json(ScoreLabelResponse {
                resolution: Some(resolution),
                message: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to record a label score: {}", e);
            (
                error_status(&e),
                Json(ScoreLabelResponse {
                    resolution: None,
                    message: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_project_stats(
    Extension(engine): Extension<Arc<Engine>>,
    Path(project_id): Path<i64>,
) -> (StatusCode, Json<Option<ProjectStats>>) {
    match engine.project_stats(ProjectId(project_id)) {
        Ok(stats) => (StatusCode::OK, Json(Some(stats))),
        Err(e) => {
            tracing::warn!("Failed to compute stats for project {}: {}", project_id, e);
            (error_status(&e), Json(None))
        }
    }
}

pub async fn handle_reconcile_locks(
    Extension(engine): Extension<Arc<Engine>>,
) -> (StatusCode, Json<ReconcileResponse>) {
    match engine.reconcile_locks() {
        Ok(unlocked) => (StatusCode::OK, Json(ReconcileResponse { unlocked })),
        Err(e) => {
            tracing::error!("Lock reconciliation failed: {}", e);
            (error_status(&e), Json(ReconcileResponse { unlocked: 0 }))
        }
    }
}

pub async fn handle_recompute_task(
    Extension(engine): Extension<Arc<Engine>>,
    Path(task_id): Path<i64>,
) -> (StatusCode, Json<RecomputeResponse>) {
    match engine.recompute_task_status(TaskId(task_id)) {
        Ok(()) => (StatusCode::OK, Json(RecomputeResponse { recomputed: 1 })),
        Err(e) => {
            tracing::error!("Failed to recompute task {}: {}", task_id, e);
            (error_status(&e), Json(RecomputeResponse { recomputed: 0 }))
        }
    }
}

pub async fn handle_recompute_all(
    Extension(engine): Extension<Arc<Engine>>,
) -> (StatusCode, Json<RecomputeResponse>) {
    match engine.recompute_all_task_statuses() {
        Ok(recomputed) => (StatusCode::OK, Json(RecomputeResponse { recomputed })),
        Err(e) => {
            tracing::error!("Full status recomputation failed: {}", e);
            (error_status(&e), Json(RecomputeResponse { recomputed: 0 }))
        }
    }
}
