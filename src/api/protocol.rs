//! HTTP Protocol Definitions
//!
//! Data Transfer Objects for the transport-facing HTTP API. Entity records
//! serialize as-is; these types only add the request envelopes and the
//! response wrappers with their optional error messages.

use crate::assignment::types::WorkUnit;
use crate::consensus::engine::Resolution;
use crate::store::types::{CoherenceScore, Task, Translation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectTaskRequest {
    pub worker_id: i64,
    pub project_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectTaskResponse {
    pub task: Option<Task>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockTaskRequest {
    pub worker_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignNextRequest {
    pub worker_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignNextResponse {
    pub unit: Option<WorkUnit>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTranslationRequest {
    pub worker_id: i64,
    pub input_id: i64,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTranslationResponse {
    pub translation: Option<Translation>,
    pub message: Option<String>,
}

/// One score for the worker's current label: exactly one of the two
/// fields must be set.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreLabelRequest {
    pub worker_id: i64,
    pub label_id: i64,
    pub coherence: Option<CoherenceScore>,
    pub semantics: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreLabelResponse {
    pub resolution: Option<Resolution>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub unlocked: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecomputeResponse {
    pub recomputed: usize,
}
