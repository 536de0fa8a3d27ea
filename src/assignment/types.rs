//! Assignment Result Types
//!
//! What the assignment loop hands back for one "give me the next thing to
//! do" request.

use crate::store::types::{Input, Label, Translation};
use serde::{Deserialize, Serialize};

/// The next unit of work for a worker inside a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkUnit {
    /// Ask the worker to translate this input from scratch.
    Translate { input: Input },
    /// Ask the worker to judge an existing translation. The label was
    /// created empty and is owned by the worker; coherence is asked first,
    /// then semantics.
    Review {
        input: Input,
        translation: Translation,
        label: Label,
    },
    /// Nothing left in this task for this worker; the caller should ask
    /// whether the worker wants another task.
    TaskExhausted,
}
