//! Records flowing from the worker pool to the store.

use serde::{Deserialize, Serialize};

/// One embedded row, keyed by its ordinal in the input table.
///
/// - `row_id`: global row ordinal
/// - `vector`: embedding of length `vector_dim`
/// - `text`: the embedder input, persisted as metadata when present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub row_id: u64,
    pub vector: Vec<f32>,
    pub text: Option<String>,
}

impl EmbeddingRecord {
    pub fn new(row_id: u64, vector: Vec<f32>, text: Option<String>) -> Self {
        Self { row_id, vector, text }
    }
}
