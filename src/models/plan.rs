// Execution plan data models
use serde::{Deserialize, Serialize};

/// One result row, cells as the model wrote them
pub type Row = Vec<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Chunks awaited one after another on the calling task
    Sequential,
    /// Concurrent invocations bounded by the worker count; file codecs run inline
    Thread,
    /// Concurrent invocations bounded by the worker count; file codecs run on the blocking pool
    Process,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub tag: String,
    pub items: Vec<String>,
}

impl Chunk {
    pub fn new(index: usize, base_tag: &str, items: Vec<String>) -> Self {
        Self {
            index,
            tag: format!("{}_{}", base_tag, index),
            items,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub rows: Vec<Row>,
    pub header: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub worker_count: usize,
    pub mode: ExecutionMode,
    pub chunks: Vec<Chunk>,
}

impl ExecutionPlan {
    pub fn item_count(&self) -> usize {
        self.chunks.iter().map(|c| c.items.len()).sum()
    }
}

/// Pipeline output; `None` rows are inputs that were neither cached nor computed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub rows: Vec<Option<Row>>,
    pub header: Vec<String>,
}
