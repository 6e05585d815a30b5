//! Error types shared by the orchestration layer
//!
//! Every stage aborts the whole call: callers see either a fully assembled
//! result or exactly one of these errors.

use crate::engine::EngineError;

/// Why a single dispatched task failed
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskFailure {
    #[error("inference engine failed: {0}")]
    Engine(#[from] EngineError),

    #[error("no shared context was pushed to this worker")]
    ContextMissing,

    #[error("task belongs to call {task_call} but worker holds context for call {context_call}")]
    StaleContext { task_call: String, context_call: String },

    #[error("task kind does not match the pushed context: {0}")]
    ContextMismatch(String),

    #[error("worker {worker} exited before replying")]
    WorkerLost { worker: usize },

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("could not decode task payload: {0}")]
    Decode(String),
}

/// Top-level error for `ClusterEngine` and its components
#[derive(Debug, thiserror::Error)]
pub enum ChainpoolError {
    #[error("input shape error: {0}")]
    InputShape(String),

    #[error("task {index} failed: {source}")]
    WorkerTask {
        index: usize,
        #[source]
        source: TaskFailure,
    },

    #[error("seed sequence exhausted: requested {requested}, {remaining} left before limit {limit}")]
    SeedExhausted {
        requested: u64,
        remaining: u64,
        limit: u64,
    },

    #[error("worker pool error: {0}")]
    Pool(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("inference engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChainpoolError {
    pub fn input_shape(message: impl Into<String>) -> Self {
        Self::InputShape(message.into())
    }

    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool(message.into())
    }

    /// Index of the failing task, if this is a task failure
    pub fn failed_index(&self) -> Option<usize> {
        match self {
            Self::WorkerTask { index, .. } => Some(*index),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainpoolError>;
