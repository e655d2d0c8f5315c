// Engine error taxonomy
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("API request is empty.")]
    EmptyRequest,

    #[error("Data is empty.")]
    EmptyData,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("System resources over threshold (cpu {cpu_percent:.1}%, memory {memory_percent:.1}%)")]
    ResourceExhausted { cpu_percent: f32, memory_percent: f32 },

    #[error("Internal processing error due to a shell execution: chunk {tag}: {reason}")]
    SubprocessFailure { tag: String, reason: String },

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Processing timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error(
        "Service temporarily unavailable due to high error rate and exited by circuit breaker (retry in {} seconds)",
        .retry_after.as_secs()
    )]
    CircuitOpen { retry_after: Duration },

    #[error("Inconsistent output headers across workers (chunk {chunk} differs from chunk 0)")]
    InconsistentHeader { chunk: usize },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed model output: {0}")]
    Codec(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification carried in error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ClientError,
    NotFound,
    ResourceExhausted,
    SubprocessFailure,
    CacheUnavailable,
    Timeout,
    CircuitOpen,
    ServerError,
}

impl EngineError {
    pub fn subprocess(tag: &str, reason: impl Into<String>) -> Self {
        EngineError::SubprocessFailure {
            tag: tag.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::EmptyRequest | EngineError::EmptyData | EngineError::InvalidRequest(_) => {
                ErrorKind::ClientError
            }
            EngineError::JobNotFound(_) => ErrorKind::NotFound,
            EngineError::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            EngineError::SubprocessFailure { .. } => ErrorKind::SubprocessFailure,
            EngineError::CacheUnavailable(_) => ErrorKind::CacheUnavailable,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            EngineError::InconsistentHeader { .. }
            | EngineError::Config(_)
            | EngineError::Codec(_)
            | EngineError::Io(_) => ErrorKind::ServerError,
        }
    }

    /// HTTP-style status code for the error body
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::EmptyRequest | EngineError::InvalidRequest(_) => 400,
            EngineError::EmptyData => 422,
            EngineError::JobNotFound(_) => 404,
            EngineError::ResourceExhausted { .. } | EngineError::CircuitOpen { .. } => 503,
            EngineError::Timeout(_) => 504,
            _ => 500,
        }
    }

    /// Whether the failure counts toward tripping the circuit breaker.
    /// Admission rejections are not failures of the model path.
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
            && !matches!(
                self,
                EngineError::CircuitOpen { .. } | EngineError::ResourceExhausted { .. }
            )
    }

    pub fn to_body(&self, include_traceback: bool) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            detail: self.to_string(),
            traceback: include_traceback.then(|| format!("{:?}", self)),
        }
    }
}

/// User-visible error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}
